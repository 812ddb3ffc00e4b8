use thiserror::Error;

use crate::types::PageId;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage full: cannot grow beyond {max_pages} pages")]
    StorageFull { max_pages: u64 },

    #[error("Corrupted page: page_id={page_id}, reason={reason}")]
    CorruptPage { page_id: PageId, reason: String },

    #[error("Duplicate key in '{tree}': {key}")]
    DuplicateKey { tree: String, key: String },

    #[error("Parse error at line {line}, column {column}: expected {expected}, found {found}")]
    ParseError {
        line: u64,
        column: u64,
        expected: String,
        found: String,
    },

    #[error("Execution error: {reason}")]
    ExecError { reason: String },

    #[error("Schema mismatch: {details}")]
    SchemaMismatch { details: String },

    #[error("Database not initialized")]
    NotInitialized,

    #[error("Database initialization failed: {reason}")]
    InitFailed { reason: String },

    #[error("Table '{name}' not found")]
    TableNotFound { name: String },

    #[error("Index '{name}' not found")]
    IndexNotFound { name: String },

    #[error("Column '{name}' not found in table '{table}'")]
    ColumnNotFound { name: String, table: String },

    #[error("Invalid database header: {reason}")]
    InvalidHeader { reason: String },

    #[error("Serialization/deserialization error: {details}")]
    SerializationError { details: String },

    #[error("{context}: {source}")]
    Statement {
        context: String,
        #[source]
        source: Box<DatabaseError>,
    },
}

impl DatabaseError {
    pub fn exec(reason: impl Into<String>) -> Self {
        DatabaseError::ExecError {
            reason: reason.into(),
        }
    }

    pub fn schema_mismatch(details: impl Into<String>) -> Self {
        DatabaseError::SchemaMismatch {
            details: details.into(),
        }
    }

    pub fn corrupt(page_id: PageId, reason: impl Into<String>) -> Self {
        DatabaseError::CorruptPage {
            page_id,
            reason: reason.into(),
        }
    }

    /// Attach the statement being executed to an error.
    pub fn in_statement(self, context: impl Into<String>) -> Self {
        match self {
            // Already carries context from an inner statement
            DatabaseError::Statement { .. } => self,
            other => DatabaseError::Statement {
                context: context.into(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any statement context removed.
    pub fn cause(&self) -> &DatabaseError {
        match self {
            DatabaseError::Statement { source, .. } => source.cause(),
            other => other,
        }
    }

    /// Stable name of the error kind, used when marshalling errors into
    /// command responses.
    pub fn kind(&self) -> &'static str {
        match self.cause() {
            DatabaseError::Io(_) => "Io",
            DatabaseError::StorageFull { .. } => "StorageFull",
            DatabaseError::CorruptPage { .. } => "CorruptPage",
            DatabaseError::DuplicateKey { .. } => "DuplicateKey",
            DatabaseError::ParseError { .. } => "ParseError",
            DatabaseError::ExecError { .. }
            | DatabaseError::TableNotFound { .. }
            | DatabaseError::IndexNotFound { .. }
            | DatabaseError::ColumnNotFound { .. } => "ExecError",
            DatabaseError::SchemaMismatch { .. } => "SchemaMismatch",
            DatabaseError::NotInitialized => "NotInitialized",
            DatabaseError::InitFailed { .. } => "InitFailed",
            DatabaseError::InvalidHeader { .. } => "InvalidHeader",
            DatabaseError::SerializationError { .. } => "Serialization",
            DatabaseError::Statement { .. } => "ExecError",
        }
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
