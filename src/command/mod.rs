//! Request/response interface over database handles.
//!
//! A caller sends `Request { id, command }` and always gets back a
//! `Response` echoing the same id. Failures travel inside the response as
//! an `ErrorMessage`, so dispatch itself never fails.

pub mod codec;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::DatabaseConfig,
    database::Database,
    executor::{ResultSet, StatementResult},
    types::error::DatabaseError,
};

/// Opaque identifier of an open database.
pub type Handle = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Open a database; in memory when no config is given.
    Init { config: Option<DatabaseConfig> },
    Execute { handle: Handle, sql: String },
    Close { handle: Handle },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Initialized { handle: Handle },
    Rows(ResultSet),
    Affected(u64),
    Closed { handle: Handle },
}

impl From<StatementResult> for Reply {
    fn from(result: StatementResult) -> Self {
        match result {
            StatementResult::Rows(rows) => Reply::Rows(rows),
            StatementResult::Affected(n) => Reply::Affected(n),
        }
    }
}

/// An error as carried across the command boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Taxonomy name such as `ParseError` or `NotInitialized`
    pub kind: String,
    pub message: String,
}

impl From<&DatabaseError> for ErrorMessage {
    fn from(error: &DatabaseError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub outcome: Result<Reply, ErrorMessage>,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.outcome.as_ref().err().map(|e| e.kind.as_str())
    }
}

/// Owns every database opened through `Init`.
///
/// Closing a handle drops its database but remembers the handle, so that
/// closing again acknowledges the same way while executing on it reports
/// `NotInitialized`.
#[derive(Default)]
pub struct CommandHandler {
    databases: HashMap<Handle, Database>,
    closed: HashSet<Handle>,
    next_handle: Handle,
}

impl CommandHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, request: Request) -> Response {
        let outcome = match request.command {
            Command::Init { config } => self.init(config),
            Command::Execute { handle, sql } => self.execute(handle, &sql),
            Command::Close { handle } => self.close(handle),
        };
        if let Err(e) = &outcome {
            debug!(request = request.id, kind = %e.kind(), "command failed");
        }
        Response {
            id: request.id,
            outcome: outcome.map_err(|e| ErrorMessage::from(&e)),
        }
    }

    fn init(&mut self, config: Option<DatabaseConfig>) -> Result<Reply, DatabaseError> {
        let database = Database::open(&config.unwrap_or_default())?;
        self.next_handle += 1;
        let handle = self.next_handle;
        self.databases.insert(handle, database);
        info!(handle, "database handle opened");
        Ok(Reply::Initialized { handle })
    }

    fn execute(&self, handle: Handle, sql: &str) -> Result<Reply, DatabaseError> {
        let database = self.databases.get(&handle).ok_or(DatabaseError::NotInitialized)?;
        database.execute(sql).map(Reply::from)
    }

    fn close(&mut self, handle: Handle) -> Result<Reply, DatabaseError> {
        if self.closed.contains(&handle) {
            return Ok(Reply::Closed { handle });
        }
        let database = self.databases.remove(&handle).ok_or(DatabaseError::NotInitialized)?;
        self.closed.insert(handle);
        database.close()?;
        info!(handle, "database handle closed");
        Ok(Reply::Closed { handle })
    }

    /// Number of handles with an open database.
    pub fn open_handles(&self) -> usize {
        self.databases.len()
    }

    /// Decode a request, handle it and encode the response.
    ///
    /// A request that does not decode still gets a `Serialization` error
    /// response, carrying the request id when the leading id could be read
    /// and 0 otherwise. `Err` is left for a response that cannot be encoded.
    pub fn handle_bytes(&mut self, bytes: &[u8]) -> Result<Vec<u8>, DatabaseError> {
        let response = match codec::decode_request(bytes) {
            Ok(request) => self.handle(request),
            Err(e) => {
                debug!(error = %e, "undecodable request");
                Response {
                    id: codec::peek_request_id(bytes).unwrap_or(0),
                    outcome: Err(ErrorMessage::from(&e)),
                }
            }
        };
        codec::encode_response(&response)
    }
}
