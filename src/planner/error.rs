use sqlparser::tokenizer::{Location, Token, TokenizerError};

use crate::types::error::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("SQL tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),
    #[error("expected {expected}, found {found}")]
    Unexpected {
        location: Location,
        expected: String,
        found: String,
    },
    #[error("Unsupported data type: {name}")]
    UnsupportedDataType { location: Location, name: String },
    #[error("Invalid literal {text}: {reason}")]
    InvalidLiteral {
        location: Location,
        text: String,
        reason: String,
    },
}

impl PlannerError {
    pub fn unexpected(location: Location, expected: impl Into<String>, found: Option<&Token>) -> Self {
        PlannerError::Unexpected {
            location,
            expected: expected.into(),
            found: found
                .map(|token| token.to_string())
                .unwrap_or_else(|| "end of input".to_string()),
        }
    }
}

impl From<PlannerError> for DatabaseError {
    fn from(error: PlannerError) -> Self {
        let (location, expected, found) = match error {
            PlannerError::Tokenizer(e) => (e.location, "a valid token".to_string(), e.message),
            PlannerError::Unexpected {
                location,
                expected,
                found,
            } => (location, expected, found),
            PlannerError::UnsupportedDataType { location, name } => {
                (location, "a column type".to_string(), name)
            }
            PlannerError::InvalidLiteral {
                location,
                text,
                reason,
            } => (location, format!("a valid literal ({reason})"), text),
        };
        DatabaseError::ParseError {
            line: location.line.max(1),
            column: location.column.max(1),
            expected,
            found,
        }
    }
}
