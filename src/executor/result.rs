use serde::{Deserialize, Serialize};

use crate::types::value::Value;

/// Column names plus rows, as returned by SELECT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Outcome of one executed statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementResult {
    Rows(ResultSet),
    /// Rows inserted, updated or deleted; zero for schema changes
    Affected(u64),
}

impl StatementResult {
    pub fn rows(&self) -> Option<&ResultSet> {
        match self {
            StatementResult::Rows(rows) => Some(rows),
            StatementResult::Affected(_) => None,
        }
    }

    pub fn into_rows(self) -> Option<ResultSet> {
        match self {
            StatementResult::Rows(rows) => Some(rows),
            StatementResult::Affected(_) => None,
        }
    }

    pub fn affected(&self) -> Option<u64> {
        match self {
            StatementResult::Affected(n) => Some(*n),
            StatementResult::Rows(_) => None,
        }
    }
}
