//! Lumbung: an embedded single-file SQL engine.
//!
//! Rows live in paged B+trees behind a checksummed page store; a small SQL
//! dialect is parsed into statements and run one implicit transaction at a
//! time. [`Database`] is the direct entry point and
//! [`command::CommandHandler`] the request/response one.

pub mod command;
pub mod config;
pub mod database;
pub mod executor;
pub mod planner;
pub mod storage;
pub mod types;
pub mod utils;

pub use config::{DatabaseConfig, StorageMode};
pub use database::Database;
pub use executor::{ResultSet, StatementResult};
pub use types::{error::DatabaseError, value::Value};
