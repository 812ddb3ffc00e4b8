use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    config::DatabaseConfig,
    executor::{Executor, ResultSet, StatementResult, query},
    planner::{SqlParser, Statement},
    storage::{btree::TreeStats, pager::Pager, schema::Catalog},
    types::error::DatabaseError,
};

struct Engine {
    pager: Pager,
    catalog: Catalog,
}

impl Engine {
    /// Run one statement as its own transaction: commit on success,
    /// otherwise discard every page it dirtied and restore the catalog.
    fn execute_mut(&mut self, statement: &Statement) -> Result<StatementResult, DatabaseError> {
        let snapshot = self.catalog.clone();
        let executed = Executor::new(&mut self.pager, &mut self.catalog).execute(statement);
        let outcome = executed.and_then(|result| {
            self.pager.commit()?;
            Ok(result)
        });
        if let Err(e) = &outcome {
            warn!(statement = %statement.describe(), error = %e, "rolling back statement");
            self.pager.rollback();
            self.catalog = snapshot;
        }
        outcome
    }
}

/// An open database.
///
/// SELECT runs under a shared lock so readers proceed together; every
/// other statement, and `close`, takes the lock exclusively. The handle is
/// `Send + Sync` and can be shared through an `Arc`.
///
/// A failed commit closes the handle, since the file may be torn; later
/// calls report `NotInitialized` until the database is reopened.
pub struct Database {
    engine: RwLock<Option<Engine>>,
    parser: SqlParser,
}

impl Database {
    pub fn open(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let init_failed = |e: DatabaseError| match e {
            DatabaseError::InitFailed { .. } => e,
            other => DatabaseError::InitFailed {
                reason: other.to_string(),
            },
        };
        let pager = Pager::open(config).map_err(init_failed)?;
        let catalog = Catalog::load(&pager).map_err(init_failed)?;
        info!(
            storage = ?config.storage,
            tables = catalog.table_names().len(),
            "database ready"
        );
        Ok(Self {
            engine: RwLock::new(Some(Engine { pager, catalog })),
            parser: SqlParser::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::open(&DatabaseConfig::memory())
    }

    /// Parse and run one statement.
    pub fn execute(&self, sql: &str) -> Result<StatementResult, DatabaseError> {
        let statement = self.parser.parse(sql)?;
        self.execute_statement(&statement)
    }

    /// Run an already parsed statement.
    pub fn execute_statement(&self, statement: &Statement) -> Result<StatementResult, DatabaseError> {
        if let Statement::Select(plan) = statement {
            let guard = self.engine.read();
            let engine = guard.as_ref().ok_or(DatabaseError::NotInitialized)?;
            return query(&engine.pager, &engine.catalog, plan).map(StatementResult::Rows);
        }
        let mut guard = self.engine.write();
        let engine = guard.as_mut().ok_or(DatabaseError::NotInitialized)?;
        let outcome = engine.execute_mut(statement);
        if engine.pager.is_poisoned() {
            error!("closing database after a failed commit");
            *guard = None;
        }
        outcome
    }

    /// Run every statement of a script in order, stopping at the first
    /// failure. Statements before the failing one stay committed; nothing
    /// runs if the script does not parse.
    pub fn execute_script(&self, sql: &str) -> Result<Vec<StatementResult>, DatabaseError> {
        let statements = self.parser.parse_script(sql)?;
        statements
            .iter()
            .map(|statement| self.execute_statement(statement))
            .collect()
    }

    /// Convenience for SELECT: the rows, or an error for other statements.
    pub fn query(&self, sql: &str) -> Result<ResultSet, DatabaseError> {
        self.execute(sql)?
            .into_rows()
            .ok_or_else(|| DatabaseError::exec("statement does not return rows"))
    }

    pub fn table_names(&self) -> Result<Vec<String>, DatabaseError> {
        let guard = self.engine.read();
        let engine = guard.as_ref().ok_or(DatabaseError::NotInitialized)?;
        Ok(engine.catalog.table_names())
    }

    /// Walk a table's tree and verify its ordering and balance.
    pub fn check_table(&self, table_name: &str) -> Result<TreeStats, DatabaseError> {
        let guard = self.engine.read();
        let engine = guard.as_ref().ok_or(DatabaseError::NotInitialized)?;
        engine.catalog.get_table(table_name)?.tree().check(&engine.pager)
    }

    pub fn page_count(&self) -> Result<u64, DatabaseError> {
        let guard = self.engine.read();
        let engine = guard.as_ref().ok_or(DatabaseError::NotInitialized)?;
        Ok(engine.pager.page_count())
    }

    pub fn is_closed(&self) -> bool {
        self.engine.read().is_none()
    }

    /// Release the backing store. Closing an already closed handle does
    /// nothing.
    pub fn close(&self) -> Result<(), DatabaseError> {
        let mut guard = self.engine.write();
        match guard.take() {
            Some(mut engine) => {
                if engine.pager.has_uncommitted_changes() {
                    debug!("discarding uncommitted pages on close");
                    engine.pager.rollback();
                }
                info!("database closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}
