use std::path::PathBuf;

use tempfile::TempDir;

use crate::{
    config::DatabaseConfig,
    database::Database,
    storage::pager::Pager,
    types::error::DatabaseError,
};

/// Scratch database file in its own temporary directory, removed on drop.
pub struct TempDatabase {
    _dir: TempDir,
    pub path: PathBuf,
    config: DatabaseConfig,
    database: Option<Database>,
}

impl TempDatabase {
    pub fn new() -> Result<Self, DatabaseError> {
        Self::with_prefix("lumbung_test")
    }

    pub fn with_prefix(prefix: &str) -> Result<Self, DatabaseError> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        let path = dir.path().join("test.db");
        Ok(Self {
            config: DatabaseConfig::file(path.clone()),
            path,
            _dir: dir,
            database: None,
        })
    }

    /// Use a non-default page size for databases created from here on.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    pub fn config(&self) -> DatabaseConfig {
        self.config.clone()
    }

    /// Open the database, closing any handle opened earlier.
    pub fn open(&mut self) -> Result<&Database, DatabaseError> {
        self.close()?;
        Ok(self.database.insert(Database::open(&self.config)?))
    }

    /// Same as `open`; reads as intent in persistence tests.
    pub fn reopen(&mut self) -> Result<&Database, DatabaseError> {
        self.open()
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn close(&mut self) -> Result<(), DatabaseError> {
        match self.database.take() {
            Some(database) => database.close(),
            None => Ok(()),
        }
    }

    /// A bare pager over the file, for tests below the SQL layer. Close the
    /// database first; two writers on one file corrupt it.
    pub fn pager(&self) -> Result<Pager, DatabaseError> {
        Pager::open(&self.config)
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
