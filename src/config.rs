//! Configuration for a Lumbung database handle.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE, error::DatabaseError};

/// Where the pages live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    /// Pages kept in a growable buffer and dropped on close.
    Memory,
    /// Single page file; created if missing, reopened otherwise.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub storage: StorageMode,

    /// Page size for newly created databases. Existing files keep the page
    /// size recorded in their header.
    pub page_size: usize,

    /// Growth limit; allocation past it fails with `StorageFull`.
    pub max_page_count: u64,

    /// fsync the file after every committed statement
    pub sync_on_commit: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            storage: StorageMode::Memory,
            page_size: DEFAULT_PAGE_SIZE,
            max_page_count: (1 << 30) - 1,
            sync_on_commit: true,
        }
    }
}

impl DatabaseConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageMode::File(path.into()),
            ..Self::default()
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), DatabaseError> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size)
            || !self.page_size.is_power_of_two()
        {
            return Err(DatabaseError::InitFailed {
                reason: format!(
                    "page size {} must be a power of two between {} and {}",
                    self.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
                ),
            });
        }
        if self.max_page_count < 1 {
            return Err(DatabaseError::InitFailed {
                reason: "max_page_count must allow at least the catalog page".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for DatabaseConfig
#[derive(Default)]
pub struct ConfigBuilder {
    config: DatabaseConfig,
}

impl ConfigBuilder {
    pub fn memory(mut self) -> Self {
        self.config.storage = StorageMode::Memory;
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage = StorageMode::File(path.into());
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    pub fn max_page_count(mut self, count: u64) -> Self {
        self.config.max_page_count = count;
        self
    }

    pub fn sync_on_commit(mut self, sync: bool) -> Self {
        self.config.sync_on_commit = sync;
        self
    }

    pub fn build(self) -> DatabaseConfig {
        self.config
    }
}
