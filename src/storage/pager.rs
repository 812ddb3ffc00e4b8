use std::collections::BTreeMap;

use tracing::{debug, error, info, trace};

use crate::{
    config::{DatabaseConfig, StorageMode},
    storage::{
        backing::{BackingStore, FileStore, MemoryStore},
        header::DatabaseHeader,
    },
    types::{
        HEADER_SIZE, PageId,
        error::DatabaseError,
        page::{Page, PageType},
    },
};

/// Page store: allocation, free list and the dirty-page set over one
/// backing store.
///
/// Every write goes to the dirty set. `commit` flushes it together with the
/// header; `rollback` drops it and restores the header as of the last
/// commit, which is how a failed statement leaves no trace.
///
/// Pages are written in place with the header last and there is no
/// journal. A commit that fails part way leaves the backing store torn, so
/// the pager refuses all further work until it is reopened.
pub struct Pager {
    store: Box<dyn BackingStore>,
    page_size: usize,
    max_page_count: u64,
    sync_on_commit: bool,
    header: DatabaseHeader,
    committed_header: DatabaseHeader,
    dirty: BTreeMap<PageId, Page>,
    poisoned: bool,
}

impl Pager {
    pub fn open(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        config.validate()?;
        let store: Box<dyn BackingStore> = match &config.storage {
            StorageMode::Memory => Box::new(MemoryStore::new()),
            StorageMode::File(path) => Box::new(FileStore::open(path)?),
        };
        Self::with_store(store, config)
    }

    pub fn with_store(store: Box<dyn BackingStore>, config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let len = store.len()?;
        if len == 0 {
            info!(store = %store.describe(), page_size = config.page_size, "creating new database");
            let header = DatabaseHeader::new(config.page_size);
            let mut pager = Self {
                store,
                page_size: config.page_size,
                max_page_count: config.max_page_count,
                sync_on_commit: config.sync_on_commit,
                committed_header: header.clone(),
                header,
                dirty: BTreeMap::new(),
                poisoned: false,
            };
            let catalog_root = pager.allocate(PageType::LeafTable)?;
            pager.header.catalog_root = catalog_root;
            pager.commit()?;
            return Ok(pager);
        }

        let mut header_bytes = vec![0u8; HEADER_SIZE];
        store.read_at(0, &mut header_bytes)?;
        let header = DatabaseHeader::from_bytes(&header_bytes)?;
        let page_size = header.page_size as usize;
        let expected_len = HEADER_SIZE as u64 + header.page_count * page_size as u64;
        if len < expected_len {
            return Err(DatabaseError::InvalidHeader {
                reason: format!(
                    "file holds {} bytes but header declares {} pages ({} bytes)",
                    len, header.page_count, expected_len
                ),
            });
        }
        if page_size != config.page_size {
            debug!(
                configured = config.page_size,
                stored = page_size,
                "using page size recorded in database header"
            );
        }
        info!(
            store = %store.describe(),
            page_count = header.page_count,
            free_pages = header.freelist_count,
            "opened existing database"
        );
        Ok(Self {
            store,
            page_size,
            max_page_count: config.max_page_count,
            sync_on_commit: config.sync_on_commit,
            committed_header: header.clone(),
            header,
            dirty: BTreeMap::new(),
            poisoned: false,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn header(&self) -> &DatabaseHeader {
        &self.header
    }

    pub fn page_count(&self) -> u64 {
        self.header.page_count
    }

    pub fn catalog_root(&self) -> PageId {
        self.header.catalog_root
    }

    pub fn set_catalog_root(&mut self, root: PageId) {
        self.header.catalog_root = root;
    }

    pub fn bump_schema_cookie(&mut self) {
        self.header.schema_cookie = self.header.schema_cookie.wrapping_add(1);
    }

    /// True once a commit has failed; the store must be reopened.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn check_usable(&self) -> Result<(), DatabaseError> {
        if self.poisoned {
            return Err(DatabaseError::Io(std::io::Error::other(
                "an earlier commit failed part way; reopen the database",
            )));
        }
        Ok(())
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        !self.dirty.is_empty() || self.header != self.committed_header
    }

    fn page_offset(&self, page_id: PageId) -> u64 {
        HEADER_SIZE as u64 + (page_id - 1) * self.page_size as u64
    }

    fn check_bounds(&self, page_id: PageId) -> Result<(), DatabaseError> {
        if page_id == 0 || page_id > self.header.page_count {
            return Err(DatabaseError::corrupt(
                page_id,
                format!("page out of range (page count {})", self.header.page_count),
            ));
        }
        Ok(())
    }

    /// Hand out a fresh page of the given kind, reusing the free list first.
    pub fn allocate(&mut self, page_type: PageType) -> Result<PageId, DatabaseError> {
        self.check_usable()?;
        let page_id = match self.header.freelist_head {
            Some(free_id) => {
                let free_page = self.read(free_id)?;
                if free_page.page_type != PageType::Free {
                    return Err(DatabaseError::corrupt(
                        free_id,
                        format!("free list entry has type {:?}", free_page.page_type),
                    ));
                }
                self.header.freelist_head = free_page.link;
                self.header.freelist_count = self.header.freelist_count.saturating_sub(1);
                free_id
            }
            None => {
                if self.header.page_count >= self.max_page_count {
                    return Err(DatabaseError::StorageFull {
                        max_pages: self.max_page_count,
                    });
                }
                self.header.page_count += 1;
                self.header.page_count
            }
        };
        debug!(page_id, ?page_type, "allocated page");
        self.dirty
            .insert(page_id, Page::new(page_id, page_type, self.page_size));
        Ok(page_id)
    }

    pub fn read(&self, page_id: PageId) -> Result<Page, DatabaseError> {
        self.check_usable()?;
        self.check_bounds(page_id)?;
        if let Some(page) = self.dirty.get(&page_id) {
            return Ok(page.clone());
        }
        let mut buffer = vec![0u8; self.page_size];
        self.store.read_at(self.page_offset(page_id), &mut buffer)?;
        Page::from_bytes(page_id, &buffer)
    }

    pub fn write(&mut self, page: Page) -> Result<(), DatabaseError> {
        self.check_usable()?;
        self.check_bounds(page.page_id)?;
        if page.page_size() != self.page_size {
            return Err(DatabaseError::exec(format!(
                "page {} has size {}, database uses {}",
                page.page_id,
                page.page_size(),
                self.page_size
            )));
        }
        trace!(page_id = page.page_id, page_type = ?page.page_type, "page dirtied");
        self.dirty.insert(page.page_id, page);
        Ok(())
    }

    /// Return a page to the free list.
    pub fn free(&mut self, page_id: PageId) -> Result<(), DatabaseError> {
        self.check_usable()?;
        self.check_bounds(page_id)?;
        let mut page = Page::new(page_id, PageType::Free, self.page_size);
        page.link = self.header.freelist_head;
        self.dirty.insert(page_id, page);
        self.header.freelist_head = Some(page_id);
        self.header.freelist_count += 1;
        debug!(page_id, free_pages = self.header.freelist_count, "freed page");
        Ok(())
    }

    /// Flush the dirty set and the header to the backing store.
    ///
    /// On failure the pager is poisoned: some pages may already be on disk.
    pub fn commit(&mut self) -> Result<(), DatabaseError> {
        self.check_usable()?;
        if !self.has_uncommitted_changes() {
            return Ok(());
        }
        self.header.file_change_counter = self.header.file_change_counter.wrapping_add(1);
        let flushed = self.dirty.len();
        if let Err(e) = self.flush() {
            self.poisoned = true;
            error!(error = %e, "commit failed part way, pager poisoned");
            return Err(e);
        }
        self.dirty.clear();
        self.committed_header = self.header.clone();
        debug!(
            pages = flushed,
            page_count = self.header.page_count,
            change_counter = self.header.file_change_counter,
            "committed"
        );
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DatabaseError> {
        for (&page_id, page) in &self.dirty {
            let offset = self.page_offset(page_id);
            self.store.write_at(offset, &page.to_bytes())?;
        }
        self.store.write_at(0, &self.header.to_bytes())?;
        if self.sync_on_commit {
            self.store.sync()?;
        }
        Ok(())
    }

    /// Discard everything written since the last commit.
    pub fn rollback(&mut self) {
        let discarded = self.dirty.len();
        self.dirty.clear();
        self.header = self.committed_header.clone();
        debug!(pages = discarded, "rolled back dirty pages");
    }

    /// Ids on the free list, head first.
    pub fn free_pages(&self) -> Result<Vec<PageId>, DatabaseError> {
        let mut pages = Vec::new();
        let mut next = self.header.freelist_head;
        while let Some(page_id) = next {
            if pages.len() as u64 > self.header.page_count {
                return Err(DatabaseError::corrupt(page_id, "free list contains a cycle"));
            }
            pages.push(page_id);
            next = self.read(page_id)?.link;
        }
        Ok(pages)
    }
}
