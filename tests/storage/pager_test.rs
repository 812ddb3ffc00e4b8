use std::{
    fs::OpenOptions,
    io::{Seek, SeekFrom, Write},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use lumbung::{
    config::DatabaseConfig,
    storage::{
        backing::{BackingStore, MemoryStore},
        pager::Pager,
    },
    types::{HEADER_SIZE, error::DatabaseError, page::PageType},
    utils::mock::TempDatabase,
};

#[test]
fn test_new_database_has_catalog_page() -> Result<(), DatabaseError> {
    let pager = Pager::open(&DatabaseConfig::memory())?;
    assert_eq!(pager.page_count(), 1);
    assert_eq!(pager.catalog_root(), 1);
    assert_eq!(pager.read(1)?.page_type, PageType::LeafTable);
    assert!(!pager.has_uncommitted_changes());
    Ok(())
}

#[test]
fn test_rollback_discards_dirty_pages() -> Result<(), DatabaseError> {
    let mut pager = Pager::open(&DatabaseConfig::memory())?;
    let page_id = pager.allocate(PageType::LeafTable)?;
    assert_eq!(page_id, 2);
    assert!(pager.has_uncommitted_changes());

    pager.rollback();
    assert_eq!(pager.page_count(), 1);
    assert!(pager.read(page_id).is_err());
    assert!(!pager.has_uncommitted_changes());
    Ok(())
}

#[test]
fn test_committed_writes_are_visible() -> Result<(), DatabaseError> {
    let mut pager = Pager::open(&DatabaseConfig::memory())?;
    let page_id = pager.allocate(PageType::Overflow)?;
    let mut page = pager.read(page_id)?;
    page.insert_cell(b"kept")?;
    pager.write(page)?;
    pager.commit()?;

    let mut page = pager.read(page_id)?;
    assert_eq!(page.get_cell(0), Some(b"kept".as_slice()));

    // An uncommitted change on top is undone by rollback
    page.insert_cell(b"dropped")?;
    pager.write(page)?;
    pager.rollback();
    assert_eq!(pager.read(page_id)?.cell_count(), 1);
    Ok(())
}

#[test]
fn test_freed_pages_are_reused() -> Result<(), DatabaseError> {
    let mut pager = Pager::open(&DatabaseConfig::memory())?;
    let a = pager.allocate(PageType::LeafTable)?;
    let b = pager.allocate(PageType::LeafTable)?;
    pager.commit()?;

    pager.free(a)?;
    pager.free(b)?;
    pager.commit()?;
    assert_eq!(pager.free_pages()?, vec![b, a]);
    assert_eq!(pager.header().freelist_count, 2);

    let count_before = pager.page_count();
    let reused = pager.allocate(PageType::LeafIndex)?;
    assert_eq!(reused, b);
    assert_eq!(pager.page_count(), count_before);
    assert_eq!(pager.read(reused)?.page_type, PageType::LeafIndex);
    assert_eq!(pager.free_pages()?, vec![a]);
    Ok(())
}

#[test]
fn test_storage_full() -> Result<(), DatabaseError> {
    let config = DatabaseConfig::builder().memory().max_page_count(3).build();
    let mut pager = Pager::open(&config)?;
    pager.allocate(PageType::LeafTable)?;
    pager.allocate(PageType::LeafTable)?;
    match pager.allocate(PageType::LeafTable) {
        Err(DatabaseError::StorageFull { max_pages }) => assert_eq!(max_pages, 3),
        other => panic!("Expected StorageFull, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_invalid_page_size_fails_to_open() {
    let config = DatabaseConfig::builder().memory().page_size(1000).build();
    assert!(matches!(
        Pager::open(&config),
        Err(DatabaseError::InitFailed { .. })
    ));
}

#[test]
fn test_file_pages_persist_across_reopen() -> Result<(), DatabaseError> {
    let temp_db = TempDatabase::with_prefix("pager_persist")?;
    let page_id = {
        let mut pager = temp_db.pager()?;
        let page_id = pager.allocate(PageType::Overflow)?;
        let mut page = pager.read(page_id)?;
        page.insert_cell(b"on disk")?;
        pager.write(page)?;
        pager.commit()?;
        page_id
    };

    let pager = temp_db.pager()?;
    assert_eq!(pager.page_count(), 2);
    assert_eq!(pager.read(page_id)?.get_cell(0), Some(b"on disk".as_slice()));
    Ok(())
}

#[test]
fn test_uncommitted_pages_never_reach_disk() -> Result<(), DatabaseError> {
    let temp_db = TempDatabase::with_prefix("pager_uncommitted")?;
    {
        let mut pager = temp_db.pager()?;
        pager.allocate(PageType::LeafTable)?;
    }
    let pager = temp_db.pager()?;
    assert_eq!(pager.page_count(), 1);
    Ok(())
}

#[test]
fn test_page_size_comes_from_existing_header() -> Result<(), DatabaseError> {
    let temp_db = TempDatabase::with_prefix("pager_page_size")?.with_page_size(1024);
    drop(temp_db.pager()?);

    let reopened = Pager::open(&DatabaseConfig::file(temp_db.path.clone()))?;
    assert_eq!(reopened.page_size(), 1024);
    Ok(())
}

#[test]
fn test_corrupted_page_is_reported() -> Result<(), DatabaseError> {
    let temp_db = TempDatabase::with_prefix("pager_corrupt")?;
    drop(temp_db.pager()?);

    let mut file = OpenOptions::new().write(true).open(&temp_db.path)?;
    file.seek(SeekFrom::Start(HEADER_SIZE as u64 + 100))?;
    file.write_all(&[0xAB; 16])?;
    drop(file);

    let pager = temp_db.pager()?;
    assert!(matches!(
        pager.read(1),
        Err(DatabaseError::CorruptPage { page_id: 1, .. })
    ));
    Ok(())
}

#[test]
fn test_bad_magic_is_rejected() -> Result<(), DatabaseError> {
    let temp_db = TempDatabase::with_prefix("pager_magic")?;
    drop(temp_db.pager()?);

    let mut file = OpenOptions::new().write(true).open(&temp_db.path)?;
    file.write_all(b"NOT A DATABASE!!")?;
    drop(file);

    assert!(matches!(
        temp_db.pager(),
        Err(DatabaseError::InvalidHeader { .. })
    ));
    Ok(())
}

/// Memory store whose writes start failing once a shared budget runs out.
struct FlakyStore {
    inner: MemoryStore,
    writes_left: Arc<AtomicUsize>,
}

impl BackingStore for FlakyStore {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), DatabaseError> {
        self.inner.read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), DatabaseError> {
        let allowed = self
            .writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(DatabaseError::Io(std::io::Error::other("disk full")));
        }
        self.inner.write_at(offset, data)
    }

    fn len(&self) -> Result<u64, DatabaseError> {
        self.inner.len()
    }

    fn sync(&mut self) -> Result<(), DatabaseError> {
        self.inner.sync()
    }

    fn describe(&self) -> String {
        "flaky memory".to_string()
    }
}

#[test]
fn test_failed_commit_poisons_pager() -> Result<(), DatabaseError> {
    let writes_left = Arc::new(AtomicUsize::new(usize::MAX));
    let store = FlakyStore {
        inner: MemoryStore::new(),
        writes_left: Arc::clone(&writes_left),
    };
    let mut pager = Pager::with_store(Box::new(store), &DatabaseConfig::memory())?;
    let kept = pager.allocate(PageType::LeafTable)?;
    pager.commit()?;
    assert!(!pager.is_poisoned());

    // Two pages and the header need three writes; only the first lands
    writes_left.store(1, Ordering::SeqCst);
    pager.allocate(PageType::LeafTable)?;
    pager.allocate(PageType::LeafIndex)?;
    assert!(matches!(pager.commit(), Err(DatabaseError::Io(_))));
    assert!(pager.is_poisoned());

    pager.rollback();
    writes_left.store(usize::MAX, Ordering::SeqCst);
    assert!(matches!(pager.read(kept), Err(DatabaseError::Io(_))));
    assert!(pager.allocate(PageType::LeafTable).is_err());
    assert!(pager.commit().is_err());
    Ok(())
}
