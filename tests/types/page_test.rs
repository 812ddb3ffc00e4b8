use lumbung::types::{
    DEFAULT_PAGE_SIZE, PAGE_HEADER_SIZE,
    error::DatabaseError,
    page::{Page, PageType},
};

#[test]
fn test_page_creation() {
    let page = Page::new(3, PageType::LeafTable, DEFAULT_PAGE_SIZE);
    assert_eq!(page.page_id, 3);
    assert_eq!(page.page_type, PageType::LeafTable);
    assert_eq!(page.cell_count(), 0);
    assert_eq!(page.link, None);
    assert_eq!(page.available_space(), DEFAULT_PAGE_SIZE - PAGE_HEADER_SIZE);
}

#[test]
fn test_page_type_tags() {
    for page_type in [
        PageType::Free,
        PageType::InteriorIndex,
        PageType::InteriorTable,
        PageType::LeafIndex,
        PageType::LeafTable,
        PageType::Overflow,
    ] {
        assert_eq!(PageType::from_u8(page_type.as_u8()), Some(page_type));
    }
    assert_eq!(PageType::from_u8(1), None);
    assert!(PageType::LeafIndex.is_leaf());
    assert!(PageType::InteriorTable.is_interior());
}

#[test]
fn test_cells_survive_serialization() -> Result<(), DatabaseError> {
    let mut page = Page::new(5, PageType::LeafIndex, DEFAULT_PAGE_SIZE);
    page.insert_cell(b"first")?;
    page.insert_cell(b"second cell")?;
    page.link = Some(9);

    let restored = Page::from_bytes(5, &page.to_bytes())?;
    assert_eq!(restored.page_type, PageType::LeafIndex);
    assert_eq!(restored.link, Some(9));
    let cells: Vec<&[u8]> = restored.cells().collect();
    assert_eq!(cells, vec![b"first".as_slice(), b"second cell".as_slice()]);
    Ok(())
}

#[test]
fn test_delete_cell() -> Result<(), DatabaseError> {
    let mut page = Page::new(1, PageType::LeafTable, DEFAULT_PAGE_SIZE);
    page.insert_cell(b"a")?;
    page.insert_cell(b"b")?;
    page.delete_cell(0)?;
    assert_eq!(page.cell_count(), 1);
    assert_eq!(page.get_cell(0), Some(b"b".as_slice()));
    assert!(page.delete_cell(4).is_err());
    Ok(())
}

#[test]
fn test_full_page_rejects_cells() {
    let mut page = Page::new(1, PageType::Overflow, 512);
    let big = vec![7u8; 200];
    let mut inserted = 0;
    while page.can_fit(big.len()) {
        page.insert_cell(&big).unwrap();
        inserted += 1;
    }
    assert_eq!(inserted, 2);
    assert!(page.insert_cell(&big).is_err());
}

#[test]
fn test_flipped_bit_is_detected() {
    let mut page = Page::new(2, PageType::LeafTable, DEFAULT_PAGE_SIZE);
    page.insert_cell(b"payload").unwrap();
    let mut bytes = page.to_bytes();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    match Page::from_bytes(2, &bytes) {
        Err(DatabaseError::CorruptPage { page_id, reason }) => {
            assert_eq!(page_id, 2);
            assert!(reason.contains("checksum"));
        }
        other => panic!("Expected CorruptPage, got {:?}", other),
    }
}

#[test]
fn test_page_read_at_wrong_position_is_detected() {
    let page = Page::new(2, PageType::LeafTable, DEFAULT_PAGE_SIZE);
    let bytes = page.to_bytes();
    assert!(matches!(
        Page::from_bytes(3, &bytes),
        Err(DatabaseError::CorruptPage { page_id: 3, .. })
    ));
}
