pub mod error;
pub mod page;
pub mod record;
pub mod row;
pub mod value;

// Common type aliases
pub type PageId = u64;
pub type RowId = i64;

// Page size bounds; slot offsets are u16 so pages stay below 64 KiB
pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const MIN_PAGE_SIZE: usize = 512;
pub const MAX_PAGE_SIZE: usize = 32768;

pub const HEADER_SIZE: usize = 100; // Database file header size
pub const PAGE_HEADER_SIZE: usize = 32; // Per-page header
pub const SLOT_DIRECTORY_ENTRY_SIZE: usize = 4; // offset (2 bytes) + length (2 bytes)
pub const CHECKSUM_SIZE: usize = 4; // CRC32 checksum size
pub const OVERFLOW_POINTER_SIZE: usize = 8; // PageId for overflow page

/// Largest cell a b-tree page will hold inline. Four cells always fit in a
/// page, which keeps both halves of a split within capacity.
pub fn max_local_cell(page_size: usize) -> usize {
    (page_size - PAGE_HEADER_SIZE) / 4 - SLOT_DIRECTORY_ENTRY_SIZE
}
