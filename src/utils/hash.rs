use crc32fast::Hasher;

use crate::types::{CHECKSUM_SIZE, PageId};

/// CRC32 over everything in a serialized page after the checksum field.
/// The page id is mixed in so a page written at the wrong offset fails
/// verification.
pub fn calculate_page_checksum(page_id: PageId, page_bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&page_id.to_le_bytes());
    hasher.update(&page_bytes[CHECKSUM_SIZE..]);
    hasher.finalize()
}

pub fn verify_page_checksum(page_id: PageId, page_bytes: &[u8]) -> bool {
    if page_bytes.len() < CHECKSUM_SIZE {
        return false;
    }
    let stored = u32::from_le_bytes([page_bytes[0], page_bytes[1], page_bytes[2], page_bytes[3]]);
    calculate_page_checksum(page_id, page_bytes) == stored
}
