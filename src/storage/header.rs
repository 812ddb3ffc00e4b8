use crate::{
    storage::LUMBUNG_MAGIC,
    types::{HEADER_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE, PageId, error::DatabaseError},
};

const FORMAT_VERSION: u8 = 1;
const CHECKSUM_OFFSET: usize = 64;

/// Fixed 100-byte file header. All integers are big-endian.
///
/// ```text
/// magic(16) | page_size(4) | write_version(1) | read_version(1) | reserved(2)
/// change_counter(4) | page_count(8) | freelist_head(8) | freelist_count(8)
/// catalog_root(8) | schema_cookie(4) | header_crc(4) | zero padding
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseHeader {
    pub magic: [u8; 16],
    pub page_size: u32,
    pub file_format_write_version: u8,
    pub file_format_read_version: u8,
    pub file_change_counter: u32,
    pub page_count: u64,
    pub freelist_head: Option<PageId>,
    pub freelist_count: u64,
    pub catalog_root: PageId,
    pub schema_cookie: u32,
}

impl DatabaseHeader {
    pub fn new(page_size: usize) -> Self {
        Self {
            magic: *LUMBUNG_MAGIC,
            page_size: page_size as u32,
            file_format_write_version: FORMAT_VERSION,
            file_format_read_version: FORMAT_VERSION,
            file_change_counter: 0,
            page_count: 0,
            freelist_head: None,
            freelist_count: 0,
            catalog_root: 0,
            schema_cookie: 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(HEADER_SIZE);

        buffer.extend_from_slice(&self.magic);
        buffer.extend_from_slice(&self.page_size.to_be_bytes());
        buffer.push(self.file_format_write_version);
        buffer.push(self.file_format_read_version);
        buffer.extend_from_slice(&[0, 0]);
        buffer.extend_from_slice(&self.file_change_counter.to_be_bytes());
        buffer.extend_from_slice(&self.page_count.to_be_bytes());
        buffer.extend_from_slice(&self.freelist_head.unwrap_or(0).to_be_bytes());
        buffer.extend_from_slice(&self.freelist_count.to_be_bytes());
        buffer.extend_from_slice(&self.catalog_root.to_be_bytes());
        buffer.extend_from_slice(&self.schema_cookie.to_be_bytes());

        let checksum = crc32fast::hash(&buffer[..CHECKSUM_OFFSET]);
        buffer.extend_from_slice(&checksum.to_be_bytes());
        buffer.resize(HEADER_SIZE, 0);
        buffer
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatabaseError> {
        if bytes.len() < HEADER_SIZE {
            return Err(invalid("Header too short"));
        }

        let mut magic = [0u8; 16];
        magic.copy_from_slice(&bytes[0..16]);
        if &magic != LUMBUNG_MAGIC {
            return Err(invalid("Invalid Lumbung magic number"));
        }

        let stored_checksum = be_u32(bytes, CHECKSUM_OFFSET);
        if crc32fast::hash(&bytes[..CHECKSUM_OFFSET]) != stored_checksum {
            return Err(invalid("Header checksum mismatch"));
        }

        let page_size = be_u32(bytes, 16);
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&(page_size as usize))
            || !page_size.is_power_of_two()
        {
            return Err(invalid(&format!("Unsupported page size: {}", page_size)));
        }

        let file_format_write_version = bytes[20];
        let file_format_read_version = bytes[21];
        if file_format_read_version > FORMAT_VERSION {
            return Err(invalid(&format!(
                "Unsupported file format version: {}",
                file_format_read_version
            )));
        }

        let freelist_head = match be_u64(bytes, 36) {
            0 => None,
            id => Some(id),
        };

        Ok(Self {
            magic,
            page_size,
            file_format_write_version,
            file_format_read_version,
            file_change_counter: be_u32(bytes, 24),
            page_count: be_u64(bytes, 28),
            freelist_head,
            freelist_count: be_u64(bytes, 44),
            catalog_root: be_u64(bytes, 52),
            schema_cookie: be_u32(bytes, 60),
        })
    }
}

fn invalid(reason: &str) -> DatabaseError {
    DatabaseError::InvalidHeader {
        reason: reason.to_string(),
    }
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn be_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_be_bytes(raw)
}
