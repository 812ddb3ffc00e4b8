use crate::{
    types::{PAGE_HEADER_SIZE, PageId, SLOT_DIRECTORY_ENTRY_SIZE, error::DatabaseError},
    utils::hash::{calculate_page_checksum, verify_page_checksum},
};

/// Closed set of page kinds. The tag byte is stored in every page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Free = 0,
    InteriorIndex = 2,
    InteriorTable = 5,
    LeafIndex = 10,
    LeafTable = 13,
    Overflow = 15,
}

impl PageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PageType::Free),
            2 => Some(PageType::InteriorIndex),
            5 => Some(PageType::InteriorTable),
            10 => Some(PageType::LeafIndex),
            13 => Some(PageType::LeafTable),
            15 => Some(PageType::Overflow),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, PageType::LeafTable | PageType::LeafIndex)
    }

    pub fn is_interior(&self) -> bool {
        matches!(self, PageType::InteriorTable | PageType::InteriorIndex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEntry {
    pub offset: u16, // Offset from beginning of page
    pub length: u16, // Length of the cell
}

/*
 * Page Layout on Disk (Slotted Page Structure)
 * ┌─────────────────────────────────────────────────────────────────┐
 * │                    PAGE HEADER (32 bytes)                       │
 * │  checksum(4) | page_type(1) | reserved(1) | cell_count(2) |     │
 * │  free_space_offset(2) | reserved(6) | page_id(8) | link(8)      │
 * ├─────────────────────────────────────────────────────────────────┤
 * │                  SLOT DIRECTORY                                 │
 * │  [slot0: offset(2)|len(2)] [slot1: offset(2)|len(2)] ...        │
 * ├─────────────────────────────────────────────────────────────────┤
 * │                    FREE SPACE                                   │
 * ├─────────────────────────────────────────────────────────────────┤
 * │                   CELL DATA                                     │
 * │  [...cell N...] [...cell 2...] [...cell 1...] [...cell 0...]    │
 * └─────────────────────────────────────────────────────────────────┘
 *
 * `link` is the right child of an interior page, the next leaf of a leaf
 * page, the next free page of a free page and the next page of an overflow
 * chain. u64::MAX encodes "none".
 */

const TYPE_OFFSET: usize = 4;
const CELL_COUNT_OFFSET: usize = 6;
const FREE_SPACE_OFFSET: usize = 8;
const PAGE_ID_OFFSET: usize = 16;
const LINK_OFFSET: usize = 24;
const NO_PAGE: u64 = u64::MAX;

#[derive(Debug, Clone)]
pub struct Page {
    pub page_id: PageId,
    pub page_type: PageType,
    pub link: Option<PageId>,
    pub slots: Vec<SlotEntry>,
    pub free_space_offset: usize,
    pub data: Vec<u8>,
}

impl Page {
    pub fn new(page_id: PageId, page_type: PageType, page_size: usize) -> Self {
        Self {
            page_id,
            page_type,
            link: None,
            slots: Vec::new(),
            free_space_offset: page_size,
            data: vec![0; page_size],
        }
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn cell_count(&self) -> usize {
        self.slots.len()
    }

    /// Serialize the page, stamping the checksum into the first four bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let page_size = self.page_size();
        let mut buffer = vec![0u8; page_size];

        buffer[TYPE_OFFSET] = self.page_type.as_u8();
        buffer[CELL_COUNT_OFFSET..CELL_COUNT_OFFSET + 2]
            .copy_from_slice(&(self.slots.len() as u16).to_le_bytes());
        // A page-sized free offset (empty page) of 32768 still fits in u16
        buffer[FREE_SPACE_OFFSET..FREE_SPACE_OFFSET + 2]
            .copy_from_slice(&(self.free_space_offset as u16).to_le_bytes());
        buffer[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 8].copy_from_slice(&self.page_id.to_le_bytes());
        buffer[LINK_OFFSET..LINK_OFFSET + 8]
            .copy_from_slice(&self.link.unwrap_or(NO_PAGE).to_le_bytes());

        let mut offset = PAGE_HEADER_SIZE;
        for slot in &self.slots {
            buffer[offset..offset + 2].copy_from_slice(&slot.offset.to_le_bytes());
            buffer[offset + 2..offset + 4].copy_from_slice(&slot.length.to_le_bytes());
            offset += SLOT_DIRECTORY_ENTRY_SIZE;
        }

        buffer[self.free_space_offset..].copy_from_slice(&self.data[self.free_space_offset..]);

        let checksum = calculate_page_checksum(self.page_id, &buffer);
        buffer[0..4].copy_from_slice(&checksum.to_le_bytes());
        buffer
    }

    /// Deserialize a page read from position `page_id` of the backing store.
    pub fn from_bytes(page_id: PageId, bytes: &[u8]) -> Result<Self, DatabaseError> {
        let page_size = bytes.len();
        if page_size < PAGE_HEADER_SIZE {
            return Err(DatabaseError::corrupt(page_id, "page shorter than its header"));
        }
        if !verify_page_checksum(page_id, bytes) {
            return Err(DatabaseError::corrupt(page_id, "checksum mismatch"));
        }

        let page_type = PageType::from_u8(bytes[TYPE_OFFSET]).ok_or_else(|| {
            DatabaseError::corrupt(page_id, format!("invalid page type tag {}", bytes[TYPE_OFFSET]))
        })?;
        let cell_count = read_u16(bytes, CELL_COUNT_OFFSET) as usize;
        let free_space_offset = read_u16(bytes, FREE_SPACE_OFFSET) as usize;
        let stored_id = read_u64(bytes, PAGE_ID_OFFSET);
        if stored_id != page_id {
            return Err(DatabaseError::corrupt(
                page_id,
                format!("page header claims id {}", stored_id),
            ));
        }
        let link = match read_u64(bytes, LINK_OFFSET) {
            NO_PAGE => None,
            id => Some(id),
        };

        let directory_end = PAGE_HEADER_SIZE + cell_count * SLOT_DIRECTORY_ENTRY_SIZE;
        if directory_end > free_space_offset || free_space_offset > page_size {
            return Err(DatabaseError::corrupt(
                page_id,
                format!(
                    "slot directory ({} cells) overlaps cell area at {}",
                    cell_count, free_space_offset
                ),
            ));
        }

        let mut slots = Vec::with_capacity(cell_count);
        for i in 0..cell_count {
            let at = PAGE_HEADER_SIZE + i * SLOT_DIRECTORY_ENTRY_SIZE;
            let slot = SlotEntry {
                offset: read_u16(bytes, at),
                length: read_u16(bytes, at + 2),
            };
            if (slot.offset as usize) < free_space_offset
                || slot.offset as usize + slot.length as usize > page_size
            {
                return Err(DatabaseError::corrupt(
                    page_id,
                    format!(
                        "Slot at offset {} with length {} exceeds page boundary",
                        slot.offset, slot.length
                    ),
                ));
            }
            slots.push(slot);
        }

        Ok(Page {
            page_id,
            page_type,
            link,
            slots,
            free_space_offset,
            data: bytes.to_vec(),
        })
    }

    pub fn available_space(&self) -> usize {
        let slot_directory_size = self.slots.len() * SLOT_DIRECTORY_ENTRY_SIZE;
        self.free_space_offset - PAGE_HEADER_SIZE - slot_directory_size
    }

    pub fn can_fit(&self, data_size: usize) -> bool {
        self.available_space() >= data_size + SLOT_DIRECTORY_ENTRY_SIZE
    }

    /// Append a cell at the end of the slot directory.
    pub fn insert_cell(&mut self, data: &[u8]) -> Result<usize, DatabaseError> {
        if !self.can_fit(data.len()) {
            return Err(DatabaseError::exec(format!(
                "cell of {} bytes does not fit in page {}",
                data.len(),
                self.page_id
            )));
        }

        // Cells grow downward from the end of the page
        let new_offset = self.free_space_offset - data.len();
        self.data[new_offset..new_offset + data.len()].copy_from_slice(data);

        let slot_index = self.slots.len();
        self.slots.push(SlotEntry {
            offset: new_offset as u16,
            length: data.len() as u16,
        });
        self.free_space_offset = new_offset;
        Ok(slot_index)
    }

    pub fn get_cell(&self, slot_index: usize) -> Option<&[u8]> {
        self.slots.get(slot_index).map(|slot| {
            let start = slot.offset as usize;
            &self.data[start..start + slot.length as usize]
        })
    }

    pub fn cells(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.slots.len()).filter_map(move |i| self.get_cell(i))
    }

    pub fn delete_cell(&mut self, slot_index: usize) -> Result<(), DatabaseError> {
        if slot_index >= self.slots.len() {
            return Err(DatabaseError::exec(format!(
                "invalid slot index {} (max: {})",
                slot_index,
                self.slots.len()
            )));
        }
        self.slots.remove(slot_index);
        self.compact_page();
        Ok(())
    }

    /// Remove every cell, keeping type, id and link.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_space_offset = self.page_size();
        self.data.fill(0);
    }

    // Defragment the page by moving all cells to eliminate gaps
    fn compact_page(&mut self) {
        let page_size = self.page_size();
        let cells: Vec<Vec<u8>> = self.cells().map(|c| c.to_vec()).collect();
        self.data[PAGE_HEADER_SIZE..].fill(0);
        let mut current_offset = page_size;
        for (slot, cell) in self.slots.iter_mut().zip(&cells) {
            current_offset -= cell.len();
            self.data[current_offset..current_offset + cell.len()].copy_from_slice(cell);
            slot.offset = current_offset as u16;
        }
        self.free_space_offset = current_offset;
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}
