//! In-memory view of a b-tree page.
//!
//! A `Node` is decoded from a `Page` by dispatching on the page type tag and
//! encoded back into a fresh page when stored. Cell layouts:
//!
//! ```text
//! table leaf      key(8) | payload_len(4) | flags(1) | local bytes | [overflow(8)]
//! index leaf      key bytes
//! table interior  child(8) | key(8)
//! index interior  child(8) | key bytes
//! ```

use std::cmp::Ordering;

use crate::types::{
    PAGE_HEADER_SIZE, PageId, RowId, SLOT_DIRECTORY_ENTRY_SIZE,
    error::DatabaseError,
    max_local_cell,
    page::{Page, PageType},
    record::compare_records,
};

const FLAG_OVERFLOW: u8 = 0x01;
const TABLE_LEAF_PREFIX: usize = 8 + 4 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    /// Keyed by rowid, values are encoded records
    Table,
    /// Keyed by encoded records, no values
    Index,
}

impl TreeKind {
    pub fn leaf_type(self) -> PageType {
        match self {
            TreeKind::Table => PageType::LeafTable,
            TreeKind::Index => PageType::LeafIndex,
        }
    }

    pub fn interior_type(self) -> PageType {
        match self {
            TreeKind::Table => PageType::InteriorTable,
            TreeKind::Index => PageType::InteriorIndex,
        }
    }

    pub fn compare(self, a: &[u8], b: &[u8]) -> Result<Ordering, DatabaseError> {
        match self {
            // Rowid keys are order-preserving big-endian
            TreeKind::Table => Ok(a.cmp(b)),
            TreeKind::Index => compare_records(a, b),
        }
    }
}

/// Order-preserving 8-byte encoding of a rowid.
pub fn encode_rowid(row_id: RowId) -> Vec<u8> {
    ((row_id as u64) ^ (1 << 63)).to_be_bytes().to_vec()
}

pub fn decode_rowid(key: &[u8]) -> Result<RowId, DatabaseError> {
    let raw: [u8; 8] = key.try_into().map_err(|_| DatabaseError::SerializationError {
        details: format!("rowid key must be 8 bytes, got {}", key.len()),
    })?;
    Ok((u64::from_be_bytes(raw) ^ (1 << 63)) as RowId)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub total_len: u32,
    pub local: Vec<u8>,
    pub overflow: Option<PageId>,
}

impl Payload {
    pub fn inline(bytes: Vec<u8>) -> Self {
        Self {
            total_len: bytes.len() as u32,
            local: bytes,
            overflow: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafCell {
    pub key: Vec<u8>,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteriorCell {
    pub key: Vec<u8>,
    /// Subtree holding keys below `key`
    pub child: PageId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeBody {
    Leaf {
        cells: Vec<LeafCell>,
        next: Option<PageId>,
    },
    Interior {
        cells: Vec<InteriorCell>,
        /// Subtree holding keys at or above the last key
        right_child: PageId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub page_id: PageId,
    pub kind: TreeKind,
    pub body: NodeBody,
}

impl Node {
    pub fn empty_leaf(page_id: PageId, kind: TreeKind) -> Self {
        Self {
            page_id,
            kind,
            body: NodeBody::Leaf {
                cells: Vec::new(),
                next: None,
            },
        }
    }

    pub fn from_page(page: &Page, kind: TreeKind) -> Result<Self, DatabaseError> {
        let page_id = page.page_id;
        let body = if page.page_type == kind.leaf_type() {
            let mut cells = Vec::with_capacity(page.cell_count());
            for raw in page.cells() {
                cells.push(decode_leaf_cell(page_id, kind, raw)?);
            }
            NodeBody::Leaf {
                cells,
                next: page.link,
            }
        } else if page.page_type == kind.interior_type() {
            let mut cells = Vec::with_capacity(page.cell_count());
            for raw in page.cells() {
                cells.push(decode_interior_cell(page_id, kind, raw)?);
            }
            let right_child = page
                .link
                .ok_or_else(|| DatabaseError::corrupt(page_id, "interior page without right child"))?;
            NodeBody::Interior { cells, right_child }
        } else {
            return Err(DatabaseError::corrupt(
                page_id,
                format!("expected {:?} b-tree page, found {:?}", kind, page.page_type),
            ));
        };
        Ok(Self {
            page_id,
            kind,
            body,
        })
    }

    pub fn to_page(&self, page_size: usize) -> Result<Page, DatabaseError> {
        match &self.body {
            NodeBody::Leaf { cells, next } => {
                let mut page = Page::new(self.page_id, self.kind.leaf_type(), page_size);
                page.link = *next;
                for cell in cells {
                    page.insert_cell(&encode_leaf_cell(self.kind, cell))?;
                }
                Ok(page)
            }
            NodeBody::Interior { cells, right_child } => {
                let mut page = Page::new(self.page_id, self.kind.interior_type(), page_size);
                page.link = Some(*right_child);
                for cell in cells {
                    page.insert_cell(&encode_interior_cell(cell))?;
                }
                Ok(page)
            }
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf { .. })
    }

    pub fn len(&self) -> usize {
        match &self.body {
            NodeBody::Leaf { cells, .. } => cells.len(),
            NodeBody::Interior { cells, .. } => cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes taken by cells and their slots.
    pub fn used_bytes(&self) -> usize {
        match &self.body {
            NodeBody::Leaf { cells, .. } => cells
                .iter()
                .map(|c| leaf_cell_size(self.kind, c) + SLOT_DIRECTORY_ENTRY_SIZE)
                .sum(),
            NodeBody::Interior { cells, .. } => cells
                .iter()
                .map(|c| interior_cell_size(c) + SLOT_DIRECTORY_ENTRY_SIZE)
                .sum(),
        }
    }

    pub fn fits(&self, page_size: usize) -> bool {
        self.used_bytes() <= capacity(page_size)
    }

    pub fn is_underfull(&self, page_size: usize) -> bool {
        self.used_bytes() < capacity(page_size) / 2
    }
}

/// Space available to cells and slots in a b-tree page.
pub fn capacity(page_size: usize) -> usize {
    page_size - PAGE_HEADER_SIZE
}

/// Longest index key that still fits an interior cell.
pub fn max_index_key(page_size: usize) -> usize {
    max_local_cell(page_size) - 8
}

/// Largest payload stored entirely inside a table leaf cell.
pub fn max_inline_payload(page_size: usize) -> usize {
    max_local_cell(page_size) - TABLE_LEAF_PREFIX
}

/// Bytes kept in the leaf when a payload spills to overflow pages.
pub fn spilled_local_len(page_size: usize) -> usize {
    max_local_cell(page_size) - TABLE_LEAF_PREFIX - 8
}

pub fn leaf_cell_size(kind: TreeKind, cell: &LeafCell) -> usize {
    match kind {
        TreeKind::Table => {
            TABLE_LEAF_PREFIX
                + cell.payload.local.len()
                + if cell.payload.overflow.is_some() { 8 } else { 0 }
        }
        TreeKind::Index => cell.key.len(),
    }
}

pub fn interior_cell_size(cell: &InteriorCell) -> usize {
    8 + cell.key.len()
}

fn encode_leaf_cell(kind: TreeKind, cell: &LeafCell) -> Vec<u8> {
    match kind {
        TreeKind::Table => {
            let mut bytes = Vec::with_capacity(leaf_cell_size(kind, cell));
            bytes.extend_from_slice(&cell.key);
            bytes.extend_from_slice(&cell.payload.total_len.to_le_bytes());
            match cell.payload.overflow {
                Some(overflow) => {
                    bytes.push(FLAG_OVERFLOW);
                    bytes.extend_from_slice(&cell.payload.local);
                    bytes.extend_from_slice(&overflow.to_le_bytes());
                }
                None => {
                    bytes.push(0);
                    bytes.extend_from_slice(&cell.payload.local);
                }
            }
            bytes
        }
        TreeKind::Index => cell.key.clone(),
    }
}

fn decode_leaf_cell(page_id: PageId, kind: TreeKind, raw: &[u8]) -> Result<LeafCell, DatabaseError> {
    match kind {
        TreeKind::Table => {
            if raw.len() < TABLE_LEAF_PREFIX {
                return Err(DatabaseError::corrupt(page_id, "table leaf cell too short"));
            }
            let key = raw[0..8].to_vec();
            let total_len = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);
            let flags = raw[12];
            let body = &raw[TABLE_LEAF_PREFIX..];
            let payload = if flags & FLAG_OVERFLOW != 0 {
                if body.len() < 8 {
                    return Err(DatabaseError::corrupt(page_id, "overflow pointer missing"));
                }
                let (local, pointer) = body.split_at(body.len() - 8);
                let mut raw_pointer = [0u8; 8];
                raw_pointer.copy_from_slice(pointer);
                Payload {
                    total_len,
                    local: local.to_vec(),
                    overflow: Some(u64::from_le_bytes(raw_pointer)),
                }
            } else {
                if body.len() != total_len as usize {
                    return Err(DatabaseError::corrupt(
                        page_id,
                        format!("payload length {} but cell holds {}", total_len, body.len()),
                    ));
                }
                Payload::inline(body.to_vec())
            };
            Ok(LeafCell { key, payload })
        }
        TreeKind::Index => Ok(LeafCell {
            key: raw.to_vec(),
            payload: Payload::default(),
        }),
    }
}

fn encode_interior_cell(cell: &InteriorCell) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(interior_cell_size(cell));
    bytes.extend_from_slice(&cell.child.to_le_bytes());
    bytes.extend_from_slice(&cell.key);
    bytes
}

fn decode_interior_cell(page_id: PageId, kind: TreeKind, raw: &[u8]) -> Result<InteriorCell, DatabaseError> {
    if raw.len() < 8 || (kind == TreeKind::Table && raw.len() != 16) {
        return Err(DatabaseError::corrupt(
            page_id,
            format!("interior cell of {} bytes", raw.len()),
        ));
    }
    let mut child = [0u8; 8];
    child.copy_from_slice(&raw[0..8]);
    Ok(InteriorCell {
        key: raw[8..].to_vec(),
        child: u64::from_le_bytes(child),
    })
}
