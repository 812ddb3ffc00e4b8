use std::cmp::Ordering;

use tracing::{debug, trace};

use crate::{
    storage::{
        cursor::Cursor,
        node::{
            InteriorCell, LeafCell, Node, NodeBody, Payload, TreeKind, capacity, decode_rowid,
            interior_cell_size, leaf_cell_size, max_index_key, max_inline_payload,
            spilled_local_len,
        },
        pager::Pager,
    },
    types::{
        PAGE_HEADER_SIZE, PageId, SLOT_DIRECTORY_ENTRY_SIZE,
        error::DatabaseError,
        page::{Page, PageType},
        record::decode_values,
    },
};

/// What a recursive step tells its parent about the child it touched.
#[derive(Debug)]
enum Change {
    None,
    /// Child split; `separator` is the first key of the new right sibling.
    Split {
        separator: Vec<u8>,
        right_page_id: PageId,
    },
    /// Child fell below half capacity and should be merged or refilled.
    Underflow,
}

/// Counts gathered by `BTree::check`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub depth: usize,
    pub entries: u64,
    pub leaf_pages: u64,
    pub interior_pages: u64,
    pub overflow_pages: u64,
}

/// Handle on one b+tree stored in the pager.
///
/// The handle only remembers the root page; every operation goes through the
/// pager, so several handles over the same tree see each other's writes. The
/// root moves when it splits or collapses, and callers that persist the root
/// (the catalog) must read `root()` back after a mutation.
#[derive(Debug, Clone)]
pub struct BTree {
    name: String,
    kind: TreeKind,
    root: PageId,
}

impl BTree {
    pub fn open(name: impl Into<String>, kind: TreeKind, root: PageId) -> Self {
        Self {
            name: name.into(),
            kind,
            root,
        }
    }

    /// Allocate an empty leaf root for a new tree.
    pub fn create(pager: &mut Pager, name: impl Into<String>, kind: TreeKind) -> Result<Self, DatabaseError> {
        let root = pager.allocate(kind.leaf_type())?;
        pager.write(Node::empty_leaf(root, kind).to_page(pager.page_size())?)?;
        let tree = Self::open(name, kind, root);
        debug!(tree = %tree.name, root, ?kind, "created b-tree");
        Ok(tree)
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, pager: &Pager, page_id: PageId) -> Result<Node, DatabaseError> {
        Node::from_page(&pager.read(page_id)?, self.kind)
    }

    fn describe_key(&self, key: &[u8]) -> String {
        match self.kind {
            TreeKind::Table => decode_rowid(key)
                .map(|id| id.to_string())
                .unwrap_or_else(|_| format!("{key:02x?}")),
            TreeKind::Index => decode_values(key)
                .map(|values| {
                    values
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_else(|_| format!("{key:02x?}")),
        }
    }

    /// Insert a new entry. Fails with `DuplicateKey` if the key is present.
    pub fn insert(&mut self, pager: &mut Pager, key: &[u8], value: &[u8]) -> Result<(), DatabaseError> {
        let page_size = pager.page_size();
        match self.kind {
            TreeKind::Table if key.len() != 8 => {
                return Err(DatabaseError::exec(format!(
                    "table key must be 8 bytes, got {}",
                    key.len()
                )));
            }
            TreeKind::Index if key.len() > max_index_key(page_size) => {
                return Err(DatabaseError::exec(format!(
                    "index key of {} bytes exceeds the {} byte limit",
                    key.len(),
                    max_index_key(page_size)
                )));
            }
            TreeKind::Index if !value.is_empty() => {
                return Err(DatabaseError::exec("index entries carry no value"));
            }
            _ => {}
        }

        let payload = match self.kind {
            TreeKind::Table => self.build_payload(pager, value)?,
            TreeKind::Index => Payload::default(),
        };
        let cell = LeafCell {
            key: key.to_vec(),
            payload,
        };
        if let Change::Split {
            separator,
            right_page_id,
        } = self.insert_recursive(pager, self.root, cell, true)?
        {
            self.grow_root(pager, separator, right_page_id)?;
        }
        trace!(tree = %self.name, "inserted entry");
        Ok(())
    }

    fn insert_recursive(
        &self,
        pager: &mut Pager,
        page_id: PageId,
        cell: LeafCell,
        is_root: bool,
    ) -> Result<Change, DatabaseError> {
        let mut node = self.load(pager, page_id)?;
        match &mut node.body {
            NodeBody::Leaf { cells, .. } => match self.search(cells, |c| c.key.as_slice(), &cell.key)? {
                Ok(_) => {
                    self.free_overflow_chain(pager, cell.payload.overflow)?;
                    return Err(DatabaseError::DuplicateKey {
                        tree: self.name.clone(),
                        key: self.describe_key(&cell.key),
                    });
                }
                Err(position) => cells.insert(position, cell),
            },
            NodeBody::Interior { cells, right_child } => {
                let index = self.find_child_page(cells, &cell.key)?;
                let child = child_at(cells, *right_child, index);
                match self.insert_recursive(pager, child, cell, false)? {
                    Change::Split {
                        separator,
                        right_page_id,
                    } => insert_separator(cells, right_child, index, separator, right_page_id),
                    _ => return Ok(Change::None),
                }
            }
        }
        self.store_node(pager, node, is_root)
    }

    /// Write a node back, splitting it if it no longer fits its page.
    fn store_node(&self, pager: &mut Pager, node: Node, is_root: bool) -> Result<Change, DatabaseError> {
        let page_size = pager.page_size();
        if node.fits(page_size) {
            let underfull = !is_root && node.is_underfull(page_size);
            pager.write(node.to_page(page_size)?)?;
            return Ok(if underfull { Change::Underflow } else { Change::None });
        }
        let (separator, right_page_id) = if node.is_leaf() {
            self.split_leaf_page(pager, node)?
        } else {
            self.split_interior_page(pager, node)?
        };
        Ok(Change::Split {
            separator,
            right_page_id,
        })
    }

    fn split_leaf_page(&self, pager: &mut Pager, node: Node) -> Result<(Vec<u8>, PageId), DatabaseError> {
        let page_size = pager.page_size();
        let NodeBody::Leaf { mut cells, next } = node.body else {
            return Err(DatabaseError::corrupt(node.page_id, "leaf split on interior node"));
        };
        let sizes: Vec<usize> = cells.iter().map(|c| leaf_cell_size(self.kind, c)).collect();
        let at = split_point(&sizes, 1, cells.len().saturating_sub(1));
        let right_cells = cells.split_off(at);
        let separator = right_cells
            .first()
            .map(|c| c.key.clone())
            .ok_or_else(|| DatabaseError::corrupt(node.page_id, "split produced an empty leaf"))?;

        let right_page_id = pager.allocate(self.kind.leaf_type())?;
        let left = Node {
            page_id: node.page_id,
            kind: self.kind,
            body: NodeBody::Leaf {
                cells,
                next: Some(right_page_id),
            },
        };
        let right = Node {
            page_id: right_page_id,
            kind: self.kind,
            body: NodeBody::Leaf {
                cells: right_cells,
                next,
            },
        };
        pager.write(left.to_page(page_size)?)?;
        pager.write(right.to_page(page_size)?)?;
        debug!(tree = %self.name, left = node.page_id, right = right_page_id, "split leaf");
        Ok((separator, right_page_id))
    }

    fn split_interior_page(&self, pager: &mut Pager, node: Node) -> Result<(Vec<u8>, PageId), DatabaseError> {
        let page_size = pager.page_size();
        let NodeBody::Interior {
            mut cells,
            right_child,
        } = node.body
        else {
            return Err(DatabaseError::corrupt(node.page_id, "interior split on leaf node"));
        };
        if cells.len() < 3 {
            return Err(DatabaseError::corrupt(node.page_id, "interior node too small to split"));
        }
        let sizes: Vec<usize> = cells.iter().map(interior_cell_size).collect();
        let at = split_point(&sizes, 1, cells.len() - 2);
        let mut right_cells = cells.split_off(at);
        let middle = right_cells.remove(0);

        let right_page_id = pager.allocate(self.kind.interior_type())?;
        let left = Node {
            page_id: node.page_id,
            kind: self.kind,
            body: NodeBody::Interior {
                cells,
                right_child: middle.child,
            },
        };
        let right = Node {
            page_id: right_page_id,
            kind: self.kind,
            body: NodeBody::Interior {
                cells: right_cells,
                right_child,
            },
        };
        pager.write(left.to_page(page_size)?)?;
        pager.write(right.to_page(page_size)?)?;
        debug!(tree = %self.name, left = node.page_id, right = right_page_id, "split interior node");
        Ok((middle.key, right_page_id))
    }

    fn grow_root(&mut self, pager: &mut Pager, separator: Vec<u8>, right_page_id: PageId) -> Result<(), DatabaseError> {
        let new_root_id = pager.allocate(self.kind.interior_type())?;
        let new_root = Node {
            page_id: new_root_id,
            kind: self.kind,
            body: NodeBody::Interior {
                cells: vec![InteriorCell {
                    key: separator,
                    child: self.root,
                }],
                right_child: right_page_id,
            },
        };
        pager.write(new_root.to_page(pager.page_size())?)?;
        debug!(tree = %self.name, old_root = self.root, new_root = new_root_id, "root split");
        self.root = new_root_id;
        Ok(())
    }

    /// Binary search over sorted cells. `Ok(i)` on an exact hit, otherwise
    /// `Err(i)` with the insertion point.
    fn search<T>(
        &self,
        cells: &[T],
        key_of: impl Fn(&T) -> &[u8],
        key: &[u8],
    ) -> Result<Result<usize, usize>, DatabaseError> {
        let (mut low, mut high) = (0, cells.len());
        while low < high {
            let mid = (low + high) / 2;
            match self.kind.compare(key_of(&cells[mid]), key)? {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
                Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(low))
    }

    /// Index of the child whose subtree covers `key`; `cells.len()` means
    /// the right child.
    fn find_child_page(&self, cells: &[InteriorCell], key: &[u8]) -> Result<usize, DatabaseError> {
        Ok(match self.search(cells, |c| c.key.as_slice(), key)? {
            Ok(i) => i + 1,
            Err(i) => i,
        })
    }

    fn build_payload(&self, pager: &mut Pager, value: &[u8]) -> Result<Payload, DatabaseError> {
        let page_size = pager.page_size();
        if value.len() <= max_inline_payload(page_size) {
            return Ok(Payload::inline(value.to_vec()));
        }
        let local_len = spilled_local_len(page_size);
        let overflow = self.allocate_overflow_page(pager, &value[local_len..])?;
        Ok(Payload {
            total_len: value.len() as u32,
            local: value[..local_len].to_vec(),
            overflow: Some(overflow),
        })
    }

    /// Write `data` into a chain of overflow pages and return its head.
    fn allocate_overflow_page(&self, pager: &mut Pager, data: &[u8]) -> Result<PageId, DatabaseError> {
        let page_size = pager.page_size();
        let chunk_size = page_size - PAGE_HEADER_SIZE - SLOT_DIRECTORY_ENTRY_SIZE;
        let chunks: Vec<&[u8]> = data.chunks(chunk_size).collect();
        let mut next = None;
        // Back to front so every page knows its successor when written
        for chunk in chunks.iter().rev() {
            let page_id = pager.allocate(PageType::Overflow)?;
            let mut page = Page::new(page_id, PageType::Overflow, page_size);
            page.link = next;
            page.insert_cell(chunk)?;
            pager.write(page)?;
            next = Some(page_id);
        }
        next.ok_or_else(|| DatabaseError::exec("overflow chain for an empty payload"))
    }

    pub(crate) fn read_payload(pager: &Pager, payload: &Payload) -> Result<Vec<u8>, DatabaseError> {
        let total = payload.total_len as usize;
        let mut bytes = Vec::with_capacity(total);
        bytes.extend_from_slice(&payload.local);
        let mut next = payload.overflow;
        while let Some(page_id) = next {
            let page = pager.read(page_id)?;
            if page.page_type != PageType::Overflow {
                return Err(DatabaseError::corrupt(
                    page_id,
                    format!("expected overflow page, found {:?}", page.page_type),
                ));
            }
            let chunk = page
                .get_cell(0)
                .ok_or_else(|| DatabaseError::corrupt(page_id, "empty overflow page"))?;
            bytes.extend_from_slice(chunk);
            if bytes.len() > total {
                return Err(DatabaseError::corrupt(page_id, "overflow chain longer than payload"));
            }
            next = page.link;
        }
        if bytes.len() != total {
            return Err(DatabaseError::SerializationError {
                details: format!("payload declares {} bytes, chain holds {}", total, bytes.len()),
            });
        }
        Ok(bytes)
    }

    fn free_overflow_chain(&self, pager: &mut Pager, head: Option<PageId>) -> Result<(), DatabaseError> {
        let mut next = head;
        while let Some(page_id) = next {
            next = pager.read(page_id)?.link;
            pager.free(page_id)?;
        }
        Ok(())
    }

    /// Value stored under `key`, if any.
    pub fn get(&self, pager: &Pager, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError> {
        let mut node = self.load(pager, self.root)?;
        loop {
            match node.body {
                NodeBody::Interior { cells, right_child } => {
                    let index = self.find_child_page(&cells, key)?;
                    node = self.load(pager, child_at(&cells, right_child, index))?;
                }
                NodeBody::Leaf { cells, .. } => {
                    return match self.search(&cells, |c| c.key.as_slice(), key)? {
                        Ok(i) => Ok(Some(Self::read_payload(pager, &cells[i].payload)?)),
                        Err(_) => Ok(None),
                    };
                }
            }
        }
    }

    pub fn contains(&self, pager: &Pager, key: &[u8]) -> Result<bool, DatabaseError> {
        Ok(self.get(pager, key)?.is_some())
    }

    /// Cursor over every entry in key order.
    pub fn scan<'p>(&self, pager: &'p Pager) -> Result<Cursor<'p>, DatabaseError> {
        let mut page_id = self.root;
        loop {
            let node = self.load(pager, page_id)?;
            match node.body {
                NodeBody::Interior { cells, right_child } => {
                    page_id = cells.first().map(|c| c.child).unwrap_or(right_child);
                }
                NodeBody::Leaf { cells, next } => {
                    return Ok(Cursor::new(pager, self.kind, page_id, cells, next, 0));
                }
            }
        }
    }

    /// Cursor positioned at the first entry whose key is `>= key`.
    pub fn seek<'p>(&self, pager: &'p Pager, key: &[u8]) -> Result<Cursor<'p>, DatabaseError> {
        let mut page_id = self.root;
        loop {
            let node = self.load(pager, page_id)?;
            match node.body {
                NodeBody::Interior { cells, right_child } => {
                    let index = self.find_child_page(&cells, key)?;
                    page_id = child_at(&cells, right_child, index);
                }
                NodeBody::Leaf { cells, next } => {
                    let position = match self.search(&cells, |c| c.key.as_slice(), key)? {
                        Ok(i) | Err(i) => i,
                    };
                    return Ok(Cursor::new(pager, self.kind, page_id, cells, next, position));
                }
            }
        }
    }

    /// Largest key in the tree.
    pub fn last_key(&self, pager: &Pager) -> Result<Option<Vec<u8>>, DatabaseError> {
        let mut page_id = self.root;
        loop {
            let node = self.load(pager, page_id)?;
            match node.body {
                NodeBody::Interior { right_child, .. } => page_id = right_child,
                NodeBody::Leaf { cells, .. } => return Ok(cells.last().map(|c| c.key.clone())),
            }
        }
    }

    /// Remove `key`. Returns `false` when it was not present.
    pub fn delete(&mut self, pager: &mut Pager, key: &[u8]) -> Result<bool, DatabaseError> {
        let Some(change) = self.delete_recursive(pager, self.root, key, true)? else {
            return Ok(false);
        };
        if let Change::Split {
            separator,
            right_page_id,
        } = change
        {
            self.grow_root(pager, separator, right_page_id)?;
        }
        self.collapse_root(pager)?;
        trace!(tree = %self.name, "deleted entry");
        Ok(true)
    }

    fn delete_recursive(
        &self,
        pager: &mut Pager,
        page_id: PageId,
        key: &[u8],
        is_root: bool,
    ) -> Result<Option<Change>, DatabaseError> {
        let mut node = self.load(pager, page_id)?;
        match &mut node.body {
            NodeBody::Leaf { cells, .. } => match self.search(cells, |c| c.key.as_slice(), key)? {
                Ok(i) => {
                    let removed = cells.remove(i);
                    self.free_overflow_chain(pager, removed.payload.overflow)?;
                }
                Err(_) => return Ok(None),
            },
            NodeBody::Interior { cells, right_child } => {
                let index = self.find_child_page(cells, key)?;
                let child = child_at(cells, *right_child, index);
                match self.delete_recursive(pager, child, key, false)? {
                    None => return Ok(None),
                    Some(Change::None) => return Ok(Some(Change::None)),
                    Some(Change::Split {
                        separator,
                        right_page_id,
                    }) => insert_separator(cells, right_child, index, separator, right_page_id),
                    Some(Change::Underflow) => self.rebalance(pager, cells, right_child, index)?,
                }
            }
        }
        self.store_node(pager, node, is_root).map(Some)
    }

    /// Merge the underfull child at `index` with a sibling, or move entries
    /// over from the sibling when both do not fit one page.
    fn rebalance(
        &self,
        pager: &mut Pager,
        cells: &mut Vec<InteriorCell>,
        right_child: &mut PageId,
        index: usize,
    ) -> Result<(), DatabaseError> {
        if cells.is_empty() {
            // Only child of the root; collapse_root takes care of it
            return Ok(());
        }
        let page_size = pager.page_size();
        let left_index = if index > 0 { index - 1 } else { 0 };
        let right_index = left_index + 1;
        let left_id = child_at(cells, *right_child, left_index);
        let right_id = child_at(cells, *right_child, right_index);
        let left = self.load(pager, left_id)?;
        let right = self.load(pager, right_id)?;
        let separator = cells[left_index].key.clone();

        let capacity = capacity(page_size);
        match (left.body, right.body) {
            (
                NodeBody::Leaf {
                    cells: mut pooled,
                    ..
                },
                NodeBody::Leaf {
                    cells: right_cells,
                    next: right_next,
                },
            ) => {
                pooled.extend(right_cells);
                let sizes: Vec<usize> = pooled.iter().map(|c| leaf_cell_size(self.kind, c)).collect();
                if used_bytes(&sizes) <= capacity {
                    let merged = Node {
                        page_id: left_id,
                        kind: self.kind,
                        body: NodeBody::Leaf {
                            cells: pooled,
                            next: right_next,
                        },
                    };
                    pager.write(merged.to_page(page_size)?)?;
                    pager.free(right_id)?;
                    set_child_at(cells, right_child, right_index, left_id);
                    cells.remove(left_index);
                    debug!(tree = %self.name, left = left_id, right = right_id, "merged leaves");
                    return Ok(());
                }
                let at = split_point(&sizes, 1, pooled.len() - 1);
                let moved = pooled.split_off(at);
                cells[left_index].key = moved[0].key.clone();
                let new_left = Node {
                    page_id: left_id,
                    kind: self.kind,
                    body: NodeBody::Leaf {
                        cells: pooled,
                        next: Some(right_id),
                    },
                };
                let new_right = Node {
                    page_id: right_id,
                    kind: self.kind,
                    body: NodeBody::Leaf {
                        cells: moved,
                        next: right_next,
                    },
                };
                pager.write(new_left.to_page(page_size)?)?;
                pager.write(new_right.to_page(page_size)?)?;
                trace!(tree = %self.name, left = left_id, right = right_id, "redistributed leaves");
            }
            (
                NodeBody::Interior {
                    cells: mut pooled,
                    right_child: left_right,
                },
                NodeBody::Interior {
                    cells: right_cells,
                    right_child: right_right,
                },
            ) => {
                // The parent separator comes down between the two halves
                pooled.push(InteriorCell {
                    key: separator,
                    child: left_right,
                });
                pooled.extend(right_cells);
                let sizes: Vec<usize> = pooled.iter().map(interior_cell_size).collect();
                if used_bytes(&sizes) <= capacity {
                    let merged = Node {
                        page_id: left_id,
                        kind: self.kind,
                        body: NodeBody::Interior {
                            cells: pooled,
                            right_child: right_right,
                        },
                    };
                    pager.write(merged.to_page(page_size)?)?;
                    pager.free(right_id)?;
                    set_child_at(cells, right_child, right_index, left_id);
                    cells.remove(left_index);
                    debug!(tree = %self.name, left = left_id, right = right_id, "merged interior nodes");
                    return Ok(());
                }
                let at = split_point(&sizes, 1, pooled.len() - 2);
                let mut moved = pooled.split_off(at);
                let middle = moved.remove(0);
                cells[left_index].key = middle.key;
                let new_left = Node {
                    page_id: left_id,
                    kind: self.kind,
                    body: NodeBody::Interior {
                        cells: pooled,
                        right_child: middle.child,
                    },
                };
                let new_right = Node {
                    page_id: right_id,
                    kind: self.kind,
                    body: NodeBody::Interior {
                        cells: moved,
                        right_child: right_right,
                    },
                };
                pager.write(new_left.to_page(page_size)?)?;
                pager.write(new_right.to_page(page_size)?)?;
                trace!(tree = %self.name, left = left_id, right = right_id, "redistributed interior nodes");
            }
            _ => {
                return Err(DatabaseError::corrupt(
                    left_id,
                    format!("siblings {left_id} and {right_id} are at different levels"),
                ));
            }
        }
        Ok(())
    }

    /// Replace an interior root left with a single child by that child.
    fn collapse_root(&mut self, pager: &mut Pager) -> Result<(), DatabaseError> {
        loop {
            let node = self.load(pager, self.root)?;
            match node.body {
                NodeBody::Interior { cells, right_child } if cells.is_empty() => {
                    pager.free(self.root)?;
                    debug!(tree = %self.name, old_root = self.root, new_root = right_child, "root collapsed");
                    self.root = right_child;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Free every page of the tree, overflow chains included.
    pub fn drop_tree(self, pager: &mut Pager) -> Result<(), DatabaseError> {
        let mut pending = vec![self.root];
        let mut freed = 0u64;
        while let Some(page_id) = pending.pop() {
            let node = self.load(pager, page_id)?;
            match node.body {
                NodeBody::Interior { cells, right_child } => {
                    pending.extend(cells.iter().map(|c| c.child));
                    pending.push(right_child);
                }
                NodeBody::Leaf { cells, .. } => {
                    for cell in cells {
                        self.free_overflow_chain(pager, cell.payload.overflow)?;
                    }
                }
            }
            pager.free(page_id)?;
            freed += 1;
        }
        debug!(tree = %self.name, pages = freed, "dropped b-tree");
        Ok(())
    }

    /// Walk the whole tree verifying key order, key bounds, uniform leaf
    /// depth and the leaf chain.
    pub fn check(&self, pager: &Pager) -> Result<TreeStats, DatabaseError> {
        let mut stats = TreeStats::default();
        let mut leaves = Vec::new();
        let depth = self.check_node(pager, self.root, None, None, &mut stats, &mut leaves)?;
        stats.depth = depth;
        for pair in leaves.windows(2) {
            let (left_id, left_next) = pair[0];
            let (right_id, _) = pair[1];
            if left_next != Some(right_id) {
                return Err(DatabaseError::corrupt(
                    left_id,
                    format!("leaf links to {left_next:?}, expected {right_id}"),
                ));
            }
        }
        if let Some(&(last_id, Some(next))) = leaves.last() {
            return Err(DatabaseError::corrupt(
                last_id,
                format!("last leaf links to {next}"),
            ));
        }
        Ok(stats)
    }

    fn check_node(
        &self,
        pager: &Pager,
        page_id: PageId,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        stats: &mut TreeStats,
        leaves: &mut Vec<(PageId, Option<PageId>)>,
    ) -> Result<usize, DatabaseError> {
        let node = self.load(pager, page_id)?;
        let in_bounds = |key: &[u8]| -> Result<bool, DatabaseError> {
            let above = match lower {
                Some(low) => self.kind.compare(key, low)? != Ordering::Less,
                None => true,
            };
            let below = match upper {
                Some(high) => self.kind.compare(key, high)? == Ordering::Less,
                None => true,
            };
            Ok(above && below)
        };
        match &node.body {
            NodeBody::Leaf { cells, next } => {
                for (i, cell) in cells.iter().enumerate() {
                    if !in_bounds(&cell.key)? {
                        return Err(DatabaseError::corrupt(page_id, "leaf key outside parent bounds"));
                    }
                    if i > 0 && self.kind.compare(&cells[i - 1].key, &cell.key)? != Ordering::Less {
                        return Err(DatabaseError::corrupt(page_id, "leaf keys out of order"));
                    }
                    let mut overflow = cell.payload.overflow;
                    while let Some(overflow_id) = overflow {
                        stats.overflow_pages += 1;
                        overflow = pager.read(overflow_id)?.link;
                    }
                }
                stats.entries += cells.len() as u64;
                stats.leaf_pages += 1;
                leaves.push((page_id, *next));
                Ok(1)
            }
            NodeBody::Interior { cells, right_child } => {
                stats.interior_pages += 1;
                let mut depth = None;
                for i in 0..=cells.len() {
                    let low = if i == 0 { lower } else { Some(cells[i - 1].key.as_slice()) };
                    let high = if i == cells.len() { upper } else { Some(cells[i].key.as_slice()) };
                    if let Some(key) = high.filter(|_| i < cells.len()) {
                        if !in_bounds(key)? {
                            return Err(DatabaseError::corrupt(page_id, "separator outside parent bounds"));
                        }
                    }
                    let child = child_at(cells, *right_child, i);
                    let child_depth = self.check_node(pager, child, low, high, stats, leaves)?;
                    match depth {
                        None => depth = Some(child_depth),
                        Some(d) if d != child_depth => {
                            return Err(DatabaseError::corrupt(page_id, "leaves at different depths"));
                        }
                        _ => {}
                    }
                }
                Ok(depth.unwrap_or(0) + 1)
            }
        }
    }
}

fn child_at(cells: &[InteriorCell], right_child: PageId, index: usize) -> PageId {
    cells.get(index).map(|c| c.child).unwrap_or(right_child)
}

fn set_child_at(cells: &mut [InteriorCell], right_child: &mut PageId, index: usize, page_id: PageId) {
    match cells.get_mut(index) {
        Some(cell) => cell.child = page_id,
        None => *right_child = page_id,
    }
}

/// Child at `index` split in two: it keeps the keys below `separator` and
/// `right_page_id` takes the rest.
fn insert_separator(
    cells: &mut Vec<InteriorCell>,
    right_child: &mut PageId,
    index: usize,
    separator: Vec<u8>,
    right_page_id: PageId,
) {
    let left_page_id = child_at(cells, *right_child, index);
    set_child_at(cells, right_child, index, right_page_id);
    cells.insert(
        index,
        InteriorCell {
            key: separator,
            child: left_page_id,
        },
    );
}

fn used_bytes(sizes: &[usize]) -> usize {
    sizes.iter().map(|s| s + SLOT_DIRECTORY_ENTRY_SIZE).sum()
}

/// First index at which the running byte total reaches half, clamped to
/// `[min, max]`.
fn split_point(sizes: &[usize], min: usize, max: usize) -> usize {
    let total = used_bytes(sizes);
    let mut running = 0;
    let mut at = sizes.len();
    for (i, size) in sizes.iter().enumerate() {
        running += size + SLOT_DIRECTORY_ENTRY_SIZE;
        if running * 2 >= total {
            at = i + 1;
            break;
        }
    }
    at.clamp(min, max.max(min))
}
