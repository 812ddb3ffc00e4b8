use crate::{
    storage::{
        btree::BTree,
        node::{LeafCell, Node, NodeBody, TreeKind},
        pager::Pager,
    },
    types::{PageId, error::DatabaseError},
};

/// Forward cursor over the leaf level of a b-tree.
///
/// Leaves are loaded one at a time by following the sibling links, so a scan
/// never holds more than one leaf's cells. Overflowing payloads are
/// reassembled as each entry is yielded.
pub struct Cursor<'p> {
    pager: &'p Pager,
    kind: TreeKind,
    page_id: Option<PageId>,
    cells: Vec<LeafCell>,
    next: Option<PageId>,
    position: usize,
}

impl<'p> Cursor<'p> {
    pub(crate) fn new(
        pager: &'p Pager,
        kind: TreeKind,
        page_id: PageId,
        cells: Vec<LeafCell>,
        next: Option<PageId>,
        position: usize,
    ) -> Self {
        Self {
            pager,
            kind,
            page_id: Some(page_id),
            cells,
            next,
            position,
        }
    }

    fn advance_leaf(&mut self) -> Result<bool, DatabaseError> {
        let Some(next_id) = self.next else {
            self.page_id = None;
            self.cells.clear();
            return Ok(false);
        };
        let node = Node::from_page(&self.pager.read(next_id)?, self.kind)?;
        let NodeBody::Leaf { cells, next } = node.body else {
            return Err(DatabaseError::corrupt(next_id, "leaf chain points at an interior page"));
        };
        self.page_id = Some(next_id);
        self.cells = cells;
        self.next = next;
        self.position = 0;
        Ok(true)
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>), DatabaseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.page_id?;
        while self.position >= self.cells.len() {
            match self.advance_leaf() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    self.page_id = None;
                    return Some(Err(e));
                }
            }
        }
        let cell = &self.cells[self.position];
        self.position += 1;
        let value = if cell.payload.overflow.is_none() {
            Ok(cell.payload.local.clone())
        } else {
            BTree::read_payload(self.pager, &cell.payload)
        };
        Some(value.map(|value| (cell.key.clone(), value)))
    }
}
