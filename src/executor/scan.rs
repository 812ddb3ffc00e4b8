use std::cmp::Ordering;

use crate::{
    executor::predicate::{evaluate_constant, is_rowid_name},
    planner::expression::{BinaryOperator, ColumnRef, Expression},
    storage::{
        cursor::Cursor,
        node::{decode_rowid, encode_rowid},
        pager::Pager,
        schema::{IndexSchema, TableSchema},
    },
    types::{
        RowId,
        error::DatabaseError,
        record::{self, decode_values, encode_values},
        row::Row,
        value::Value,
    },
};

pub trait Scanner {
    fn scan(&mut self) -> Result<Option<Row>, DatabaseError>;
    fn scan_batch(&mut self, batch_size: usize) -> Result<Vec<Row>, DatabaseError>;
    fn reset(&mut self) -> Result<(), DatabaseError>;
}

pub struct ScanIterator<S: Scanner> {
    scanner: S,
}

impl<S: Scanner> ScanIterator<S> {
    pub fn new(scanner: S) -> Self {
        Self { scanner }
    }
}

impl<S: Scanner> Iterator for ScanIterator<S> {
    type Item = Result<Row, DatabaseError>;
    fn next(&mut self) -> Option<Self::Item> {
        match self.scanner.scan() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// How a statement reaches the rows its WHERE clause can match.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath {
    FullScan,
    /// Single lookup in the table tree
    RowIdSeek(RowId),
    /// Range of an index whose first column equals `value`
    IndexSeek { index: IndexSchema, value: Value },
}

/// Pick an access path from the top-level `column = constant` conjuncts of
/// a condition. The condition itself is still applied to every row the
/// path produces.
pub fn choose_access_path(
    table: &TableSchema,
    alias: Option<&str>,
    indexes: &[IndexSchema],
    condition: Option<&Expression>,
) -> Result<AccessPath, DatabaseError> {
    let Some(condition) = condition else {
        return Ok(AccessPath::FullScan);
    };
    let mut index_path = None;
    for conjunct in condition.conjuncts() {
        let Some((column, value)) = equality_with_constant(conjunct)? else {
            continue;
        };
        if !qualifier_matches(column, table, alias) || value.is_null() {
            continue;
        }
        let is_rowid = match table.get_column_index(&column.column) {
            Some(position) => table.rowid_alias == Some(position),
            None => is_rowid_name(&column.column),
        };
        if is_rowid {
            if let Value::Integer(row_id) = value {
                return Ok(AccessPath::RowIdSeek(row_id));
            }
            continue;
        }
        if index_path.is_none() {
            index_path = indexes
                .iter()
                .find(|index| {
                    index
                        .columns
                        .first()
                        .is_some_and(|first| first.eq_ignore_ascii_case(&column.column))
                })
                .map(|index| AccessPath::IndexSeek {
                    index: index.clone(),
                    value,
                });
        }
    }
    Ok(index_path.unwrap_or(AccessPath::FullScan))
}

fn equality_with_constant(expression: &Expression) -> Result<Option<(&ColumnRef, Value)>, DatabaseError> {
    let Expression::BinaryOp(op) = expression else {
        return Ok(None);
    };
    if op.operator != BinaryOperator::Equal {
        return Ok(None);
    }
    match (&*op.left, &*op.right) {
        (Expression::Column(column), other) | (other, Expression::Column(column))
            if other.is_constant() =>
        {
            Ok(Some((column, evaluate_constant(other)?)))
        }
        _ => Ok(None),
    }
}

fn qualifier_matches(column: &ColumnRef, table: &TableSchema, alias: Option<&str>) -> bool {
    match (&column.table, alias) {
        (None, _) => true,
        (Some(q), Some(alias)) => q.eq_ignore_ascii_case(alias),
        (Some(q), None) => q.eq_ignore_ascii_case(&table.table_name),
    }
}

fn decode_row(table: &TableSchema, key: &[u8], bytes: &[u8]) -> Result<Row, DatabaseError> {
    let row = record::decode(bytes, table)?;
    Ok(Row::with_row_id(decode_rowid(key)?, row.values))
}

enum ScanState<'p> {
    Pending,
    Table(Cursor<'p>),
    Single(Option<Row>),
    Index { cursor: Cursor<'p>, value: Value },
    Done,
}

/// Rows of one table along an access path.
pub struct TableScanner<'p> {
    pager: &'p Pager,
    table: &'p TableSchema,
    path: AccessPath,
    state: ScanState<'p>,
}

impl<'p> TableScanner<'p> {
    pub fn new(pager: &'p Pager, table: &'p TableSchema, path: AccessPath) -> Self {
        Self {
            pager,
            table,
            path,
            state: ScanState::Pending,
        }
    }

    pub fn full(pager: &'p Pager, table: &'p TableSchema) -> Self {
        Self::new(pager, table, AccessPath::FullScan)
    }

    fn open(&self) -> Result<ScanState<'p>, DatabaseError> {
        let tree = self.table.tree();
        Ok(match &self.path {
            AccessPath::FullScan => ScanState::Table(tree.scan(self.pager)?),
            AccessPath::RowIdSeek(row_id) => {
                let key = encode_rowid(*row_id);
                let row = match tree.get(self.pager, &key)? {
                    Some(bytes) => Some(decode_row(self.table, &key, &bytes)?),
                    None => None,
                };
                ScanState::Single(row)
            }
            AccessPath::IndexSeek { index, value } => {
                let prefix = encode_values(std::slice::from_ref(value));
                ScanState::Index {
                    cursor: index.tree().seek(self.pager, &prefix)?,
                    value: value.clone(),
                }
            }
        })
    }

    fn fetch(&self, index_key: &[u8]) -> Result<Row, DatabaseError> {
        let mut values = decode_values(index_key)?;
        let Some(Value::Integer(row_id)) = values.pop() else {
            return Err(DatabaseError::corrupt(
                self.table.root_page_id,
                "index entry does not end in a rowid",
            ));
        };
        let key = encode_rowid(row_id);
        match self.table.tree().get(self.pager, &key)? {
            Some(bytes) => decode_row(self.table, &key, &bytes),
            None => Err(DatabaseError::corrupt(
                self.table.root_page_id,
                format!("index points at missing rowid {row_id}"),
            )),
        }
    }
}

impl Scanner for TableScanner<'_> {
    fn scan(&mut self) -> Result<Option<Row>, DatabaseError> {
        if matches!(self.state, ScanState::Pending) {
            self.state = self.open()?;
        }
        let table = self.table;
        let index_key = match &mut self.state {
            ScanState::Pending | ScanState::Done => return Ok(None),
            ScanState::Single(row) => return Ok(row.take()),
            ScanState::Table(cursor) => {
                return match cursor.next() {
                    Some(entry) => {
                        let (key, bytes) = entry?;
                        decode_row(table, &key, &bytes).map(Some)
                    }
                    None => {
                        self.state = ScanState::Done;
                        Ok(None)
                    }
                };
            }
            ScanState::Index { cursor, value } => match cursor.next() {
                Some(entry) => {
                    let (key, _) = entry?;
                    let leading = decode_values(&key)?.into_iter().next();
                    match leading {
                        Some(first) if first.compare(value) == Ordering::Equal => Some(key),
                        _ => None,
                    }
                }
                None => None,
            },
        };
        match index_key {
            Some(key) => self.fetch(&key).map(Some),
            None => {
                self.state = ScanState::Done;
                Ok(None)
            }
        }
    }

    fn scan_batch(&mut self, batch_size: usize) -> Result<Vec<Row>, DatabaseError> {
        let mut rows = Vec::with_capacity(batch_size);
        while rows.len() < batch_size {
            match self.scan()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    fn reset(&mut self) -> Result<(), DatabaseError> {
        self.state = ScanState::Pending;
        Ok(())
    }
}

/// Every row of `table` reachable through `path`, collected so the pager
/// can be mutated afterwards.
pub fn collect_rows(pager: &Pager, table: &TableSchema, path: AccessPath) -> Result<Vec<Row>, DatabaseError> {
    ScanIterator::new(TableScanner::new(pager, table, path)).collect()
}
