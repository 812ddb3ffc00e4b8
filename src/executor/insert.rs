use std::cmp::Ordering;

use tracing::trace;

use crate::{
    executor::predicate::{evaluate_constant, is_rowid_name},
    planner::statement::InsertPlan,
    storage::{
        btree::BTree,
        node::{decode_rowid, encode_rowid},
        pager::Pager,
        schema::{Catalog, IndexSchema, TableSchema},
    },
    types::{
        RowId,
        error::DatabaseError,
        record::{compare_value_lists, decode_values, encode_values},
        row::Row,
        value::Value,
    },
};

/// Trait for inserting data into database tables
pub trait Inserter {
    /// Insert a single row, returning the rowid it was stored under
    fn insert(&mut self, row: Row) -> Result<RowId, DatabaseError>;

    /// Insert multiple rows, returning how many were stored
    fn insert_batch(&mut self, rows: Vec<Row>) -> Result<u64, DatabaseError>;
}

/// Writes complete rows into one table and keeps its indexes in step.
///
/// Rows handed to the inserter carry one value per column with defaults
/// already applied. A row without a rowid gets the next one after the
/// largest in the table.
pub struct TableInserter<'a> {
    pager: &'a mut Pager,
    catalog: &'a mut Catalog,
    table_name: String,
}

impl<'a> TableInserter<'a> {
    pub fn new(pager: &'a mut Pager, catalog: &'a mut Catalog, table_name: &str) -> Result<Self, DatabaseError> {
        let table_name = catalog.get_table(table_name)?.table_name.clone();
        Ok(Self {
            pager,
            catalog,
            table_name,
        })
    }
}

impl Inserter for TableInserter<'_> {
    fn insert(&mut self, row: Row) -> Result<RowId, DatabaseError> {
        let table = self.catalog.get_table(&self.table_name)?.clone();
        let mut values = row.values;
        let alias = table.rowid_alias.and_then(|p| values.get(p));
        let row_id = match (alias, row.row_id) {
            (Some(Value::Integer(id)), _) => *id,
            (_, Some(id)) => id,
            _ => next_rowid(self.pager, &table)?,
        };
        // A NULL rowid alias takes the assigned rowid
        if let Some(position) = table.rowid_alias {
            if values.get(position).is_some_and(Value::is_null) {
                values[position] = Value::Integer(row_id);
            }
        }
        let values = table.validate_row(values)?;
        write_row(self.pager, self.catalog, &table, row_id, &values)?;
        Ok(row_id)
    }

    fn insert_batch(&mut self, rows: Vec<Row>) -> Result<u64, DatabaseError> {
        let mut count = 0;
        for row in rows {
            self.insert(row)?;
            count += 1;
        }
        Ok(count)
    }
}

/// One past the largest rowid in use, or 1 for an empty table.
pub fn next_rowid(pager: &Pager, table: &TableSchema) -> Result<RowId, DatabaseError> {
    match table.tree().last_key(pager)? {
        Some(key) => decode_rowid(&key)?
            .checked_add(1)
            .ok_or_else(|| DatabaseError::exec(format!("table '{}' has run out of rowids", table.table_name))),
        None => Ok(1),
    }
}

/// Store a validated row under `row_id` and add its index entries.
pub fn write_row(
    pager: &mut Pager,
    catalog: &mut Catalog,
    table: &TableSchema,
    row_id: RowId,
    values: &[Value],
) -> Result<(), DatabaseError> {
    let mut tree = catalog.get_table(&table.table_name)?.tree();
    tree.insert(pager, &encode_rowid(row_id), &encode_values(values))?;
    catalog.set_table_root(pager, &table.table_name, tree.root())?;

    for index in catalog.indexes_for(&table.table_name) {
        let mut index_tree = index.tree();
        check_unique(pager, &index_tree, &index, values)?;
        index_tree.insert(pager, &index.entry_key(values, row_id), &[])?;
        catalog.set_index_root(pager, &index.index_name, index_tree.root())?;
    }
    trace!(table = %table.table_name, row_id, "wrote row");
    Ok(())
}

/// Fail with `DuplicateKey` if a unique index already holds the row's
/// indexed values. Keys containing NULL never conflict.
pub fn check_unique(pager: &Pager, tree: &BTree, index: &IndexSchema, values: &[Value]) -> Result<(), DatabaseError> {
    if !index.unique {
        return Ok(());
    }
    let key_values = index.key_values(values);
    if key_values.iter().any(Value::is_null) {
        return Ok(());
    }
    if let Some(entry) = tree.seek(pager, &encode_values(&key_values))?.next() {
        let (key, _) = entry?;
        let existing = decode_values(&key)?;
        let prefix = &existing[..key_values.len().min(existing.len())];
        if compare_value_lists(prefix, &key_values) == Ordering::Equal {
            return Err(DatabaseError::DuplicateKey {
                tree: index.index_name.clone(),
                key: key_values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
    }
    Ok(())
}

/// Turn the VALUES tuples of an INSERT into full rows.
pub fn build_rows(table: &TableSchema, plan: &InsertPlan) -> Result<Vec<Row>, DatabaseError> {
    // Target position for each supplied value; `None` marks the rowid
    let targets: Vec<Option<usize>> = match &plan.columns {
        None => (0..table.columns.len()).map(Some).collect(),
        Some(names) => {
            let mut targets = Vec::with_capacity(names.len());
            for name in names {
                let target = match table.get_column_index(name) {
                    Some(position) => Some(position),
                    None if is_rowid_name(name) => None,
                    None => {
                        return Err(DatabaseError::ColumnNotFound {
                            name: name.clone(),
                            table: table.table_name.clone(),
                        });
                    }
                };
                if targets.contains(&target) {
                    return Err(DatabaseError::exec(format!("column '{name}' specified more than once")));
                }
                targets.push(target);
            }
            targets
        }
    };

    plan.values
        .iter()
        .map(|tuple| {
            if tuple.len() != targets.len() {
                return Err(DatabaseError::schema_mismatch(format!(
                    "table '{}' expects {} values, got {}",
                    table.table_name,
                    targets.len(),
                    tuple.len()
                )));
            }
            let mut provided = vec![None; table.columns.len()];
            let mut row_id = None;
            for (target, expression) in targets.iter().zip(tuple) {
                let value = evaluate_constant(expression)?;
                match target {
                    Some(position) => provided[*position] = Some(value),
                    None => {
                        row_id = match value {
                            Value::Null => None,
                            Value::Integer(id) => Some(id),
                            other => {
                                return Err(DatabaseError::schema_mismatch(format!(
                                    "rowid must be an integer, got {}",
                                    other.type_name()
                                )));
                            }
                        }
                    }
                }
            }
            let values = table.apply_defaults(provided);
            Ok(Row {
                row_id,
                values,
            })
        })
        .collect()
}

pub fn execute_insert(pager: &mut Pager, catalog: &mut Catalog, plan: &InsertPlan) -> Result<u64, DatabaseError> {
    let rows = build_rows(catalog.get_table(&plan.table_name)?, plan)?;
    TableInserter::new(pager, catalog, &plan.table_name)?.insert_batch(rows)
}
