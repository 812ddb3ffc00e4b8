use tracing::debug;

use crate::{
    executor::{
        insert::write_row,
        predicate::{RowScope, evaluate, is_true},
        scan::{choose_access_path, collect_rows},
    },
    planner::{
        expression::Expression,
        statement::{DeletePlan, UpdatePlan},
    },
    storage::{
        node::encode_rowid,
        pager::Pager,
        schema::{Catalog, TableSchema},
    },
    types::{RowId, error::DatabaseError, row::Row, value::Value},
};

/// Remove a stored row and its index entries.
pub fn remove_row(
    pager: &mut Pager,
    catalog: &mut Catalog,
    table: &TableSchema,
    row_id: RowId,
    values: &[Value],
) -> Result<(), DatabaseError> {
    for index in catalog.indexes_for(&table.table_name) {
        let mut tree = index.tree();
        if !tree.delete(pager, &index.entry_key(values, row_id))? {
            return Err(DatabaseError::corrupt(
                index.root_page_id,
                format!("index '{}' is missing the entry for rowid {row_id}", index.index_name),
            ));
        }
        catalog.set_index_root(pager, &index.index_name, tree.root())?;
    }
    let mut tree = catalog.get_table(&table.table_name)?.tree();
    tree.delete(pager, &encode_rowid(row_id))?;
    catalog.set_table_root(pager, &table.table_name, tree.root())?;
    Ok(())
}

/// Rows of `table` matching an optional condition, read before any change
/// is made.
fn matching_rows(
    pager: &Pager,
    catalog: &Catalog,
    table: &TableSchema,
    condition: Option<&Expression>,
) -> Result<Vec<Row>, DatabaseError> {
    let indexes = catalog.indexes_for(&table.table_name);
    let path = choose_access_path(table, None, &indexes, condition)?;
    let mut rows = Vec::new();
    for row in collect_rows(pager, table, path)? {
        let keep = match condition {
            Some(condition) => {
                let row_id = row.row_id.unwrap_or_default();
                is_true(condition, &RowScope::new(table, None, row_id, &row.values))?
            }
            None => true,
        };
        if keep {
            rows.push(row);
        }
    }
    Ok(rows)
}

pub fn execute_delete(pager: &mut Pager, catalog: &mut Catalog, plan: &DeletePlan) -> Result<u64, DatabaseError> {
    let table = catalog.get_table(&plan.table_name)?.clone();
    let rows = matching_rows(pager, catalog, &table, plan.condition.as_ref())?;
    for row in &rows {
        let row_id = row.row_id.unwrap_or_default();
        remove_row(pager, catalog, &table, row_id, &row.values)?;
    }
    debug!(table = %table.table_name, rows = rows.len(), "deleted rows");
    Ok(rows.len() as u64)
}

/// Every new row is computed before anything is written. Old rows are then
/// all removed before the new ones go in, so rows may swap unique values or
/// rowids within one statement.
pub fn execute_update(pager: &mut Pager, catalog: &mut Catalog, plan: &UpdatePlan) -> Result<u64, DatabaseError> {
    let table = catalog.get_table(&plan.table_name)?.clone();
    let mut targets = Vec::with_capacity(plan.assignments.len());
    for assignment in &plan.assignments {
        let position = table.column_index_or_err(&assignment.column)?;
        if targets.iter().any(|(p, _)| *p == position) {
            return Err(DatabaseError::exec(format!(
                "column '{}' assigned more than once",
                assignment.column
            )));
        }
        targets.push((position, &assignment.value));
    }

    let rows = matching_rows(pager, catalog, &table, plan.condition.as_ref())?;
    let mut updated = Vec::with_capacity(rows.len());
    for row in &rows {
        let old_id = row.row_id.unwrap_or_default();
        let scope = RowScope::new(&table, None, old_id, &row.values);
        let mut values = row.values.clone();
        for (position, expression) in &targets {
            values[*position] = evaluate(expression, &scope)?;
        }
        let row_id = match table.rowid_alias.map(|p| &values[p]) {
            Some(Value::Integer(id)) => *id,
            _ => old_id,
        };
        if let Some(position) = table.rowid_alias {
            if values[position].is_null() {
                values[position] = Value::Integer(row_id);
            }
        }
        updated.push((row_id, table.validate_row(values)?));
    }

    for row in &rows {
        remove_row(pager, catalog, &table, row.row_id.unwrap_or_default(), &row.values)?;
    }
    for (row_id, values) in &updated {
        write_row(pager, catalog, &table, *row_id, values)?;
    }
    debug!(table = %table.table_name, rows = updated.len(), "updated rows");
    Ok(updated.len() as u64)
}
