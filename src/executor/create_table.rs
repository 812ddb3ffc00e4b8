use tracing::{debug, info};

use crate::{
    executor::{
        insert::check_unique,
        scan::{ScanIterator, TableScanner},
    },
    planner::statement::{CreateIndexPlan, CreateTablePlan, DropIndexPlan, DropTablePlan},
    storage::{
        btree::BTree,
        node::TreeKind,
        pager::Pager,
        schema::{Catalog, IndexSchema, TableSchema},
    },
    types::error::DatabaseError,
};

fn name_in_use(catalog: &Catalog, name: &str) -> bool {
    catalog.table_exists(name) || catalog.index_exists(name)
}

/// Create a table and the automatic unique indexes its constraints need.
/// Returns `false` when IF NOT EXISTS skipped an existing table.
pub fn create_table(pager: &mut Pager, catalog: &mut Catalog, plan: &CreateTablePlan) -> Result<bool, DatabaseError> {
    if name_in_use(catalog, &plan.table_name) {
        if plan.if_not_exists && catalog.table_exists(&plan.table_name) {
            return Ok(false);
        }
        return Err(DatabaseError::exec(format!(
            "table '{}' already exists",
            plan.table_name
        )));
    }
    let tree = BTree::create(pager, plan.table_name.clone(), TreeKind::Table)?;
    let schema = TableSchema::from_plan(plan, tree.root())?;
    let unique_columns: Vec<String> = schema
        .unique_columns()
        .into_iter()
        .map(|column| column.name.clone())
        .collect();
    catalog.add_table(pager, schema)?;

    for (n, column) in unique_columns.into_iter().enumerate() {
        let index_plan = CreateIndexPlan {
            index_name: IndexSchema::auto_name(&plan.table_name, n + 1),
            table_name: plan.table_name.clone(),
            columns: vec![column],
            unique: true,
            if_not_exists: false,
        };
        create_index(pager, catalog, &index_plan)?;
    }
    info!(table = %plan.table_name, "created table");
    Ok(true)
}

/// Create an index and fill it from the rows already in its table.
pub fn create_index(pager: &mut Pager, catalog: &mut Catalog, plan: &CreateIndexPlan) -> Result<bool, DatabaseError> {
    if name_in_use(catalog, &plan.index_name) {
        if plan.if_not_exists && catalog.index_exists(&plan.index_name) {
            return Ok(false);
        }
        return Err(DatabaseError::exec(format!(
            "index '{}' already exists",
            plan.index_name
        )));
    }
    let table = catalog.get_table(&plan.table_name)?.clone();
    let mut tree = BTree::create(pager, plan.index_name.clone(), TreeKind::Index)?;
    let mut index = IndexSchema::from_plan(plan, &table, tree.root())?;

    let rows: Vec<_> = ScanIterator::new(TableScanner::full(pager, &table)).collect::<Result<_, _>>()?;
    for row in &rows {
        check_unique(pager, &tree, &index, &row.values)?;
        tree.insert(pager, &index.entry_key(&row.values, row.row_id.unwrap_or_default()), &[])?;
    }
    index.root_page_id = tree.root();
    catalog.add_index(pager, index)?;
    debug!(index = %plan.index_name, rows = rows.len(), "built index");
    Ok(true)
}

pub fn drop_table(pager: &mut Pager, catalog: &mut Catalog, plan: &DropTablePlan) -> Result<bool, DatabaseError> {
    if plan.if_exists && !catalog.table_exists(&plan.table_name) {
        return Ok(false);
    }
    let table_name = catalog.get_table(&plan.table_name)?.table_name.clone();
    for index in catalog.indexes_for(&table_name) {
        catalog.remove_index(pager, &index.index_name)?;
        index.tree().drop_tree(pager)?;
    }
    let table = catalog.remove_table(pager, &table_name)?;
    table.tree().drop_tree(pager)?;
    info!(table = %table_name, "dropped table");
    Ok(true)
}

pub fn drop_index(pager: &mut Pager, catalog: &mut Catalog, plan: &DropIndexPlan) -> Result<bool, DatabaseError> {
    if plan.if_exists && !catalog.index_exists(&plan.index_name) {
        return Ok(false);
    }
    if catalog.get_index(&plan.index_name)?.is_auto() {
        return Err(DatabaseError::exec(format!(
            "index '{}' belongs to a UNIQUE or PRIMARY KEY constraint and cannot be dropped",
            plan.index_name
        )));
    }
    let index = catalog.remove_index(pager, &plan.index_name)?;
    index.tree().drop_tree(pager)?;
    debug!(index = %index.index_name, "dropped index");
    Ok(true)
}
