use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    planner::{
        SqlParser, Statement,
        expression::Expression,
        statement::{ColumnDefinition, CreateIndexPlan, CreateTablePlan},
    },
    storage::{
        btree::BTree,
        node::{TreeKind, decode_rowid, encode_rowid},
        pager::Pager,
    },
    types::{
        PageId, RowId,
        error::DatabaseError,
        record::{decode_values, encode_values},
        value::{DataType, Value},
    },
};

/// Name the catalog tree goes by in errors and logs.
pub const CATALOG_NAME: &str = "lumbung_schema";
const AUTOINDEX_PREFIX: &str = "lumbung_autoindex_";

/// Represents a column definition in a table schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    pub position: usize,
    pub nullable: bool,
    pub default_value: Option<Value>,
    pub primary_key: bool,
    pub unique: bool,
}

impl ColumnSchema {
    pub fn new(name: String, data_type: DataType, position: usize) -> Self {
        Self {
            name,
            data_type,
            position,
            nullable: true,
            default_value: None,
            primary_key: false,
            unique: false,
        }
    }

    fn from_definition(definition: &ColumnDefinition, position: usize) -> Result<Self, DatabaseError> {
        let mut column = Self::new(definition.name.clone(), definition.data_type, position);
        column.nullable = definition.nullable;
        column.primary_key = definition.primary_key;
        column.unique = definition.unique;
        if let Some(default) = &definition.default_value {
            let value = default.clone().coerce_for_column(&definition.data_type, &definition.name)?;
            column.default_value = Some(value);
        }
        Ok(column)
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", quote_identifier(&self.name), self.data_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default_value {
            sql.push_str(&format!(" DEFAULT {}", Expression::Literal(default.clone())));
        }
        sql
    }
}

/// Represents a complete table schema with all column definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
    pub root_page_id: PageId,
    pub sql: String,
    /// Position of the INTEGER PRIMARY KEY column standing in for the rowid
    pub rowid_alias: Option<usize>,
    /// Key of this table's entry in the catalog tree
    pub catalog_id: RowId,
}

impl TableSchema {
    /// Validate a CREATE TABLE plan and build the schema it describes.
    pub fn from_plan(plan: &CreateTablePlan, root_page_id: PageId) -> Result<Self, DatabaseError> {
        if plan.columns.is_empty() {
            return Err(DatabaseError::exec(format!(
                "table '{}' must have at least one column",
                plan.table_name
            )));
        }
        let mut columns = Vec::with_capacity(plan.columns.len());
        for (position, definition) in plan.columns.iter().enumerate() {
            if columns
                .iter()
                .any(|c: &ColumnSchema| c.name.eq_ignore_ascii_case(&definition.name))
            {
                return Err(DatabaseError::exec(format!(
                    "duplicate column name '{}' in table '{}'",
                    definition.name, plan.table_name
                )));
            }
            if definition.name.eq_ignore_ascii_case("rowid") {
                return Err(DatabaseError::exec("'rowid' is reserved for the row key"));
            }
            columns.push(ColumnSchema::from_definition(definition, position)?);
        }
        let primary_keys: Vec<&ColumnSchema> = columns.iter().filter(|c| c.primary_key).collect();
        if primary_keys.len() > 1 {
            return Err(DatabaseError::exec(format!(
                "table '{}' has more than one primary key",
                plan.table_name
            )));
        }
        let rowid_alias = primary_keys
            .first()
            .filter(|c| c.data_type == DataType::Integer)
            .map(|c| c.position);

        let mut schema = Self {
            table_name: plan.table_name.clone(),
            columns,
            root_page_id,
            sql: String::new(),
            rowid_alias,
            catalog_id: 0,
        };
        schema.sql = schema.to_sql();
        Ok(schema)
    }

    fn to_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(ColumnSchema::to_sql).collect();
        format!(
            "CREATE TABLE {} ({})",
            quote_identifier(&self.table_name),
            columns.join(", ")
        )
    }

    pub fn tree(&self) -> BTree {
        BTree::open(self.table_name.clone(), TreeKind::Table, self.root_page_id)
    }

    /// Get column by name
    pub fn get_column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|col| col.name.eq_ignore_ascii_case(name))
    }

    /// Get column index by name
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|col| col.name.eq_ignore_ascii_case(name))
    }

    pub fn column_index_or_err(&self, name: &str) -> Result<usize, DatabaseError> {
        self.get_column_index(name)
            .ok_or_else(|| DatabaseError::ColumnNotFound {
                name: name.to_string(),
                table: self.table_name.clone(),
            })
    }

    /// Get all column names in order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|col| col.name.clone()).collect()
    }

    /// Columns needing an automatic unique index.
    pub fn unique_columns(&self) -> Vec<&ColumnSchema> {
        self.columns
            .iter()
            .filter(|col| (col.primary_key && self.rowid_alias != Some(col.position)) || col.unique)
            .collect()
    }

    /// Apply default values to a row where values are missing
    pub fn apply_defaults(&self, provided: Vec<Option<Value>>) -> Vec<Value> {
        provided
            .into_iter()
            .zip(&self.columns)
            .map(|(value, column)| {
                value.unwrap_or_else(|| column.default_value.clone().unwrap_or(Value::Null))
            })
            .collect()
    }

    /// Check NOT NULL and type constraints, widening integers stored in
    /// REAL columns.
    pub fn validate_row(&self, values: Vec<Value>) -> Result<Vec<Value>, DatabaseError> {
        if values.len() != self.columns.len() {
            return Err(DatabaseError::schema_mismatch(format!(
                "row has {} values but table '{}' expects {} columns",
                values.len(),
                self.table_name,
                self.columns.len()
            )));
        }
        values
            .into_iter()
            .zip(&self.columns)
            .map(|(value, column)| {
                if value.is_null() && !column.nullable {
                    return Err(DatabaseError::exec(format!(
                        "NOT NULL constraint failed: {}.{}",
                        self.table_name, column.name
                    )));
                }
                value.coerce_for_column(&column.data_type, &column.name)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub index_name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    /// Positions of `columns` in the table
    pub column_positions: Vec<usize>,
    pub unique: bool,
    pub root_page_id: PageId,
    pub sql: String,
    pub catalog_id: RowId,
}

impl IndexSchema {
    pub fn from_plan(plan: &CreateIndexPlan, table: &TableSchema, root_page_id: PageId) -> Result<Self, DatabaseError> {
        if plan.columns.is_empty() {
            return Err(DatabaseError::exec("index must cover at least one column"));
        }
        let mut column_positions = Vec::with_capacity(plan.columns.len());
        let mut columns = Vec::with_capacity(plan.columns.len());
        for name in &plan.columns {
            let position = table.column_index_or_err(name)?;
            if column_positions.contains(&position) {
                return Err(DatabaseError::exec(format!(
                    "column '{name}' listed twice in index '{}'",
                    plan.index_name
                )));
            }
            column_positions.push(position);
            columns.push(table.columns[position].name.clone());
        }
        let mut index = Self {
            index_name: plan.index_name.clone(),
            table_name: table.table_name.clone(),
            columns,
            column_positions,
            unique: plan.unique,
            root_page_id,
            sql: String::new(),
            catalog_id: 0,
        };
        index.sql = index.to_sql();
        Ok(index)
    }

    /// Name of the `n`th automatic index of a table.
    pub fn auto_name(table_name: &str, n: usize) -> String {
        format!("{AUTOINDEX_PREFIX}{table_name}_{n}")
    }

    pub fn is_auto(&self) -> bool {
        self.index_name.starts_with(AUTOINDEX_PREFIX)
    }

    fn to_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| quote_identifier(c)).collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            quote_identifier(&self.index_name),
            quote_identifier(&self.table_name),
            columns.join(", ")
        )
    }

    pub fn tree(&self) -> BTree {
        BTree::open(self.index_name.clone(), TreeKind::Index, self.root_page_id)
    }

    /// Indexed values of a table row, in index order.
    pub fn key_values(&self, row: &[Value]) -> Vec<Value> {
        self.column_positions
            .iter()
            .map(|&p| row.get(p).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Full entry key: indexed values followed by the rowid.
    pub fn entry_key(&self, row: &[Value], row_id: RowId) -> Vec<u8> {
        let mut values = self.key_values(row);
        values.push(Value::Integer(row_id));
        encode_values(&values)
    }
}

/// One row of the catalog tree.
struct CatalogEntry<'a> {
    kind: &'static str,
    name: &'a str,
    table_name: &'a str,
    root_page_id: PageId,
    sql: &'a str,
}

impl TableSchema {
    fn catalog_entry(&self) -> CatalogEntry<'_> {
        CatalogEntry {
            kind: "table",
            name: &self.table_name,
            table_name: &self.table_name,
            root_page_id: self.root_page_id,
            sql: &self.sql,
        }
    }
}

impl IndexSchema {
    fn catalog_entry(&self) -> CatalogEntry<'_> {
        CatalogEntry {
            kind: "index",
            name: &self.index_name,
            table_name: &self.table_name,
            root_page_id: self.root_page_id,
            sql: &self.sql,
        }
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Tables and indexes known to one database, mirrored in the catalog tree.
///
/// Each catalog entry is a record `(type, name, tbl_name, rootpage, sql)`.
/// The in-memory maps are rebuilt from those rows by re-parsing the stored
/// SQL when the database is opened.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableSchema>,
    indexes: BTreeMap<String, IndexSchema>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(pager: &Pager) -> Result<Self, DatabaseError> {
        let tree = BTree::open(CATALOG_NAME, TreeKind::Table, pager.catalog_root());
        let parser = SqlParser::new();
        let mut catalog = Self::new();
        let mut pending_indexes = Vec::new();

        for entry in tree.scan(pager)? {
            let (key, bytes) = entry?;
            let catalog_id = decode_rowid(&key)?;
            let values = decode_values(&bytes)?;
            let (kind, root_page_id, sql) = match values.as_slice() {
                [Value::Text(kind), Value::Text(_), Value::Text(_), Value::Integer(root), Value::Text(sql)] => {
                    (kind.clone(), *root as PageId, sql.clone())
                }
                _ => {
                    return Err(DatabaseError::corrupt(
                        pager.catalog_root(),
                        format!("malformed catalog entry {catalog_id}"),
                    ));
                }
            };
            match (kind.as_str(), parser.parse(&sql)?) {
                ("table", Statement::CreateTable(plan)) => {
                    let mut schema = TableSchema::from_plan(&plan, root_page_id)?;
                    schema.catalog_id = catalog_id;
                    catalog.tables.insert(key_of(&schema.table_name), schema);
                }
                ("index", Statement::CreateIndex(plan)) => {
                    pending_indexes.push((plan, root_page_id, catalog_id));
                }
                _ => {
                    return Err(DatabaseError::corrupt(
                        pager.catalog_root(),
                        format!("catalog entry {catalog_id} of type '{kind}' holds unexpected SQL"),
                    ));
                }
            }
        }

        for (plan, root_page_id, catalog_id) in pending_indexes {
            let table = catalog.get_table(&plan.table_name)?;
            let mut index = IndexSchema::from_plan(&plan, table, root_page_id)?;
            index.catalog_id = catalog_id;
            catalog.indexes.insert(key_of(&index.index_name), index);
        }
        debug!(
            tables = catalog.tables.len(),
            indexes = catalog.indexes.len(),
            "loaded catalog"
        );
        Ok(catalog)
    }

    pub fn get_table(&self, name: &str) -> Result<&TableSchema, DatabaseError> {
        self.tables
            .get(&key_of(name))
            .ok_or_else(|| DatabaseError::TableNotFound {
                name: name.to_string(),
            })
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(&key_of(name))
    }

    pub fn get_index(&self, name: &str) -> Result<&IndexSchema, DatabaseError> {
        self.indexes
            .get(&key_of(name))
            .ok_or_else(|| DatabaseError::IndexNotFound {
                name: name.to_string(),
            })
    }

    pub fn index_exists(&self, name: &str) -> bool {
        self.indexes.contains_key(&key_of(name))
    }

    /// Indexes on a table, in name order.
    pub fn indexes_for(&self, table_name: &str) -> Vec<IndexSchema> {
        self.indexes
            .values()
            .filter(|index| index.table_name.eq_ignore_ascii_case(table_name))
            .cloned()
            .collect()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.values().map(|t| t.table_name.clone()).collect()
    }

    pub fn add_table(&mut self, pager: &mut Pager, mut schema: TableSchema) -> Result<(), DatabaseError> {
        schema.catalog_id = self.write_entry(pager, None, schema.catalog_entry())?;
        debug!(table = %schema.table_name, root = schema.root_page_id, "registered table");
        self.tables.insert(key_of(&schema.table_name), schema);
        Ok(())
    }

    pub fn add_index(&mut self, pager: &mut Pager, mut index: IndexSchema) -> Result<(), DatabaseError> {
        index.catalog_id = self.write_entry(pager, None, index.catalog_entry())?;
        debug!(index = %index.index_name, table = %index.table_name, "registered index");
        self.indexes.insert(key_of(&index.index_name), index);
        Ok(())
    }

    /// Record a table's new root page after its tree split or collapsed.
    pub fn set_table_root(&mut self, pager: &mut Pager, name: &str, root_page_id: PageId) -> Result<(), DatabaseError> {
        let schema = self
            .tables
            .get_mut(&key_of(name))
            .ok_or_else(|| DatabaseError::TableNotFound {
                name: name.to_string(),
            })?;
        if schema.root_page_id == root_page_id {
            return Ok(());
        }
        schema.root_page_id = root_page_id;
        let schema = schema.clone();
        self.write_entry(pager, Some(schema.catalog_id), schema.catalog_entry())?;
        Ok(())
    }

    pub fn set_index_root(&mut self, pager: &mut Pager, name: &str, root_page_id: PageId) -> Result<(), DatabaseError> {
        let index = self
            .indexes
            .get_mut(&key_of(name))
            .ok_or_else(|| DatabaseError::IndexNotFound {
                name: name.to_string(),
            })?;
        if index.root_page_id == root_page_id {
            return Ok(());
        }
        index.root_page_id = root_page_id;
        let index = index.clone();
        self.write_entry(pager, Some(index.catalog_id), index.catalog_entry())?;
        Ok(())
    }

    pub fn remove_table(&mut self, pager: &mut Pager, name: &str) -> Result<TableSchema, DatabaseError> {
        let schema = self
            .tables
            .remove(&key_of(name))
            .ok_or_else(|| DatabaseError::TableNotFound {
                name: name.to_string(),
            })?;
        self.delete_entry(pager, schema.catalog_id)?;
        Ok(schema)
    }

    pub fn remove_index(&mut self, pager: &mut Pager, name: &str) -> Result<IndexSchema, DatabaseError> {
        let index = self
            .indexes
            .remove(&key_of(name))
            .ok_or_else(|| DatabaseError::IndexNotFound {
                name: name.to_string(),
            })?;
        self.delete_entry(pager, index.catalog_id)?;
        Ok(index)
    }

    fn write_entry(
        &self,
        pager: &mut Pager,
        catalog_id: Option<RowId>,
        entry: CatalogEntry<'_>,
    ) -> Result<RowId, DatabaseError> {
        let mut tree = BTree::open(CATALOG_NAME, TreeKind::Table, pager.catalog_root());
        let catalog_id = match catalog_id {
            Some(id) => {
                tree.delete(pager, &encode_rowid(id))?;
                id
            }
            None => match tree.last_key(pager)? {
                Some(key) => decode_rowid(&key)? + 1,
                None => 1,
            },
        };
        let record = encode_values(&[
            Value::Text(entry.kind.to_string()),
            Value::Text(entry.name.to_string()),
            Value::Text(entry.table_name.to_string()),
            Value::Integer(entry.root_page_id as i64),
            Value::Text(entry.sql.to_string()),
        ]);
        tree.insert(pager, &encode_rowid(catalog_id), &record)?;
        pager.set_catalog_root(tree.root());
        pager.bump_schema_cookie();
        Ok(catalog_id)
    }

    fn delete_entry(&self, pager: &mut Pager, catalog_id: RowId) -> Result<(), DatabaseError> {
        let mut tree = BTree::open(CATALOG_NAME, TreeKind::Table, pager.catalog_root());
        tree.delete(pager, &encode_rowid(catalog_id))?;
        pager.set_catalog_root(tree.root());
        pager.bump_schema_cookie();
        Ok(())
    }
}

fn key_of(name: &str) -> String {
    name.to_ascii_lowercase()
}
