use serde::{Deserialize, Serialize};

use crate::{
    planner::expression::Expression,
    types::value::{DataType, Value},
};

/// One parsed SQL command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    CreateTable(CreateTablePlan),
    CreateIndex(CreateIndexPlan),
    Insert(InsertPlan),
    Select(SelectPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
    DropTable(DropTablePlan),
    DropIndex(DropIndexPlan),
}

impl Statement {
    /// Statements that run under the shared lock.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Statement::Select(_))
    }

    /// Short label used to tag errors raised while executing the statement.
    pub fn describe(&self) -> String {
        match self {
            Statement::CreateTable(plan) => format!("CREATE TABLE {}", plan.table_name),
            Statement::CreateIndex(plan) => format!("CREATE INDEX {}", plan.index_name),
            Statement::Insert(plan) => format!("INSERT INTO {}", plan.table_name),
            Statement::Select(plan) => match &plan.from {
                Some(table) => format!("SELECT FROM {}", table.name),
                None => "SELECT".to_string(),
            },
            Statement::Update(plan) => format!("UPDATE {}", plan.table_name),
            Statement::Delete(plan) => format!("DELETE FROM {}", plan.table_name),
            Statement::DropTable(plan) => format!("DROP TABLE {}", plan.table_name),
            Statement::DropIndex(plan) => format!("DROP INDEX {}", plan.index_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    Wildcard,
    Expression {
        expression: Expression,
        alias: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub expression: Expression,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectPlan {
    pub projection: Vec<SelectItem>,
    pub from: Option<TableRef>,
    pub condition: Option<Expression>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Expression>,
    pub offset: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertPlan {
    pub table_name: String,
    pub columns: Option<Vec<String>>,
    pub values: Vec<Vec<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePlan {
    pub table_name: String,
    pub assignments: Vec<Assignment>,
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletePlan {
    pub table_name: String,
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTablePlan {
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default_value: Option<Value>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            primary_key: false,
            unique: false,
            default_value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndexPlan {
    pub index_name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropTablePlan {
    pub table_name: String,
    pub if_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropIndexPlan {
    pub index_name: String,
    pub if_exists: bool,
}
