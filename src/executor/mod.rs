pub mod create_table;
pub mod insert;
pub mod modify;
pub mod predicate;
pub mod result;
pub mod scan;
pub mod select;

pub use result::{ResultSet, StatementResult};

use crate::{
    planner::statement::{SelectPlan, Statement},
    storage::{pager::Pager, schema::Catalog},
    types::error::DatabaseError,
};

/// Runs statements against one pager and its catalog.
///
/// The executor writes through the pager's dirty set and never commits;
/// the caller decides whether the statement's changes are kept.
pub struct Executor<'a> {
    pager: &'a mut Pager,
    catalog: &'a mut Catalog,
}

impl<'a> Executor<'a> {
    pub fn new(pager: &'a mut Pager, catalog: &'a mut Catalog) -> Self {
        Self { pager, catalog }
    }

    pub fn execute(&mut self, statement: &Statement) -> Result<StatementResult, DatabaseError> {
        let pager = &mut *self.pager;
        let catalog = &mut *self.catalog;
        let result = match statement {
            Statement::Select(plan) => select::execute_select(pager, catalog, plan).map(StatementResult::Rows),
            Statement::Insert(plan) => insert::execute_insert(pager, catalog, plan).map(StatementResult::Affected),
            Statement::Update(plan) => modify::execute_update(pager, catalog, plan).map(StatementResult::Affected),
            Statement::Delete(plan) => modify::execute_delete(pager, catalog, plan).map(StatementResult::Affected),
            Statement::CreateTable(plan) => create_table::create_table(pager, catalog, plan).map(|_| StatementResult::Affected(0)),
            Statement::CreateIndex(plan) => create_table::create_index(pager, catalog, plan).map(|_| StatementResult::Affected(0)),
            Statement::DropTable(plan) => create_table::drop_table(pager, catalog, plan).map(|_| StatementResult::Affected(0)),
            Statement::DropIndex(plan) => create_table::drop_index(pager, catalog, plan).map(|_| StatementResult::Affected(0)),
        };
        result.map_err(|e| e.in_statement(statement.describe()))
    }
}

/// Read-only entry point for SELECT, usable under a shared lock.
pub fn query(pager: &Pager, catalog: &Catalog, plan: &SelectPlan) -> Result<ResultSet, DatabaseError> {
    select::execute_select(pager, catalog, plan).map_err(|e| {
        let context = match &plan.from {
            Some(table) => format!("SELECT FROM {}", table.name),
            None => "SELECT".to_string(),
        };
        e.in_statement(context)
    })
}
