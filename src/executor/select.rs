use crate::{
    executor::{
        predicate::{RowScope, evaluate, evaluate_constant, is_true},
        result::ResultSet,
        scan::{ScanIterator, TableScanner, choose_access_path},
    },
    planner::{
        expression::{ColumnRef, Expression},
        statement::{SelectItem, SelectPlan},
    },
    storage::{pager::Pager, schema::Catalog},
    types::{error::DatabaseError, value::Value},
};

/// One output column: the expression computing it and its reported name.
struct OutputColumn {
    expression: Expression,
    name: String,
}

fn output_columns(plan: &SelectPlan, catalog: &Catalog) -> Result<Vec<OutputColumn>, DatabaseError> {
    let mut columns = Vec::new();
    for item in &plan.projection {
        match item {
            SelectItem::Wildcard => {
                let Some(from) = &plan.from else {
                    return Err(DatabaseError::exec("no tables specified for '*'"));
                };
                let table = catalog.get_table(&from.name)?;
                columns.extend(table.columns.iter().map(|column| OutputColumn {
                    expression: Expression::Column(ColumnRef {
                        table: None,
                        column: column.name.clone(),
                    }),
                    name: column.name.clone(),
                }));
            }
            SelectItem::Expression { expression, alias } => {
                let name = match (alias, expression) {
                    (Some(alias), _) => alias.clone(),
                    (None, Expression::Column(column)) => column.column.clone(),
                    (None, other) => other.to_string(),
                };
                columns.push(OutputColumn {
                    expression: expression.clone(),
                    name,
                });
            }
        }
    }
    Ok(columns)
}

/// ORDER BY terms may name an output column by position or alias.
fn resolve_order_term<'e>(
    expression: &'e Expression,
    columns: &'e [OutputColumn],
) -> Result<&'e Expression, DatabaseError> {
    match expression {
        Expression::Literal(Value::Integer(n)) => usize::try_from(*n)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| columns.get(i))
            .map(|column| &column.expression)
            .ok_or_else(|| {
                DatabaseError::exec(format!(
                    "ORDER BY term {n} is out of range, expected 1 to {}",
                    columns.len()
                ))
            }),
        Expression::Column(ColumnRef { table: None, column }) => Ok(columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(column))
            .map(|c| &c.expression)
            .unwrap_or(expression)),
        other => Ok(other),
    }
}

fn bound(expression: Option<&Expression>, clause: &str) -> Result<Option<usize>, DatabaseError> {
    let Some(expression) = expression else {
        return Ok(None);
    };
    match evaluate_constant(expression)? {
        Value::Integer(n) => Ok(usize::try_from(n).ok()),
        other => Err(DatabaseError::exec(format!(
            "{clause} must be an integer, got {}",
            other.type_name()
        ))),
    }
}

struct Candidate {
    sort_keys: Vec<Value>,
    values: Vec<Value>,
}

/// Run a SELECT against a consistent view of the pager.
pub fn execute_select(pager: &Pager, catalog: &Catalog, plan: &SelectPlan) -> Result<ResultSet, DatabaseError> {
    let columns = output_columns(plan, catalog)?;
    let order_terms = plan
        .order_by
        .iter()
        .map(|item| resolve_order_term(&item.expression, &columns).map(|e| (e, item.descending)))
        .collect::<Result<Vec<_>, _>>()?;

    let candidate = |scope: &RowScope<'_>| -> Result<Option<Candidate>, DatabaseError> {
        if let Some(condition) = &plan.condition {
            if !is_true(condition, scope)? {
                return Ok(None);
            }
        }
        let sort_keys = order_terms
            .iter()
            .map(|(expression, _)| evaluate(expression, scope))
            .collect::<Result<Vec<_>, _>>()?;
        let values = columns
            .iter()
            .map(|column| evaluate(&column.expression, scope))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Candidate { sort_keys, values }))
    };

    let mut candidates = Vec::new();
    match &plan.from {
        None => candidates.extend(candidate(&RowScope::empty())?),
        Some(from) => {
            let table = catalog.get_table(&from.name)?;
            let alias = from.alias.as_deref();
            let indexes = catalog.indexes_for(&table.table_name);
            let path = choose_access_path(table, alias, &indexes, plan.condition.as_ref())?;
            for row in ScanIterator::new(TableScanner::new(pager, table, path)) {
                let row = row?;
                let scope = RowScope::new(table, alias, row.row_id.unwrap_or_default(), &row.values);
                candidates.extend(candidate(&scope)?);
            }
        }
    }

    if !order_terms.is_empty() {
        // Stable, so ties keep scan order
        candidates.sort_by(|a, b| {
            for (i, (_, descending)) in order_terms.iter().enumerate() {
                let ordering = a.sort_keys[i].compare(&b.sort_keys[i]);
                let ordering = if *descending { ordering.reverse() } else { ordering };
                if ordering.is_ne() {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
    }

    let offset = bound(plan.offset.as_ref(), "OFFSET")?.unwrap_or(0);
    let limit = bound(plan.limit.as_ref(), "LIMIT")?.unwrap_or(usize::MAX);
    let rows = candidates
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|c| c.values)
        .collect();

    Ok(ResultSet::new(
        columns.into_iter().map(|column| column.name).collect(),
        rows,
    ))
}
