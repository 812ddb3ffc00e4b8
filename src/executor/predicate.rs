//! Row-at-a-time expression evaluation with SQL three-valued logic.

use std::cmp::Ordering;

use crate::{
    planner::expression::{
        BinaryOpExpression, BinaryOperator, ColumnRef, Expression, FunctionExpression,
        UnaryOperator,
    },
    storage::schema::TableSchema,
    types::{RowId, error::DatabaseError, value::Value},
};

/// The row an expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct RowScope<'a> {
    table: Option<&'a TableSchema>,
    alias: Option<&'a str>,
    row_id: Option<RowId>,
    values: &'a [Value],
}

impl<'a> RowScope<'a> {
    /// Scope without a table, for constant expressions.
    pub fn empty() -> Self {
        Self {
            table: None,
            alias: None,
            row_id: None,
            values: &[],
        }
    }

    pub fn new(table: &'a TableSchema, alias: Option<&'a str>, row_id: RowId, values: &'a [Value]) -> Self {
        Self {
            table: Some(table),
            alias,
            row_id: Some(row_id),
            values,
        }
    }

    fn resolve(&self, column: &ColumnRef) -> Result<Value, DatabaseError> {
        let not_found = || DatabaseError::ColumnNotFound {
            name: match &column.table {
                Some(t) => format!("{}.{}", t, column.column),
                None => column.column.clone(),
            },
            table: self.table.map(|t| t.table_name.clone()).unwrap_or_default(),
        };
        let Some(table) = self.table else {
            return Err(not_found());
        };
        if let Some(qualifier) = &column.table {
            let matches_name = qualifier.eq_ignore_ascii_case(&table.table_name) && self.alias.is_none();
            let matches_alias = self.alias.is_some_and(|a| qualifier.eq_ignore_ascii_case(a));
            if !matches_name && !matches_alias {
                return Err(not_found());
            }
        }
        if let Some(index) = table.get_column_index(&column.column) {
            return Ok(self.values.get(index).cloned().unwrap_or(Value::Null));
        }
        if is_rowid_name(&column.column) {
            return Ok(self.row_id.map(Value::Integer).unwrap_or(Value::Null));
        }
        Err(not_found())
    }
}

pub fn is_rowid_name(name: &str) -> bool {
    ["rowid", "_rowid_", "oid"]
        .iter()
        .any(|n| name.eq_ignore_ascii_case(n))
}

/// Evaluate an expression that must not reference columns.
pub fn evaluate_constant(expression: &Expression) -> Result<Value, DatabaseError> {
    evaluate(expression, &RowScope::empty())
}

/// WHERE semantics: NULL counts as false.
pub fn is_true(expression: &Expression, scope: &RowScope<'_>) -> Result<bool, DatabaseError> {
    Ok(evaluate(expression, scope)?.truthiness().unwrap_or(false))
}

pub fn evaluate(expression: &Expression, scope: &RowScope<'_>) -> Result<Value, DatabaseError> {
    match expression {
        Expression::Literal(value) => Ok(value.clone()),
        Expression::Column(column) => scope.resolve(column),
        Expression::BinaryOp(op) => evaluate_binary(op, scope),
        Expression::UnaryOp(op) => {
            let value = evaluate(&op.expression, scope)?;
            match op.operator {
                UnaryOperator::Not => Ok(bool_value(value.truthiness().map(|b| !b))),
                UnaryOperator::Plus => Ok(value),
                UnaryOperator::Minus => negate(value),
            }
        }
        Expression::Function(function) => evaluate_function(function, scope),
        Expression::IsNull {
            expression,
            negated,
        } => {
            let is_null = evaluate(expression, scope)?.is_null();
            Ok(bool_value(Some(is_null != *negated)))
        }
        Expression::InList {
            expression,
            list,
            negated,
        } => {
            let value = evaluate(expression, scope)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for item in list {
                let candidate = evaluate(item, scope)?;
                if candidate.is_null() {
                    saw_null = true;
                } else if value.compare(&candidate) == Ordering::Equal {
                    return Ok(bool_value(Some(!*negated)));
                }
            }
            Ok(if saw_null {
                Value::Null
            } else {
                bool_value(Some(*negated))
            })
        }
        Expression::Between {
            expression,
            low,
            high,
            negated,
        } => {
            let value = evaluate(expression, scope)?;
            let low = evaluate(low, scope)?;
            let high = evaluate(high, scope)?;
            let above = compare(&value, &low, |o| o != Ordering::Less);
            let below = compare(&value, &high, |o| o != Ordering::Greater);
            let inside = and(above, below);
            Ok(bool_value(if *negated { inside.map(|b| !b) } else { inside }))
        }
    }
}

fn bool_value(value: Option<bool>) -> Value {
    match value {
        Some(b) => Value::Integer(b as i64),
        None => Value::Null,
    }
}

fn and(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn compare(left: &Value, right: &Value, test: impl Fn(Ordering) -> bool) -> Option<bool> {
    if left.is_null() || right.is_null() {
        None
    } else {
        Some(test(left.compare(right)))
    }
}

fn evaluate_binary(op: &BinaryOpExpression, scope: &RowScope<'_>) -> Result<Value, DatabaseError> {
    let left = evaluate(&op.left, scope)?;
    // Short-circuit where the left side already decides the outcome
    match (op.operator, left.truthiness()) {
        (BinaryOperator::And, Some(false)) => return Ok(Value::Integer(0)),
        (BinaryOperator::Or, Some(true)) => return Ok(Value::Integer(1)),
        _ => {}
    }
    let right = evaluate(&op.right, scope)?;
    match op.operator {
        BinaryOperator::And => Ok(bool_value(and(left.truthiness(), right.truthiness()))),
        BinaryOperator::Or => Ok(bool_value(or(left.truthiness(), right.truthiness()))),
        BinaryOperator::Equal => Ok(bool_value(compare(&left, &right, |o| o == Ordering::Equal))),
        BinaryOperator::NotEqual => Ok(bool_value(compare(&left, &right, |o| o != Ordering::Equal))),
        BinaryOperator::LessThan => Ok(bool_value(compare(&left, &right, |o| o == Ordering::Less))),
        BinaryOperator::LessThanOrEqual => {
            Ok(bool_value(compare(&left, &right, |o| o != Ordering::Greater)))
        }
        BinaryOperator::GreaterThan => Ok(bool_value(compare(&left, &right, |o| o == Ordering::Greater))),
        BinaryOperator::GreaterThanOrEqual => {
            Ok(bool_value(compare(&left, &right, |o| o != Ordering::Less)))
        }
        BinaryOperator::Like | BinaryOperator::NotLike => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            let matched = like_match(&text_of(&left), &text_of(&right));
            Ok(bool_value(Some(matched == (op.operator == BinaryOperator::Like))))
        }
        BinaryOperator::Concat => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            Ok(Value::Text(format!("{}{}", text_of(&left), text_of(&right))))
        }
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Modulo => arithmetic(op.operator, left, right),
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Integer(i64),
    Real(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Real(r) => r,
        }
    }
}

/// Numeric reading of a value; text that does not look like a number is 0.
fn numeric(value: &Value) -> Number {
    match value {
        Value::Integer(i) => Number::Integer(*i),
        Value::Real(r) => Number::Real(*r),
        Value::Text(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .map(Number::Integer)
                .or_else(|_| trimmed.parse::<f64>().map(Number::Real))
                .unwrap_or(Number::Integer(0))
        }
        Value::Null | Value::Blob(_) => Number::Integer(0),
    }
}

fn arithmetic(operator: BinaryOperator, left: Value, right: Value) -> Result<Value, DatabaseError> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let (l, r) = (numeric(&left), numeric(&right));
    if let (Number::Integer(a), Number::Integer(b)) = (l, r) {
        let exact = match operator {
            BinaryOperator::Add => a.checked_add(b),
            BinaryOperator::Subtract => a.checked_sub(b),
            BinaryOperator::Multiply => a.checked_mul(b),
            BinaryOperator::Divide => {
                if b == 0 {
                    return Ok(Value::Null);
                }
                a.checked_div(b)
            }
            BinaryOperator::Modulo => {
                if b == 0 {
                    return Ok(Value::Null);
                }
                Some(a.wrapping_rem(b))
            }
            _ => None,
        };
        // Integer overflow falls through to floating point
        if let Some(result) = exact {
            return Ok(Value::Integer(result));
        }
    }
    let (a, b) = (l.as_f64(), r.as_f64());
    let result = match operator {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => {
            if b == 0.0 {
                return Ok(Value::Null);
            }
            a / b
        }
        BinaryOperator::Modulo => {
            let (a, b) = (a.trunc(), b.trunc());
            if b == 0.0 {
                return Ok(Value::Null);
            }
            a % b
        }
        other => {
            return Err(DatabaseError::exec(format!(
                "operator {} is not arithmetic",
                other.symbol()
            )));
        }
    };
    Ok(Value::Real(result))
}

fn negate(value: Value) -> Result<Value, DatabaseError> {
    Ok(match value {
        Value::Null => Value::Null,
        other => match numeric(&other) {
            Number::Integer(i) => i
                .checked_neg()
                .map(Value::Integer)
                .unwrap_or(Value::Real(-(i as f64))),
            Number::Real(r) => Value::Real(-r),
        },
    })
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        other => other.to_string(),
    }
}

/// LIKE with `%` and `_`, ASCII case-insensitive.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let (mut t, mut p) = (0, 0);
    // Last `%` seen and the text position it was matched against
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

fn evaluate_function(function: &FunctionExpression, scope: &RowScope<'_>) -> Result<Value, DatabaseError> {
    let args = function
        .args
        .iter()
        .map(|arg| evaluate(arg, scope))
        .collect::<Result<Vec<_>, _>>()?;
    let arity = |expected: usize| -> Result<(), DatabaseError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(DatabaseError::exec(format!(
                "wrong number of arguments to function {}(): expected {}, got {}",
                function.name,
                expected,
                args.len()
            )))
        }
    };
    match function.name.as_str() {
        "UPPER" | "LOWER" => {
            arity(1)?;
            Ok(match &args[0] {
                Value::Null => Value::Null,
                value if function.name == "UPPER" => Value::Text(text_of(value).to_uppercase()),
                value => Value::Text(text_of(value).to_lowercase()),
            })
        }
        "LENGTH" => {
            arity(1)?;
            Ok(match &args[0] {
                Value::Null => Value::Null,
                Value::Blob(bytes) => Value::Integer(bytes.len() as i64),
                value => Value::Integer(text_of(value).chars().count() as i64),
            })
        }
        "ABS" => {
            arity(1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                value => match numeric(value) {
                    Number::Integer(i) => i
                        .checked_abs()
                        .map(Value::Integer)
                        .ok_or_else(|| DatabaseError::exec("integer overflow in abs()")),
                    Number::Real(r) => Ok(Value::Real(r.abs())),
                },
            }
        }
        "COALESCE" => {
            if args.is_empty() {
                return Err(DatabaseError::exec("coalesce() needs at least one argument"));
            }
            Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null))
        }
        "TYPEOF" => {
            arity(1)?;
            Ok(Value::Text(args[0].type_name().to_string()))
        }
        other => Err(DatabaseError::exec(format!("no such function: {other}"))),
    }
}
