use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Concat,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
    Like,
    NotLike,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Concat => "||",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::NotLike => "NOT LIKE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryOpExpression {
    pub left: Box<Expression>,
    pub operator: BinaryOperator,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryOpExpression {
    pub operator: UnaryOperator,
    pub expression: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionExpression {
    /// Upper-cased function name
    pub name: String,
    pub args: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(Value),
    Column(ColumnRef),
    BinaryOp(BinaryOpExpression),
    UnaryOp(UnaryOpExpression),
    Function(FunctionExpression),
    IsNull {
        expression: Box<Expression>,
        negated: bool,
    },
    InList {
        expression: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    Between {
        expression: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },
}

impl Expression {
    pub fn column(name: &str) -> Self {
        Expression::Column(ColumnRef {
            table: None,
            column: name.to_string(),
        })
    }

    pub fn literal(value: Value) -> Self {
        Expression::Literal(value)
    }

    pub fn binary(left: Expression, operator: BinaryOperator, right: Expression) -> Self {
        Expression::BinaryOp(BinaryOpExpression {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    pub fn unary(operator: UnaryOperator, expression: Expression) -> Self {
        Expression::UnaryOp(UnaryOpExpression {
            operator,
            expression: Box::new(expression),
        })
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Self::binary(left, BinaryOperator::Equal, right)
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::binary(left, BinaryOperator::And, right)
    }

    /// True when the expression references no columns.
    pub fn is_constant(&self) -> bool {
        match self {
            Expression::Literal(_) => true,
            Expression::Column(_) => false,
            Expression::BinaryOp(op) => op.left.is_constant() && op.right.is_constant(),
            Expression::UnaryOp(op) => op.expression.is_constant(),
            Expression::Function(f) => f.args.iter().all(Expression::is_constant),
            Expression::IsNull { expression, .. } => expression.is_constant(),
            Expression::InList {
                expression, list, ..
            } => expression.is_constant() && list.iter().all(Expression::is_constant),
            Expression::Between {
                expression,
                low,
                high,
                ..
            } => expression.is_constant() && low.is_constant() && high.is_constant(),
        }
    }

    /// Top-level AND operands, left to right.
    pub fn conjuncts(&self) -> Vec<&Expression> {
        match self {
            Expression::BinaryOp(BinaryOpExpression {
                left,
                operator: BinaryOperator::And,
                right,
            }) => {
                let mut parts = left.conjuncts();
                parts.extend(right.conjuncts());
                parts
            }
            other => vec![other],
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// SQL-like rendering, used as the column name of unaliased projections.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(Value::Text(s)) => write!(f, "'{}'", s.replace('\'', "''")),
            Expression::Literal(value) => write!(f, "{value}"),
            Expression::Column(ColumnRef { table: Some(t), column }) => write!(f, "{t}.{column}"),
            Expression::Column(ColumnRef { table: None, column }) => write!(f, "{column}"),
            Expression::BinaryOp(op) => {
                write!(f, "{} {} {}", op.left, op.operator.symbol(), op.right)
            }
            Expression::UnaryOp(op) => match op.operator {
                UnaryOperator::Not => write!(f, "NOT {}", op.expression),
                UnaryOperator::Minus => write!(f, "-{}", op.expression),
                UnaryOperator::Plus => write!(f, "+{}", op.expression),
            },
            Expression::Function(func) => {
                write!(f, "{}(", func.name)?;
                write_list(f, &func.args)?;
                write!(f, ")")
            }
            Expression::IsNull {
                expression,
                negated,
            } => write!(f, "{expression} IS {}NULL", if *negated { "NOT " } else { "" }),
            Expression::InList {
                expression,
                list,
                negated,
            } => {
                write!(f, "{expression} {}IN (", if *negated { "NOT " } else { "" })?;
                write_list(f, list)?;
                write!(f, ")")
            }
            Expression::Between {
                expression,
                low,
                high,
                negated,
            } => write!(
                f,
                "{expression} {}BETWEEN {low} AND {high}",
                if *negated { "NOT " } else { "" }
            ),
        }
    }
}
