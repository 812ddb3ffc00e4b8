use lumbung::{
    planner::{
        SqlParser, Statement,
        expression::{BinaryOperator, ColumnRef, Expression},
        statement::{SelectItem, TableRef},
    },
    types::{
        error::DatabaseError,
        value::{DataType, Value},
    },
};

fn parse(sql: &str) -> Statement {
    SqlParser::new().parse(sql).unwrap()
}

#[test]
fn test_parse_create_table() {
    let Statement::CreateTable(plan) = parse(
        "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, email VARCHAR(255) NOT NULL UNIQUE, score REAL DEFAULT -1.5)",
    ) else {
        panic!("Expected CREATE TABLE");
    };
    assert_eq!(plan.table_name, "users");
    assert!(plan.if_not_exists);
    assert_eq!(plan.columns.len(), 3);

    let id = &plan.columns[0];
    assert_eq!(id.data_type, DataType::Integer);
    assert!(id.primary_key);
    assert!(!id.nullable);

    let email = &plan.columns[1];
    assert_eq!(email.data_type, DataType::Text);
    assert!(email.unique);
    assert!(!email.nullable);

    assert_eq!(plan.columns[2].default_value, Some(Value::Real(-1.5)));
}

#[test]
fn test_parse_create_and_drop_index() {
    let Statement::CreateIndex(plan) = parse("CREATE UNIQUE INDEX idx_email ON users (email, id)") else {
        panic!("Expected CREATE INDEX");
    };
    assert!(plan.unique);
    assert_eq!(plan.table_name, "users");
    assert_eq!(plan.columns, vec!["email".to_string(), "id".to_string()]);

    let Statement::DropIndex(plan) = parse("DROP INDEX IF EXISTS idx_email") else {
        panic!("Expected DROP INDEX");
    };
    assert!(plan.if_exists);
    assert!(matches!(parse("DROP TABLE users;"), Statement::DropTable(_)));
}

#[test]
fn test_parse_insert_with_columns_and_rows() {
    let Statement::Insert(plan) = parse("INSERT INTO t (id, name) VALUES (1, 'a'), (2, NULL)") else {
        panic!("Expected INSERT");
    };
    assert_eq!(plan.columns, Some(vec!["id".to_string(), "name".to_string()]));
    assert_eq!(plan.values.len(), 2);
    assert_eq!(plan.values[1][1], Expression::Literal(Value::Null));
}

#[test]
fn test_parse_select_clauses() {
    let Statement::Select(plan) = parse(
        "SELECT u.name AS n, * FROM users u WHERE u.age >= 18 AND name LIKE 'a%' ORDER BY 1 DESC, name LIMIT 10 OFFSET 5",
    ) else {
        panic!("Expected SELECT");
    };
    assert_eq!(
        plan.from,
        Some(TableRef {
            name: "users".to_string(),
            alias: Some("u".to_string()),
        })
    );
    assert_eq!(plan.projection.len(), 2);
    assert_eq!(
        plan.projection[0],
        SelectItem::Expression {
            expression: Expression::Column(ColumnRef {
                table: Some("u".to_string()),
                column: "name".to_string(),
            }),
            alias: Some("n".to_string()),
        }
    );
    assert_eq!(plan.projection[1], SelectItem::Wildcard);
    assert_eq!(plan.condition.as_ref().unwrap().conjuncts().len(), 2);
    assert_eq!(plan.order_by.len(), 2);
    assert!(plan.order_by[0].descending);
    assert!(!plan.order_by[1].descending);
    assert_eq!(plan.limit, Some(Expression::Literal(Value::Integer(10))));
    assert_eq!(plan.offset, Some(Expression::Literal(Value::Integer(5))));
}

#[test]
fn test_operator_precedence() {
    let Statement::Select(plan) = parse("SELECT 1 + 2 * 3 = 7 OR NOT 0") else {
        panic!("Expected SELECT");
    };
    let SelectItem::Expression { expression, .. } = &plan.projection[0] else {
        panic!("Expected expression");
    };
    let Expression::BinaryOp(or) = expression else {
        panic!("Expected OR at the top");
    };
    assert_eq!(or.operator, BinaryOperator::Or);
    let Expression::BinaryOp(eq) = &*or.left else {
        panic!("Expected comparison");
    };
    assert_eq!(eq.operator, BinaryOperator::Equal);
    assert_eq!(expression.to_string(), "1 + 2 * 3 = 7 OR NOT 0");
}

#[test]
fn test_parse_update_and_delete() {
    let Statement::Update(plan) = parse("UPDATE t SET a = a + 1, b = 'x' WHERE id IN (1, 2, 3)") else {
        panic!("Expected UPDATE");
    };
    assert_eq!(plan.assignments.len(), 2);
    assert_eq!(plan.assignments[1].column, "b");
    assert!(matches!(plan.condition, Some(Expression::InList { negated: false, .. })));

    let Statement::Delete(plan) = parse("DELETE FROM t") else {
        panic!("Expected DELETE");
    };
    assert!(plan.condition.is_none());
}

#[test]
fn test_parse_error_reports_position() {
    let err = SqlParser::new()
        .parse("SELECT *\nFROM t WHERE")
        .unwrap_err();
    match err {
        DatabaseError::ParseError {
            line,
            expected,
            found,
            ..
        } => {
            assert_eq!(line, 2);
            assert_eq!(expected, "an expression");
            assert_eq!(found, "end of input");
        }
        other => panic!("Expected ParseError, got {:?}", other),
    }
}

#[test]
fn test_unknown_statement_is_a_parse_error() {
    let err = SqlParser::new().parse("SELEC 1").unwrap_err();
    assert_eq!(err.kind(), "ParseError");
    match err {
        DatabaseError::ParseError { line, column, .. } => {
            assert_eq!((line, column), (1, 1));
        }
        other => panic!("Expected ParseError, got {:?}", other),
    }
}

#[test]
fn test_unsupported_type_is_rejected() {
    let err = SqlParser::new()
        .parse("CREATE TABLE t (shape GEOMETRY)")
        .unwrap_err();
    assert!(matches!(err, DatabaseError::ParseError { .. }));
}

#[test]
fn test_script_parses_all_or_nothing() {
    let parser = SqlParser::new();
    let statements = parser
        .parse_script("CREATE TABLE t (a INT); INSERT INTO t VALUES (1);; SELECT a FROM t")
        .unwrap();
    assert_eq!(statements.len(), 3);

    assert!(parser.parse_script("CREATE TABLE t (a INT); SELECT FROM").is_err());
}

#[test]
fn test_trailing_tokens_are_rejected() {
    assert!(SqlParser::new().parse("SELECT 1 2").is_err());
}

#[test]
fn test_out_of_range_reals_are_rejected() {
    let parser = SqlParser::new();
    for sql in [
        "SELECT 1e999",
        "SELECT -1e999",
        "CREATE TABLE t (x REAL DEFAULT 1e999)",
        "CREATE TABLE t (x REAL DEFAULT -1e999)",
    ] {
        let err = parser.parse(sql).unwrap_err();
        assert!(matches!(err, DatabaseError::ParseError { .. }), "{sql}: {err}");
    }
    assert!(parser.parse("SELECT 1e308").is_ok());
}
