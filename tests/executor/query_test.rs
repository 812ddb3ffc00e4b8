use lumbung::{
    Database, ResultSet,
    config::DatabaseConfig,
    executor::{
        Executor, StatementResult,
        scan::{AccessPath, ScanIterator, Scanner, TableScanner, choose_access_path},
    },
    planner::{SqlParser, Statement},
    storage::{pager::Pager, schema::Catalog},
    types::{error::DatabaseError, value::Value},
};

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn people() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.execute_script(
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER, city TEXT);
         CREATE INDEX people_city ON people (city);
         INSERT INTO people VALUES
            (1, 'Ani', 31, 'Bandung'),
            (2, 'Budi', 17, 'Jakarta'),
            (3, 'Citra', NULL, 'Bandung'),
            (4, 'Dewi', 45, NULL),
            (5, 'Eko', 17, 'Surabaya');",
    )
    .unwrap();
    db
}

fn column(result: &ResultSet, index: usize) -> Vec<Value> {
    result.rows.iter().map(|row| row[index].clone()).collect()
}

#[test]
fn test_select_star_returns_inserted_row() {
    let db = Database::open_in_memory().unwrap();
    db.execute("CREATE TABLE t(id INTEGER, name TEXT)").unwrap();
    db.execute("INSERT INTO t VALUES (1,'a')").unwrap();

    let result = db.query("SELECT * FROM t").unwrap();
    assert_eq!(result.columns, vec!["id".to_string(), "name".to_string()]);
    assert_eq!(result.rows, vec![vec![Value::Integer(1), text("a")]]);
}

#[test]
fn test_where_with_three_valued_logic() {
    let db = people();
    let result = db.query("SELECT name FROM people WHERE age > 20").unwrap();
    assert_eq!(column(&result, 0), vec![text("Ani"), text("Dewi")]);

    // NULL age is neither > 20 nor <= 20
    let result = db.query("SELECT name FROM people WHERE NOT age > 20").unwrap();
    assert_eq!(column(&result, 0), vec![text("Budi"), text("Eko")]);

    let result = db.query("SELECT name FROM people WHERE age IS NULL OR city IS NULL").unwrap();
    assert_eq!(column(&result, 0), vec![text("Citra"), text("Dewi")]);
}

#[test]
fn test_order_by_is_stable_and_puts_nulls_first() {
    let db = people();
    let result = db.query("SELECT name, age FROM people ORDER BY age").unwrap();
    assert_eq!(
        column(&result, 0),
        vec![text("Citra"), text("Budi"), text("Eko"), text("Ani"), text("Dewi")]
    );

    let result = db.query("SELECT name FROM people ORDER BY age DESC, name DESC").unwrap();
    assert_eq!(
        column(&result, 0),
        vec![text("Dewi"), text("Ani"), text("Eko"), text("Budi"), text("Citra")]
    );
}

#[test]
fn test_order_by_alias_and_ordinal() {
    let db = people();
    let result = db
        .query("SELECT UPPER(name) AS shout, id FROM people ORDER BY shout DESC LIMIT 2")
        .unwrap();
    assert_eq!(result.columns, vec!["shout".to_string(), "id".to_string()]);
    assert_eq!(column(&result, 0), vec![text("EKO"), text("DEWI")]);

    let result = db.query("SELECT id, name FROM people ORDER BY 2 DESC").unwrap();
    assert_eq!(result.rows[0], vec![Value::Integer(5), text("Eko")]);

    let err = db.query("SELECT id FROM people ORDER BY 3").unwrap_err();
    assert_eq!(err.kind(), "ExecError");
}

#[test]
fn test_limit_and_offset() {
    let db = people();
    let result = db.query("SELECT id FROM people LIMIT 2 OFFSET 1").unwrap();
    assert_eq!(column(&result, 0), vec![Value::Integer(2), Value::Integer(3)]);

    let result = db.query("SELECT id FROM people LIMIT 3, 1").unwrap();
    assert_eq!(column(&result, 0), vec![Value::Integer(4)]);

    // A negative limit means no limit
    assert_eq!(db.query("SELECT id FROM people LIMIT -1").unwrap().len(), 5);
    assert_eq!(db.query("SELECT id FROM people LIMIT 0").unwrap().len(), 0);
    assert!(db.query("SELECT id FROM people LIMIT 'x'").is_err());
}

#[test]
fn test_expressions_and_column_names() {
    let db = people();
    let result = db
        .query("SELECT p.name || '@' || city, age + 1, LENGTH(name), rowid FROM people p WHERE p.id = 1")
        .unwrap();
    assert_eq!(
        result.columns,
        vec![
            "p.name || '@' || city".to_string(),
            "age + 1".to_string(),
            "LENGTH(name)".to_string(),
            "rowid".to_string(),
        ]
    );
    assert_eq!(
        result.rows,
        vec![vec![text("Ani@Bandung"), Value::Integer(32), Value::Integer(3), Value::Integer(1)]]
    );
}

#[test]
fn test_like_in_and_between() {
    let db = people();
    let result = db.query("SELECT name FROM people WHERE name LIKE '%i'").unwrap();
    assert_eq!(column(&result, 0), vec![text("Ani"), text("Budi"), text("Dewi")]);

    let result = db
        .query("SELECT name FROM people WHERE city IN ('Jakarta', 'Surabaya')")
        .unwrap();
    assert_eq!(column(&result, 0), vec![text("Budi"), text("Eko")]);

    let result = db
        .query("SELECT name FROM people WHERE age NOT BETWEEN 18 AND 40")
        .unwrap();
    assert_eq!(column(&result, 0), vec![text("Budi"), text("Dewi"), text("Eko")]);
}

#[test]
fn test_like_with_percent_in_subject() {
    let db = Database::open_in_memory().unwrap();
    let result = db
        .query("SELECT 'a%b' LIKE 'a%', 'a%b' LIKE '%b', 'x%' LIKE '%', '50%' LIKE '5_%'")
        .unwrap();
    assert_eq!(result.rows, vec![vec![Value::Integer(1); 4]]);
}

#[test]
fn test_select_without_from() {
    let db = Database::open_in_memory().unwrap();
    let result = db.query("SELECT 1 + 1 AS two, 'x', NULL IS NULL").unwrap();
    assert_eq!(result.columns[0], "two");
    assert_eq!(
        result.rows,
        vec![vec![Value::Integer(2), text("x"), Value::Integer(1)]]
    );
    assert!(db.query("SELECT *").is_err());
    assert_eq!(db.query("SELECT 1 WHERE 0").unwrap().len(), 0);
}

#[test]
fn test_unknown_names_are_errors() {
    let db = people();
    let err = db.query("SELECT * FROM nowhere").unwrap_err();
    assert!(matches!(err.cause(), DatabaseError::TableNotFound { .. }));
    assert_eq!(err.kind(), "ExecError");

    let err = db.query("SELECT salary FROM people").unwrap_err();
    assert!(matches!(err.cause(), DatabaseError::ColumnNotFound { .. }));

    let err = db.query("SELECT q.name FROM people p").unwrap_err();
    assert!(matches!(err.cause(), DatabaseError::ColumnNotFound { .. }));

    let err = db.query("SELECT NOPE(1)").unwrap_err();
    assert_eq!(err.kind(), "ExecError");
}

#[test]
fn test_access_path_selection() -> Result<(), DatabaseError> {
    let mut pager = Pager::open(&DatabaseConfig::memory())?;
    let mut catalog = Catalog::load(&pager)?;
    let parser = SqlParser::new();
    for sql in [
        "CREATE TABLE items (id INTEGER PRIMARY KEY, sku TEXT UNIQUE, qty INTEGER)",
        "INSERT INTO items VALUES (10, 'a-1', 3), (20, 'b-2', 0), (30, 'c-3', 7)",
    ] {
        Executor::new(&mut pager, &mut catalog).execute(&parser.parse(sql)?)?;
    }

    let table = catalog.get_table("items")?;
    let indexes = catalog.indexes_for("items");
    let condition_of = |sql: &str| match parser.parse(sql) {
        Ok(Statement::Select(plan)) => plan.condition,
        _ => panic!("Expected SELECT"),
    };

    let path = choose_access_path(table, None, &indexes, condition_of("SELECT * FROM items WHERE qty > 1 AND 20 = id").as_ref())?;
    assert_eq!(path, AccessPath::RowIdSeek(20));
    let rows: Vec<_> = ScanIterator::new(TableScanner::new(&pager, table, path)).collect::<Result<_, _>>()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].row_id, Some(20));

    let path = choose_access_path(table, None, &indexes, condition_of("SELECT * FROM items WHERE sku = 'c-3'").as_ref())?;
    assert!(matches!(&path, AccessPath::IndexSeek { value, .. } if *value == text("c-3")));
    let mut scanner = TableScanner::new(&pager, table, path);
    let batch = scanner.scan_batch(10)?;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].values[2], Value::Integer(7));
    scanner.reset()?;
    assert!(scanner.scan()?.is_some());

    let path = choose_access_path(table, None, &indexes, condition_of("SELECT * FROM items WHERE qty = 0").as_ref())?;
    assert_eq!(path, AccessPath::FullScan);

    let result = Executor::new(&mut pager, &mut catalog)
        .execute(&parser.parse("SELECT sku FROM items WHERE sku = 'b-2' AND qty = 0")?)?;
    match result {
        StatementResult::Rows(rows) => assert_eq!(rows.rows, vec![vec![text("b-2")]]),
        other => panic!("Expected rows, got {:?}", other),
    }
    Ok(())
}
