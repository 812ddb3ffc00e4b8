use lumbung::{Database, StatementResult, Value, types::error::DatabaseError};

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn ids(db: &Database, sql: &str) -> Vec<Value> {
    db.query(sql).unwrap().rows.into_iter().map(|row| row[0].clone()).collect()
}

fn accounts() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.execute_script(
        "CREATE TABLE accounts (
            id INTEGER PRIMARY KEY,
            email TEXT UNIQUE,
            balance REAL NOT NULL DEFAULT 0,
            tier TEXT DEFAULT 'basic'
         );
         INSERT INTO accounts (id, email) VALUES (1, 'a@x.id'), (2, 'b@x.id'), (3, 'c@x.id');",
    )
    .unwrap();
    db
}

#[test]
fn test_duplicate_rowid_leaves_table_unchanged() {
    let db = Database::open_in_memory().unwrap();
    db.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)").unwrap();
    db.execute("INSERT INTO t VALUES (1,'x')").unwrap();

    let err = db.execute("INSERT INTO t VALUES (1,'y')").unwrap_err();
    assert!(matches!(err.cause(), DatabaseError::DuplicateKey { .. }));

    let result = db.query("SELECT * FROM t").unwrap();
    assert_eq!(result.rows, vec![vec![Value::Integer(1), text("x")]]);
}

#[test]
fn test_insert_applies_defaults_and_reports_count() {
    let db = accounts();
    let result = db.query("SELECT balance, tier FROM accounts WHERE id = 2").unwrap();
    assert_eq!(result.rows, vec![vec![Value::Real(0.0), text("basic")]]);

    let inserted = db
        .execute("INSERT INTO accounts (email, balance) VALUES ('d@x.id', 10), ('e@x.id', 2.5)")
        .unwrap();
    assert_eq!(inserted, StatementResult::Affected(2));
    // New rowids continue after the largest one
    assert_eq!(
        ids(&db, "SELECT id FROM accounts WHERE email LIKE 'd%' OR email LIKE 'e%'"),
        vec![Value::Integer(4), Value::Integer(5)]
    );
}

#[test]
fn test_insert_constraint_errors() {
    let db = accounts();

    let err = db.execute("INSERT INTO accounts (id, balance) VALUES (9, NULL)").unwrap_err();
    assert_eq!(err.kind(), "ExecError");

    let err = db.execute("INSERT INTO accounts (id, email) VALUES (9, 42)").unwrap_err();
    assert_eq!(err.kind(), "SchemaMismatch");

    let err = db.execute("INSERT INTO accounts VALUES (9, 'z@x.id')").unwrap_err();
    assert_eq!(err.kind(), "SchemaMismatch");

    let err = db.execute("INSERT INTO accounts (id, id) VALUES (9, 10)").unwrap_err();
    assert_eq!(err.kind(), "ExecError");

    let err = db.execute("INSERT INTO accounts (nope) VALUES (1)").unwrap_err();
    assert!(matches!(err.cause(), DatabaseError::ColumnNotFound { .. }));

    assert_eq!(db.query("SELECT * FROM accounts").unwrap().len(), 3);
}

#[test]
fn test_unique_column_rejects_duplicates_but_allows_nulls() {
    let db = accounts();
    let err = db
        .execute("INSERT INTO accounts (email) VALUES ('new@x.id'), ('b@x.id')")
        .unwrap_err();
    assert!(matches!(err.cause(), DatabaseError::DuplicateKey { key, .. } if key == "b@x.id"));
    // The whole statement is discarded, including the first row
    assert_eq!(db.query("SELECT * FROM accounts").unwrap().len(), 3);

    db.execute("INSERT INTO accounts (email) VALUES (NULL), (NULL)").unwrap();
    assert_eq!(db.query("SELECT * FROM accounts WHERE email IS NULL").unwrap().len(), 2);
}

#[test]
fn test_null_rowid_alias_gets_generated_id() {
    let db = accounts();
    db.execute("INSERT INTO accounts (id, email) VALUES (NULL, 'n@x.id')").unwrap();
    assert_eq!(
        ids(&db, "SELECT id FROM accounts WHERE email = 'n@x.id'"),
        vec![Value::Integer(4)]
    );
    db.execute("INSERT INTO accounts (rowid, email) VALUES (100, 'r@x.id')").unwrap();
    assert_eq!(
        ids(&db, "SELECT id FROM accounts WHERE email = 'r@x.id'"),
        vec![Value::Integer(100)]
    );
}

#[test]
fn test_update_and_delete_counts() {
    let db = accounts();
    let updated = db
        .execute("UPDATE accounts SET balance = balance + 5, tier = 'gold' WHERE id >= 2")
        .unwrap();
    assert_eq!(updated.affected(), Some(2));
    let result = db.query("SELECT id, balance, tier FROM accounts ORDER BY id").unwrap();
    assert_eq!(
        result.rows,
        vec![
            vec![Value::Integer(1), Value::Real(0.0), text("basic")],
            vec![Value::Integer(2), Value::Real(5.0), text("gold")],
            vec![Value::Integer(3), Value::Real(5.0), text("gold")],
        ]
    );

    assert_eq!(db.execute("UPDATE accounts SET tier = 'x' WHERE 0").unwrap().affected(), Some(0));
    assert_eq!(db.execute("DELETE FROM accounts WHERE tier = 'gold'").unwrap().affected(), Some(2));
    assert_eq!(db.execute("DELETE FROM accounts").unwrap().affected(), Some(1));
    assert!(db.query("SELECT * FROM accounts").unwrap().is_empty());
}

#[test]
fn test_update_is_all_or_nothing() {
    let db = accounts();
    // Row 3 collides with the address row 2 was just given
    let err = db
        .execute("UPDATE accounts SET email = 'same@x.id' WHERE id > 1")
        .unwrap_err();
    assert!(matches!(err.cause(), DatabaseError::DuplicateKey { .. }));
    assert_eq!(
        ids(&db, "SELECT email FROM accounts ORDER BY id"),
        vec![text("a@x.id"), text("b@x.id"), text("c@x.id")]
    );

    let err = db.execute("UPDATE accounts SET balance = NULL").unwrap_err();
    assert_eq!(err.kind(), "ExecError");
    assert_eq!(
        ids(&db, "SELECT balance FROM accounts"),
        vec![Value::Real(0.0), Value::Real(0.0), Value::Real(0.0)]
    );
}

#[test]
fn test_update_can_swap_unique_values() {
    let db = accounts();
    db.execute("UPDATE accounts SET id = id + 1").unwrap();
    assert_eq!(
        ids(&db, "SELECT id FROM accounts"),
        vec![Value::Integer(2), Value::Integer(3), Value::Integer(4)]
    );
    assert_eq!(
        ids(&db, "SELECT email FROM accounts WHERE rowid = 4"),
        vec![text("c@x.id")]
    );

    let err = db.execute("UPDATE accounts SET tier = 'a', tier = 'b'").unwrap_err();
    assert_eq!(err.kind(), "ExecError");
}

#[test]
fn test_index_lifecycle() {
    let db = accounts();
    db.execute("INSERT INTO accounts (email, tier) VALUES ('d@x.id', 'basic')").unwrap();

    let err = db.execute("CREATE UNIQUE INDEX by_tier ON accounts (tier)").unwrap_err();
    assert!(matches!(err.cause(), DatabaseError::DuplicateKey { .. }));

    db.execute("CREATE INDEX by_tier ON accounts (tier)").unwrap();
    assert_eq!(
        db.execute("CREATE INDEX IF NOT EXISTS by_tier ON accounts (tier)").unwrap(),
        StatementResult::Affected(0)
    );
    assert!(db.execute("CREATE INDEX by_tier ON accounts (email)").is_err());
    assert_eq!(db.query("SELECT id FROM accounts WHERE tier = 'basic'").unwrap().len(), 4);

    let err = db.execute("DROP INDEX lumbung_autoindex_accounts_1").unwrap_err();
    assert_eq!(err.kind(), "ExecError");

    db.execute("DROP INDEX by_tier").unwrap();
    assert!(db.execute("DROP INDEX by_tier").is_err());
    db.execute("DROP INDEX IF EXISTS by_tier").unwrap();
}

#[test]
fn test_table_lifecycle() {
    let db = accounts();
    let err = db.execute("CREATE TABLE accounts (id INTEGER)").unwrap_err();
    assert_eq!(err.kind(), "ExecError");
    db.execute("CREATE TABLE IF NOT EXISTS accounts (id INTEGER)").unwrap();
    assert_eq!(db.query("SELECT * FROM accounts").unwrap().columns.len(), 4);

    db.execute("DROP TABLE accounts").unwrap();
    assert_eq!(db.table_names().unwrap(), Vec::<String>::new());
    let err = db.execute("DROP TABLE accounts").unwrap_err();
    assert!(matches!(err.cause(), DatabaseError::TableNotFound { .. }));
    db.execute("DROP TABLE IF EXISTS accounts").unwrap();

    // The unique index went away with the table
    db.execute("CREATE TABLE accounts (email TEXT UNIQUE)").unwrap();
    db.execute("INSERT INTO accounts VALUES ('a@x.id')").unwrap();
}
