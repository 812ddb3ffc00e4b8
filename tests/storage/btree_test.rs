use std::collections::BTreeMap;

use lumbung::{
    config::DatabaseConfig,
    storage::{
        btree::BTree,
        node::{TreeKind, decode_rowid, encode_rowid, max_index_key},
        pager::Pager,
    },
    types::{
        error::DatabaseError,
        record::{decode_values, encode_values},
        value::Value,
    },
};
use proptest::prelude::*;

fn small_pager() -> Pager {
    let config = DatabaseConfig::builder().memory().page_size(512).build();
    Pager::open(&config).unwrap()
}

fn row_value(i: i64) -> Vec<u8> {
    encode_values(&[Value::Integer(i), Value::Text(format!("row-{i}"))])
}

/// 0..n visited in a scattered but deterministic order
fn scattered(n: i64) -> impl Iterator<Item = i64> {
    (0..n).map(move |i| (i * 7919) % n)
}

fn scanned_keys(tree: &BTree, pager: &Pager) -> Vec<i64> {
    tree.scan(pager)
        .unwrap()
        .map(|entry| decode_rowid(&entry.unwrap().0).unwrap())
        .collect()
}

#[test]
fn test_insert_and_get() -> Result<(), DatabaseError> {
    let mut pager = small_pager();
    let mut tree = BTree::create(&mut pager, "t", TreeKind::Table)?;
    tree.insert(&mut pager, &encode_rowid(5), &row_value(5))?;
    tree.insert(&mut pager, &encode_rowid(-5), &row_value(-5))?;

    assert_eq!(tree.get(&pager, &encode_rowid(5))?, Some(row_value(5)));
    assert_eq!(tree.get(&pager, &encode_rowid(-5))?, Some(row_value(-5)));
    assert_eq!(tree.get(&pager, &encode_rowid(6))?, None);
    assert_eq!(scanned_keys(&tree, &pager), vec![-5, 5]);
    Ok(())
}

#[test]
fn test_duplicate_key_is_rejected() -> Result<(), DatabaseError> {
    let mut pager = small_pager();
    let mut tree = BTree::create(&mut pager, "people", TreeKind::Table)?;
    tree.insert(&mut pager, &encode_rowid(1), &row_value(1))?;
    match tree.insert(&mut pager, &encode_rowid(1), &row_value(2)) {
        Err(DatabaseError::DuplicateKey { tree, key }) => {
            assert_eq!(tree, "people");
            assert_eq!(key, "1");
        }
        other => panic!("Expected DuplicateKey, got {:?}", other),
    }
    assert_eq!(tree.get(&pager, &encode_rowid(1))?, Some(row_value(1)));
    Ok(())
}

#[test]
fn test_splits_keep_keys_ordered() -> Result<(), DatabaseError> {
    let mut pager = small_pager();
    let mut tree = BTree::create(&mut pager, "t", TreeKind::Table)?;
    for i in scattered(1000) {
        tree.insert(&mut pager, &encode_rowid(i), &row_value(i))?;
    }

    let stats = tree.check(&pager)?;
    assert_eq!(stats.entries, 1000);
    assert!(stats.depth >= 3);
    assert!(stats.leaf_pages > 2);
    assert_eq!(scanned_keys(&tree, &pager), (0..1000).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_delete_merges_back_to_single_leaf() -> Result<(), DatabaseError> {
    let mut pager = small_pager();
    let mut tree = BTree::create(&mut pager, "t", TreeKind::Table)?;
    for i in 0..500 {
        tree.insert(&mut pager, &encode_rowid(i), &row_value(i))?;
    }
    for i in scattered(500).filter(|i| i % 2 == 0) {
        assert!(tree.delete(&mut pager, &encode_rowid(i))?);
    }
    assert!(!tree.delete(&mut pager, &encode_rowid(0))?);
    assert_eq!(
        scanned_keys(&tree, &pager),
        (0..500).filter(|i| i % 2 == 1).collect::<Vec<_>>()
    );
    tree.check(&pager)?;

    for i in (0..500).filter(|i| i % 2 == 1) {
        tree.delete(&mut pager, &encode_rowid(i))?;
    }
    let stats = tree.check(&pager)?;
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.depth, 1);
    assert!(!pager.free_pages()?.is_empty());
    Ok(())
}

#[test]
fn test_large_values_spill_to_overflow_pages() -> Result<(), DatabaseError> {
    let mut pager = small_pager();
    let mut tree = BTree::create(&mut pager, "t", TreeKind::Table)?;
    let big = encode_values(&[Value::Blob((0..5000).map(|i| (i % 251) as u8).collect())]);
    tree.insert(&mut pager, &encode_rowid(1), &big)?;
    tree.insert(&mut pager, &encode_rowid(2), &row_value(2))?;

    assert_eq!(tree.get(&pager, &encode_rowid(1))?, Some(big.clone()));
    let stats = tree.check(&pager)?;
    assert!(stats.overflow_pages >= 10);

    let free_before = pager.free_pages()?.len();
    tree.delete(&mut pager, &encode_rowid(1))?;
    assert!(pager.free_pages()?.len() >= free_before + 10);
    assert_eq!(tree.check(&pager)?.overflow_pages, 0);
    Ok(())
}

#[test]
fn test_index_tree_seek() -> Result<(), DatabaseError> {
    let mut pager = small_pager();
    let mut tree = BTree::create(&mut pager, "idx", TreeKind::Index)?;
    for (row_id, name) in [(1, "carol"), (2, "alice"), (3, "bob"), (4, "alice")] {
        let key = encode_values(&[Value::Text(name.to_string()), Value::Integer(row_id)]);
        tree.insert(&mut pager, &key, &[])?;
    }

    let prefix = encode_values(&[Value::Text("alice".to_string())]);
    let hits: Vec<Vec<Value>> = tree
        .seek(&pager, &prefix)?
        .map(|entry| decode_values(&entry.unwrap().0).unwrap())
        .take_while(|values| values[0] == Value::Text("alice".to_string()))
        .collect();
    assert_eq!(
        hits,
        vec![
            vec![Value::Text("alice".to_string()), Value::Integer(2)],
            vec![Value::Text("alice".to_string()), Value::Integer(4)],
        ]
    );
    Ok(())
}

#[test]
fn test_index_rejects_values_and_oversized_keys() -> Result<(), DatabaseError> {
    let mut pager = small_pager();
    let mut tree = BTree::create(&mut pager, "idx", TreeKind::Index)?;
    let key = encode_values(&[Value::Integer(1)]);
    assert!(tree.insert(&mut pager, &key, b"value").is_err());

    let huge = encode_values(&[Value::Text("x".repeat(400))]);
    assert!(matches!(
        tree.insert(&mut pager, &huge, &[]),
        Err(DatabaseError::ExecError { .. })
    ));
    Ok(())
}

#[test]
fn test_drop_tree_frees_every_page() -> Result<(), DatabaseError> {
    let mut pager = small_pager();
    let mut tree = BTree::create(&mut pager, "t", TreeKind::Table)?;
    for i in 0..300 {
        tree.insert(&mut pager, &encode_rowid(i), &row_value(i))?;
    }
    let stats = tree.check(&pager)?;
    let pages = stats.leaf_pages + stats.interior_pages + stats.overflow_pages;

    tree.drop_tree(&mut pager)?;
    pager.commit()?;
    assert_eq!(pager.free_pages()?.len() as u64, pages);

    // New trees draw from the free list before growing the file
    let page_count = pager.page_count();
    let mut again = BTree::create(&mut pager, "t2", TreeKind::Table)?;
    for i in 0..100 {
        again.insert(&mut pager, &encode_rowid(i), &row_value(i))?;
    }
    assert_eq!(pager.page_count(), page_count);
    Ok(())
}

#[derive(Debug, Clone)]
enum Op {
    Insert(i64, usize),
    Delete(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0i64..400, 0usize..300).prop_map(|(k, len)| Op::Insert(k, len)),
        2 => (0i64..400).prop_map(Op::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_tree_matches_ordered_map(ops in proptest::collection::vec(op_strategy(), 1..400)) {
        let mut pager = small_pager();
        let mut tree = BTree::create(&mut pager, "model", TreeKind::Table).unwrap();
        let mut model = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(key, len) => {
                    let value = vec![(key % 256) as u8; len];
                    let result = tree.insert(&mut pager, &encode_rowid(key), &value);
                    if model.contains_key(&key) {
                        let is_duplicate = matches!(result, Err(DatabaseError::DuplicateKey { .. }));
                        prop_assert!(is_duplicate);
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(key, value);
                    }
                }
                Op::Delete(key) => {
                    let removed = tree.delete(&mut pager, &encode_rowid(key)).unwrap();
                    prop_assert_eq!(removed, model.remove(&key).is_some());
                }
            }
        }

        let stats = tree.check(&pager).unwrap();
        prop_assert_eq!(stats.entries, model.len() as u64);
        let entries: Vec<(i64, Vec<u8>)> = tree
            .scan(&pager)
            .unwrap()
            .map(|entry| {
                let (key, value) = entry.unwrap();
                (decode_rowid(&key).unwrap(), value)
            })
            .collect();
        let expected: Vec<(i64, Vec<u8>)> = model.into_iter().collect();
        prop_assert_eq!(entries, expected);
    }
}

#[derive(Debug, Clone)]
enum IndexOp {
    Insert(String, i64),
    Delete(String, i64),
}

/// Text keys with shared prefixes and lengths up to the index key limit,
/// drawn from a space small enough that deletes often hit.
fn index_key_strategy() -> impl Strategy<Value = (String, i64)> {
    ("[ab]{0,4}", 0usize..3, 0i64..4).prop_map(|(head, pad, row_id)| {
        let text = format!("{head}{}", "z".repeat([0, 40, 85][pad]));
        (text, row_id)
    })
}

fn index_op_strategy() -> impl Strategy<Value = IndexOp> {
    prop_oneof![
        3 => index_key_strategy().prop_map(|(text, id)| IndexOp::Insert(text, id)),
        2 => index_key_strategy().prop_map(|(text, id)| IndexOp::Delete(text, id)),
    ]
}

fn index_key(text: &str, row_id: i64) -> Vec<u8> {
    encode_values(&[Value::Text(text.to_string()), Value::Integer(row_id)])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_index_tree_matches_ordered_set(ops in proptest::collection::vec(index_op_strategy(), 1..600)) {
        let mut pager = small_pager();
        let mut tree = BTree::create(&mut pager, "model_idx", TreeKind::Index).unwrap();
        let mut model = std::collections::BTreeSet::new();

        for op in ops {
            match op {
                IndexOp::Insert(text, row_id) => {
                    let key = index_key(&text, row_id);
                    prop_assert!(key.len() <= max_index_key(512));
                    let result = tree.insert(&mut pager, &key, &[]);
                    if model.contains(&(text.clone(), row_id)) {
                        let is_duplicate = matches!(result, Err(DatabaseError::DuplicateKey { .. }));
                        prop_assert!(is_duplicate);
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert((text, row_id));
                    }
                }
                IndexOp::Delete(text, row_id) => {
                    let removed = tree.delete(&mut pager, &index_key(&text, row_id)).unwrap();
                    prop_assert_eq!(removed, model.remove(&(text, row_id)));
                }
            }
        }

        let stats = tree.check(&pager).unwrap();
        prop_assert_eq!(stats.entries, model.len() as u64);
        let entries: Vec<(String, i64)> = tree
            .scan(&pager)
            .unwrap()
            .map(|entry| match decode_values(&entry.unwrap().0).unwrap().as_slice() {
                [Value::Text(text), Value::Integer(row_id)] => (text.clone(), *row_id),
                other => panic!("unexpected index key {:?}", other),
            })
            .collect();
        let expected: Vec<(String, i64)> = model.into_iter().collect();
        prop_assert_eq!(&entries, &expected);

        // Emptying the tree collapses it back to a single leaf
        for (text, row_id) in &expected {
            prop_assert!(tree.delete(&mut pager, &index_key(text, *row_id)).unwrap());
        }
        prop_assert_eq!(tree.check(&pager).unwrap().depth, 1);
    }
}
