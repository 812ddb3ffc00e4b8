use std::cmp::Ordering;

use lumbung::types::{
    record::{compare_records, decode_values, encode, encode_values, encoded_size},
    row::Row,
    value::Value,
};
use proptest::prelude::*;

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>()
            .prop_filter("NaN never equals itself", |f| !f.is_nan())
            .prop_map(Value::Real),
        ".{0,40}".prop_map(Value::Text),
        proptest::collection::vec(any::<u8>(), 0..64).prop_map(Value::Blob),
    ]
}

proptest! {
    #[test]
    fn test_record_round_trip(values in proptest::collection::vec(value_strategy(), 0..16)) {
        let bytes = encode_values(&values);
        prop_assert_eq!(bytes.len(), encoded_size(&values));
        prop_assert_eq!(decode_values(&bytes).unwrap(), values);
    }

    #[test]
    fn test_integer_ordering_matches_record_ordering(a in any::<i64>(), b in any::<i64>()) {
        let left = encode_values(&[Value::Integer(a)]);
        let right = encode_values(&[Value::Integer(b)]);
        prop_assert_eq!(compare_records(&left, &right).unwrap(), a.cmp(&b));
    }
}

#[test]
fn test_small_integers_use_small_encodings() {
    let small = encode_values(&[Value::Integer(7)]);
    let large = encode_values(&[Value::Integer(1 << 40)]);
    assert!(small.len() < large.len());
}

#[test]
fn test_row_encoding_ignores_rowid() {
    let values = vec![Value::Integer(1), Value::Text("a".to_string())];
    let with_id = Row::with_row_id(99, values.clone());
    assert_eq!(encode(&with_id), encode_values(&values));
}

#[test]
fn test_prefix_sorts_first() {
    let prefix = encode_values(&[Value::Text("k".to_string())]);
    let full = encode_values(&[Value::Text("k".to_string()), Value::Integer(1)]);
    assert_eq!(compare_records(&prefix, &full).unwrap(), Ordering::Less);
    assert_eq!(compare_records(&full, &prefix).unwrap(), Ordering::Greater);
}

#[test]
fn test_truncated_record_is_rejected() {
    let bytes = encode_values(&[Value::Text("truncate me".to_string())]);
    assert!(decode_values(&bytes[..bytes.len() - 3]).is_err());
    assert!(decode_values(&[]).is_err());
}
