//! Record codec: typed row values to page-resident bytes and back.
//!
//! ```text
//! value_count(u16 LE) | tag(1) data | tag(1) data | ...
//! ```
//!
//! Integers take the smallest of 1/2/4/8 bytes that holds them, reals are
//! 8 bytes of IEEE-754 bits, text and blob carry a u32 length prefix. The
//! encoding of a row is a pure function of its values.

use std::cmp::Ordering;

use crate::{
    storage::schema::TableSchema,
    types::{error::DatabaseError, row::Row, value::Value},
};

const TAG_NULL: u8 = 0;
const TAG_INT8: u8 = 1;
const TAG_INT16: u8 = 2;
const TAG_INT32: u8 = 3;
const TAG_INT64: u8 = 4;
const TAG_REAL: u8 = 5;
const TAG_TEXT: u8 = 6;
const TAG_BLOB: u8 = 7;

/// Encode the values of a row. The rowid is the b-tree key and is not part
/// of the record.
pub fn encode(row: &Row) -> Vec<u8> {
    encode_values(&row.values)
}

pub fn encode_values(values: &[Value]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(encoded_size(values));
    buffer.extend_from_slice(&(values.len() as u16).to_le_bytes());
    for value in values {
        encode_value(value, &mut buffer);
    }
    buffer
}

pub fn encoded_size(values: &[Value]) -> usize {
    2 + values.iter().map(value_size).sum::<usize>()
}

fn value_size(value: &Value) -> usize {
    match value {
        Value::Null => 1,
        Value::Integer(i) => 1 + integer_width(*i),
        Value::Real(_) => 9,
        Value::Text(s) => 5 + s.len(),
        Value::Blob(b) => 5 + b.len(),
    }
}

fn integer_width(i: i64) -> usize {
    if i8::try_from(i).is_ok() {
        1
    } else if i16::try_from(i).is_ok() {
        2
    } else if i32::try_from(i).is_ok() {
        4
    } else {
        8
    }
}

fn encode_value(value: &Value, buffer: &mut Vec<u8>) {
    match value {
        Value::Null => buffer.push(TAG_NULL),
        Value::Integer(i) => match integer_width(*i) {
            1 => {
                buffer.push(TAG_INT8);
                buffer.extend_from_slice(&(*i as i8).to_le_bytes());
            }
            2 => {
                buffer.push(TAG_INT16);
                buffer.extend_from_slice(&(*i as i16).to_le_bytes());
            }
            4 => {
                buffer.push(TAG_INT32);
                buffer.extend_from_slice(&(*i as i32).to_le_bytes());
            }
            _ => {
                buffer.push(TAG_INT64);
                buffer.extend_from_slice(&i.to_le_bytes());
            }
        },
        Value::Real(r) => {
            buffer.push(TAG_REAL);
            buffer.extend_from_slice(&r.to_bits().to_le_bytes());
        }
        Value::Text(s) => {
            buffer.push(TAG_TEXT);
            buffer.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buffer.extend_from_slice(s.as_bytes());
        }
        Value::Blob(b) => {
            buffer.push(TAG_BLOB);
            buffer.extend_from_slice(&(b.len() as u32).to_le_bytes());
            buffer.extend_from_slice(b);
        }
    }
}

/// Decode a record and check it against the table schema.
pub fn decode(bytes: &[u8], schema: &TableSchema) -> Result<Row, DatabaseError> {
    let values = decode_values(bytes)?;
    if values.len() != schema.columns.len() {
        return Err(DatabaseError::schema_mismatch(format!(
            "record has {} values but table '{}' has {} columns",
            values.len(),
            schema.table_name,
            schema.columns.len()
        )));
    }
    for (value, column) in values.iter().zip(&schema.columns) {
        if !value.is_compatible_with_type(&column.data_type) {
            return Err(DatabaseError::schema_mismatch(format!(
                "stored {} value does not fit column '{}' of type {}",
                value.type_name(),
                column.name,
                column.data_type
            )));
        }
    }
    Ok(Row::new(values))
}

pub fn decode_values(bytes: &[u8]) -> Result<Vec<Value>, DatabaseError> {
    let mut reader = RecordReader::new(bytes);
    let count = u16::from_le_bytes(reader.array::<2>()?) as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(reader.value()?);
    }
    if !reader.is_exhausted() {
        return Err(DatabaseError::SerializationError {
            details: format!("{} trailing bytes after record", bytes.len() - reader.offset),
        });
    }
    Ok(values)
}

/// Order two encoded records value by value. A record that is a prefix of
/// the other sorts first.
pub fn compare_records(a: &[u8], b: &[u8]) -> Result<Ordering, DatabaseError> {
    let left = decode_values(a)?;
    let right = decode_values(b)?;
    Ok(compare_value_lists(&left, &right))
}

pub fn compare_value_lists(left: &[Value], right: &[Value]) -> Ordering {
    for (l, r) in left.iter().zip(right) {
        match l.compare(r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    left.len().cmp(&right.len())
}

struct RecordReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> RecordReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn is_exhausted(&self) -> bool {
        self.offset == self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DatabaseError> {
        if self.offset + len > self.bytes.len() {
            return Err(DatabaseError::SerializationError {
                details: format!(
                    "record truncated: need {} bytes at offset {}, have {}",
                    len,
                    self.offset,
                    self.bytes.len()
                ),
            });
        }
        let bytes: &'a [u8] = self.bytes;
        let slice = &bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DatabaseError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn value(&mut self) -> Result<Value, DatabaseError> {
        let tag = self.array::<1>()?[0];
        let value = match tag {
            TAG_NULL => Value::Null,
            TAG_INT8 => Value::Integer(i8::from_le_bytes(self.array()?) as i64),
            TAG_INT16 => Value::Integer(i16::from_le_bytes(self.array()?) as i64),
            TAG_INT32 => Value::Integer(i32::from_le_bytes(self.array()?) as i64),
            TAG_INT64 => Value::Integer(i64::from_le_bytes(self.array()?)),
            TAG_REAL => Value::Real(f64::from_bits(u64::from_le_bytes(self.array()?))),
            TAG_TEXT => {
                let len = u32::from_le_bytes(self.array()?) as usize;
                let bytes = self.take(len)?;
                let text = std::str::from_utf8(bytes).map_err(|e| DatabaseError::SerializationError {
                    details: format!("invalid UTF-8 in text value: {}", e),
                })?;
                Value::Text(text.to_string())
            }
            TAG_BLOB => {
                let len = u32::from_le_bytes(self.array()?) as usize;
                Value::Blob(self.take(len)?.to_vec())
            }
            other => {
                return Err(DatabaseError::SerializationError {
                    details: format!("Unknown type discriminant: {}", other),
                });
            }
        };
        Ok(value)
    }
}
