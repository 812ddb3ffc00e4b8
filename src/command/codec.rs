use serde::{Serialize, de::DeserializeOwned};

use crate::{
    command::{Request, Response},
    types::error::DatabaseError,
};

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, DatabaseError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(|e| {
        DatabaseError::SerializationError {
            details: e.to_string(),
        }
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DatabaseError> {
    let (value, read) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| DatabaseError::SerializationError {
            details: e.to_string(),
        })?;
    if read != bytes.len() {
        return Err(DatabaseError::SerializationError {
            details: format!("{} trailing bytes after message", bytes.len() - read),
        });
    }
    Ok(value)
}

pub fn encode_request(request: &Request) -> Result<Vec<u8>, DatabaseError> {
    encode(request)
}

pub fn decode_request(bytes: &[u8]) -> Result<Request, DatabaseError> {
    decode(bytes)
}

/// Read just the id at the front of an encoded request.
pub fn peek_request_id(bytes: &[u8]) -> Option<u64> {
    bincode::serde::decode_from_slice::<u64, _>(bytes, bincode::config::standard())
        .ok()
        .map(|(id, _)| id)
}

pub fn encode_response(response: &Response) -> Result<Vec<u8>, DatabaseError> {
    encode(response)
}

pub fn decode_response(bytes: &[u8]) -> Result<Response, DatabaseError> {
    decode(bytes)
}
