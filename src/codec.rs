//! Value serialization boundary. The cache never inspects value internals;
//! anything serde can move to and from bytes is cacheable.

use crate::errors::CacheError;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encode a value into its on-disk byte representation.
///
/// # Errors
/// Returns an error if the value cannot be serialized.
pub fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>, CacheError> {
    Ok(bincode::serde::encode_to_vec(value, bincode::config::standard())?)
}

/// Decode a value from its on-disk byte representation.
///
/// # Errors
/// Returns an error if the bytes are truncated or incompatible with `V`.
pub fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, CacheError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}
