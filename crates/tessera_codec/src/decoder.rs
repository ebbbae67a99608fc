//! CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::de::DeserializeOwned;

/// Decode a record value from CBOR bytes.
///
/// # Errors
///
/// Returns `DecodingFailed` if the bytes are not valid CBOR or use a
/// construct with no `Value` counterpart (byte strings, non-text map keys).
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    decode(bytes)
}

/// Decode any deserializable type from CBOR bytes.
///
/// # Errors
///
/// Returns `DecodingFailed` if the bytes do not decode to `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}
