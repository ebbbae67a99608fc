//! Deterministic CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::Serialize;

/// Encode a record value to CBOR bytes.
///
/// Object keys are already sorted by `Value`, so equal values always
/// produce identical bytes.
///
/// # Errors
///
/// Returns `NaNForbidden` if the value contains a NaN, or
/// `EncodingFailed` if serialization fails.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    if value.contains_nan() {
        return Err(CodecError::NaNForbidden);
    }
    encode(value)
}

/// Encode any serializable type to CBOR bytes.
///
/// # Errors
///
/// Returns `EncodingFailed` if serialization fails.
pub fn encode<T: Serialize + ?Sized>(item: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(item, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}
