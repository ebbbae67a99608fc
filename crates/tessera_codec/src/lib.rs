//! # Tessera Codec
//!
//! Record values, keys and deterministic CBOR encoding for Tessera.
//!
//! This crate provides:
//! - [`Value`], the dynamic representation of a record
//! - [`Key`], the ordered primary/index key type
//! - CBOR encoding where identical values produce identical bytes
//!
//! ## Usage
//!
//! ```
//! use tessera_codec::{to_cbor, from_cbor, Value};
//!
//! let value = Value::object([("id", Value::from("1")), ("age", Value::from(30))]);
//! let bytes = to_cbor(&value).unwrap();
//!
//! let decoded = from_cbor(&bytes).unwrap();
//! assert_eq!(value, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod key;
mod value;

pub use decoder::{decode, from_cbor};
pub use encoder::{encode, to_cbor};
pub use error::{CodecError, CodecResult};
pub use key::Key;
pub use value::Value;
