//! # Tessera Codec
//!
//! CBOR encoding and decoding of the dynamic [`Value`] type that documents
//! are made of.
//!
//! Encoding is deterministic:
//! - integers and lengths use the shortest form
//! - floats are written as 64-bit doubles
//! - map pairs keep the order in which they were built
//! - no indefinite-length items
//!
//! The decoder accepts any definite-length CBOR with these types, including
//! half and single precision floats, and enforces size limits on untrusted
//! input.
//!
//! ## Usage
//!
//! ```
//! use tessera_codec::{to_cbor, from_cbor, Value};
//!
//! let value = Value::Map(vec![
//!     (Value::from("name"), Value::from("Ada")),
//!     (Value::from("born"), Value::Integer(1815)),
//! ]);
//! let bytes = to_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, Decoder};
pub use encoder::{to_cbor, Encoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Types that can be encoded to CBOR.
pub trait Encode {
    /// Encode this value to CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}
