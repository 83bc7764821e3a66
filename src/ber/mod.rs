//! Minimal BER (X.690) reader and writer for SNMP.
//!
//! Only the definite-length, single-byte-tag subset that SNMP uses is
//! supported.

mod decode;
mod encode;
mod length;
pub mod tag;

pub use decode::Decoder;
pub use encode::{EncodeBuf, Mark};
pub use length::{MAX_LENGTH, decode_length, encode_length, length_encoded_len};
