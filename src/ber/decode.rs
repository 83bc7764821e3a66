//! BER decoding.
//!
//! Zero-copy decoding over `Bytes`. Nested decoders remember the absolute
//! offset of their first byte so errors and recorded field positions always
//! refer to the outermost buffer.

use super::length::decode_length;
use super::tag;
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;
use bytes::Bytes;

/// BER decoder that reads from a byte buffer.
pub struct Decoder {
    data: Bytes,
    pos: usize,
    base: usize,
}

impl Decoder {
    /// Create a new decoder from bytes.
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    /// Create a decoder from a byte slice (copies the data).
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    fn child(&self, data: Bytes, start: usize) -> Decoder {
        Decoder {
            data,
            pos: 0,
            base: self.base + start,
        }
    }

    /// Absolute offset of the next unread byte.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Check if we've reached the end.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Peek at the next tag without consuming it.
    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = self
            .peek_tag()
            .ok_or_else(|| Error::decode(self.offset(), DecodeErrorKind::TruncatedData))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Read a tag byte.
    pub fn read_tag(&mut self) -> Result<u8> {
        self.read_byte()
    }

    /// Read a definite length.
    pub fn read_length(&mut self) -> Result<usize> {
        let (len, consumed) = decode_length(&self.data[self.pos..], self.offset())?;
        self.pos += consumed;
        Ok(len)
    }

    /// Read raw bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        if self.pos.saturating_add(len) > self.data.len() {
            return Err(Error::decode(self.offset(), DecodeErrorKind::TruncatedData));
        }
        let bytes = self.data.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(bytes)
    }

    /// Read and expect a specific tag, returning the content length.
    pub fn expect_tag(&mut self, expected: u8) -> Result<usize> {
        let at = self.offset();
        let actual = self.read_tag()?;
        if actual != expected {
            return Err(Error::decode(
                at,
                DecodeErrorKind::UnexpectedTag { expected, actual },
            ));
        }
        self.read_length()
    }

    /// Read a BER INTEGER (signed, 32-bit).
    pub fn read_integer(&mut self) -> Result<i32> {
        let len = self.expect_tag(tag::universal::INTEGER)?;
        self.read_integer_value(len)
    }

    /// Read the content of a signed integer of `len` bytes.
    ///
    /// Five-byte encodings are accepted only with a zero leading byte, which
    /// is dropped; the remaining four bytes are taken as two's complement.
    pub fn read_integer_value(&mut self, len: usize) -> Result<i32> {
        let bytes = self.read_int_content(len)?;
        let seed: i32 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        Ok(bytes
            .iter()
            .fold(seed, |acc, &b| (acc << 8) | b as i32))
    }

    /// Read the content of an unsigned 32-bit integer of `len` bytes.
    ///
    /// Same length rules as [`read_integer_value`](Self::read_integer_value)
    /// but without sign extension.
    pub fn read_unsigned32_value(&mut self, len: usize) -> Result<u32> {
        let bytes = self.read_int_content(len)?;
        Ok(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
    }

    fn read_int_content(&mut self, len: usize) -> Result<Bytes> {
        let at = self.offset();
        if len == 0 {
            return Err(Error::decode(at, DecodeErrorKind::ZeroLengthInteger));
        }
        if len > 5 {
            return Err(Error::decode(at, DecodeErrorKind::IntegerTooLong { length: len }));
        }
        let bytes = self.read_bytes(len)?;
        if len == 5 {
            if bytes[0] != 0 {
                return Err(Error::decode(at, DecodeErrorKind::IntegerTooLong { length: len }));
            }
            return Ok(bytes.slice(1..));
        }
        Ok(bytes)
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<Bytes> {
        let len = self.expect_tag(tag::universal::OCTET_STRING)?;
        self.read_bytes(len)
    }

    /// Read an OCTET STRING whose content is itself BER, returning a decoder
    /// positioned at the start of the content.
    pub fn read_octet_string_decoder(&mut self) -> Result<Decoder> {
        let len = self.expect_tag(tag::universal::OCTET_STRING)?;
        self.sub_decoder(len)
    }

    /// Read a NULL.
    pub fn read_null(&mut self) -> Result<()> {
        let at = self.offset();
        let len = self.expect_tag(tag::universal::NULL)?;
        if len != 0 {
            return Err(Error::decode(at, DecodeErrorKind::InvalidNull));
        }
        Ok(())
    }

    /// Read an OBJECT IDENTIFIER.
    pub fn read_oid(&mut self) -> Result<Oid> {
        let len = self.expect_tag(tag::universal::OBJECT_IDENTIFIER)?;
        self.read_oid_value(len)
    }

    /// Read an OID given a pre-read length.
    pub fn read_oid_value(&mut self, len: usize) -> Result<Oid> {
        let at = self.offset();
        let bytes = self.read_bytes(len)?;
        Oid::from_ber(&bytes).map_err(|_| Error::decode(at, DecodeErrorKind::InvalidOidEncoding))
    }

    /// Read a SEQUENCE, returning a decoder for its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder> {
        self.read_constructed(tag::universal::SEQUENCE)
    }

    /// Read a constructed type with a specific tag, returning a decoder for its contents.
    pub fn read_constructed(&mut self, expected_tag: u8) -> Result<Decoder> {
        let len = self.expect_tag(expected_tag)?;
        self.sub_decoder(len)
    }

    /// Create a sub-decoder over the next `len` bytes.
    pub fn sub_decoder(&mut self, len: usize) -> Result<Decoder> {
        let start = self.pos;
        let content = self.read_bytes(len)?;
        Ok(self.child(content, start))
    }

    /// Skip a TLV without parsing it.
    pub fn skip_tlv(&mut self) -> Result<()> {
        self.read_tag()?;
        let len = self.read_length()?;
        self.read_bytes(len).map(|_| ())
    }

    /// Consume and return everything that is left.
    pub fn read_remaining(&mut self) -> Bytes {
        let rest = self.data.slice(self.pos..);
        self.pos = self.data.len();
        rest
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::decode(self.offset(), DecodeErrorKind::TrailingData))
        }
    }
}
