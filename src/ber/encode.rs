//! BER encoding.
//!
//! [`EncodeBuf`] builds a message back to front: every `push_*` call
//! prepends a complete TLV, so a constructed value is written by pushing its
//! children in reverse order and then prepending its own tag and length.
//! This avoids a second pass to patch lengths.
//!
//! Because bytes are only ever prepended, the distance from a field to the
//! end of the buffer never changes after the field is written. [`Mark`]
//! records that distance so a caller can find the field again in the
//! finished message without searching for its content.

use super::length::encode_length;
use super::tag;
use crate::oid::Oid;
use bytes::Bytes;

/// Position of a field, measured from the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

impl Mark {
    /// A mark `extra` bytes further from the end, used when a separately
    /// encoded block is embedded in an outer buffer.
    pub fn nested_in(self, outer: Mark) -> Mark {
        Mark(self.0 + outer.0)
    }

    /// Absolute offset of the field within a finished buffer of `total` bytes.
    pub fn offset_in(self, total: usize) -> usize {
        total - self.0
    }
}

/// Reverse-order BER encode buffer.
#[derive(Default)]
pub struct EncodeBuf {
    // Stored back to front; reversed by `finish`.
    rev: Vec<u8>,
}

impl EncodeBuf {
    pub fn new() -> Self {
        Self {
            rev: Vec::with_capacity(256),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.rev.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rev.is_empty()
    }

    /// Record the start of whatever was pushed last.
    pub fn mark(&self) -> Mark {
        Mark(self.rev.len())
    }

    /// Prepend raw bytes.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.rev.extend(data.iter().rev());
    }

    pub fn push_byte(&mut self, byte: u8) {
        self.rev.push(byte);
    }

    pub fn push_tag(&mut self, tag: u8) {
        self.rev.push(tag);
    }

    pub fn push_length(&mut self, len: usize) {
        let mut out = [0u8; 5];
        let n = encode_length(len, &mut out);
        self.push_bytes(&out[..n]);
    }

    /// Prepend a primitive TLV.
    pub fn push_tlv(&mut self, tag: u8, content: &[u8]) {
        self.push_bytes(content);
        self.push_length(content.len());
        self.push_tag(tag);
    }

    /// Prepend a constructed TLV whose content is produced by `f`.
    pub fn push_constructed<F>(&mut self, tag: u8, f: F)
    where
        F: FnOnce(&mut Self),
    {
        let before = self.rev.len();
        f(self);
        let content_len = self.rev.len() - before;
        self.push_length(content_len);
        self.push_tag(tag);
    }

    pub fn push_sequence<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self),
    {
        self.push_constructed(tag::universal::SEQUENCE, f)
    }

    /// Prepend a minimally encoded two's complement INTEGER.
    pub fn push_integer(&mut self, value: i32) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < 3 {
            let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        self.push_tlv(tag::universal::INTEGER, &bytes[start..]);
    }

    /// Prepend an unsigned 32-bit value as a fixed four-byte big-endian TLV.
    pub fn push_unsigned32(&mut self, tag: u8, value: u32) {
        self.push_tlv(tag, &value.to_be_bytes());
    }

    pub fn push_octet_string(&mut self, data: &[u8]) {
        self.push_tlv(tag::universal::OCTET_STRING, data);
    }

    pub fn push_null(&mut self) {
        self.push_tlv(tag::universal::NULL, &[]);
    }

    pub fn push_boolean(&mut self, value: bool) {
        self.push_tlv(tag::universal::BOOLEAN, &[if value { 0xFF } else { 0x00 }]);
    }

    pub fn push_oid(&mut self, oid: &Oid) {
        self.push_tlv(tag::universal::OBJECT_IDENTIFIER, &oid.to_ber());
    }

    pub fn push_ip_address(&mut self, addr: [u8; 4]) {
        self.push_tlv(tag::application::IP_ADDRESS, &addr);
    }

    /// Finish and return the encoded bytes in wire order.
    pub fn finish(mut self) -> Bytes {
        self.rev.reverse();
        Bytes::from(self.rev)
    }

    /// Finish into a mutable vector, for callers that patch fields in place.
    pub fn finish_vec(mut self) -> Vec<u8> {
        self.rev.reverse();
        self.rev
    }
}
