//! BER definite-length encoding (X.690 8.1.3).
//!
//! Short form for lengths up to 127, long form with up to four length
//! octets otherwise. The indefinite form is never produced and is rejected
//! on input.

use crate::error::{DecodeErrorKind, Error, Result};

/// Largest content length accepted when decoding.
///
/// A UDP datagram can never carry more than 64 KiB, so anything larger than
/// this is a corrupt length field.
pub const MAX_LENGTH: usize = 0x20_0000;

/// Number of octets needed to encode `len`.
pub fn length_encoded_len(len: usize) -> usize {
    match len {
        0..=0x7F => 1,
        0x80..=0xFF => 2,
        0x100..=0xFFFF => 3,
        0x1_0000..=0xFF_FFFF => 4,
        _ => 5,
    }
}

/// Encode `len` into `out`, returning the number of octets written.
///
/// Octets are written in wire order.
pub fn encode_length(len: usize, out: &mut [u8; 5]) -> usize {
    let n = length_encoded_len(len);
    if n == 1 {
        out[0] = len as u8;
        return 1;
    }
    let value_octets = n - 1;
    out[0] = 0x80 | value_octets as u8;
    for i in 0..value_octets {
        out[n - 1 - i] = (len >> (8 * i)) as u8;
    }
    n
}

/// Decode a length prefix at the start of `data`.
///
/// Returns `(length, octets consumed)`. `base_offset` is the absolute offset
/// of `data[0]` and is only used for error reporting.
pub fn decode_length(data: &[u8], base_offset: usize) -> Result<(usize, usize)> {
    let Some(&first) = data.first() else {
        return Err(Error::decode(base_offset, DecodeErrorKind::TruncatedData));
    };

    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let octets = (first & 0x7F) as usize;
    match octets {
        0 => return Err(Error::decode(base_offset, DecodeErrorKind::IndefiniteLength)),
        1..=4 => {}
        _ => {
            return Err(Error::decode(
                base_offset,
                DecodeErrorKind::LengthTooLong { octets },
            ));
        }
    }

    let Some(bytes) = data.get(1..1 + octets) else {
        return Err(Error::decode(base_offset, DecodeErrorKind::TruncatedData));
    };
    let len = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);

    if len > MAX_LENGTH {
        return Err(Error::decode(
            base_offset,
            DecodeErrorKind::LengthExceedsMax {
                length: len,
                max: MAX_LENGTH,
            },
        ));
    }

    Ok((len, 1 + octets))
}
