//! SNMP value types and the varbind value codec.
//!
//! [`ObjectType`] names the wire type, [`Value`] carries the typed payload.
//! Exception markers (noSuchObject, noSuchInstance, endOfMibView) are values
//! without payload that flag a single varbind as failed.

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;
use bytes::Bytes;
use std::fmt;
use std::net::Ipv4Addr;

/// Wire type of a varbind value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectType {
    Boolean = 0x01,
    /// Also Integer32.
    Integer = 0x02,
    OctetString = 0x04,
    Null = 0x05,
    Oid = 0x06,
    IpAddress = 0x40,
    /// Counter32.
    Counter = 0x41,
    /// Gauge32, also Unsigned32.
    Gauge = 0x42,
    TimeTicks = 0x43,
    Opaque = 0x44,
    Counter64 = 0x46,
    NoSuchObject = 0x80,
    NoSuchInstance = 0x81,
    EndOfMibView = 0x82,
}

impl ObjectType {
    /// Look up a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0x01 => Self::Boolean,
            0x02 => Self::Integer,
            0x04 => Self::OctetString,
            0x05 => Self::Null,
            0x06 => Self::Oid,
            0x40 => Self::IpAddress,
            0x41 => Self::Counter,
            0x42 => Self::Gauge,
            0x43 => Self::TimeTicks,
            0x44 => Self::Opaque,
            0x46 => Self::Counter64,
            0x80 => Self::NoSuchObject,
            0x81 => Self::NoSuchInstance,
            0x82 => Self::EndOfMibView,
            _ => return None,
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// The three per-varbind exception markers.
    pub fn is_exception(self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "Boolean",
            Self::Integer => "Integer",
            Self::OctetString => "OctetString",
            Self::Null => "Null",
            Self::Oid => "OID",
            Self::IpAddress => "IpAddress",
            Self::Counter => "Counter",
            Self::Gauge => "Gauge",
            Self::TimeTicks => "TimeTicks",
            Self::Opaque => "Opaque",
            Self::Counter64 => "Counter64",
            Self::NoSuchObject => "NoSuchObject",
            Self::NoSuchInstance => "NoSuchInstance",
            Self::EndOfMibView => "EndOfMibView",
        };
        f.write_str(name)
    }
}

/// SNMP value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    /// INTEGER (signed 32-bit)
    Integer(i32),
    OctetString(Bytes),
    Null,
    ObjectIdentifier(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    /// Hundredths of a second.
    TimeTicks(u32),
    Opaque(Bytes),
    /// Counter64 content octets, unsigned big-endian.
    ///
    /// Kept as raw bytes so values never lose precision; use
    /// [`Value::as_u64`] to read it as a number.
    Counter64(Bytes),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Value {
    /// Wire type of this value.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Value::Boolean(_) => ObjectType::Boolean,
            Value::Integer(_) => ObjectType::Integer,
            Value::OctetString(_) => ObjectType::OctetString,
            Value::Null => ObjectType::Null,
            Value::ObjectIdentifier(_) => ObjectType::Oid,
            Value::IpAddress(_) => ObjectType::IpAddress,
            Value::Counter32(_) => ObjectType::Counter,
            Value::Gauge32(_) => ObjectType::Gauge,
            Value::TimeTicks(_) => ObjectType::TimeTicks,
            Value::Opaque(_) => ObjectType::Opaque,
            Value::Counter64(_) => ObjectType::Counter64,
            Value::NoSuchObject => ObjectType::NoSuchObject,
            Value::NoSuchInstance => ObjectType::NoSuchInstance,
            Value::EndOfMibView => ObjectType::EndOfMibView,
        }
    }

    /// Check if this is an exception value.
    pub fn is_exception(&self) -> bool {
        self.object_type().is_exception()
    }

    /// Build an IpAddress from dotted-decimal text.
    ///
    /// ```
    /// use snmp_session::Value;
    ///
    /// assert_eq!(Value::ip_address("10.0.0.1").unwrap(), Value::IpAddress([10, 0, 0, 1]));
    /// assert!(Value::ip_address("10.0.1").is_err());
    /// ```
    pub fn ip_address(dotted: &str) -> Result<Self> {
        dotted
            .parse::<Ipv4Addr>()
            .map(|addr| Value::IpAddress(addr.octets()))
            .map_err(|_| Error::invalid_request(format!("Invalid IP address '{}'", dotted)))
    }

    /// Build a Counter64 from a native integer.
    pub fn counter64(v: u64) -> Self {
        let bytes = v.to_be_bytes();
        let skip = bytes.iter().take(7).take_while(|&&b| b == 0).count();
        let mut content = Vec::with_capacity(9);
        if bytes[skip] & 0x80 != 0 {
            content.push(0);
        }
        content.extend_from_slice(&bytes[skip..]);
        Value::Counter64(Bytes::from(content))
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Counter32, Gauge32, TimeTicks or a non-negative Integer.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Some(*v),
            Value::Integer(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Numeric value of a Counter64 that fits in 64 bits, or any 32-bit unsigned.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Counter64(raw) => {
                let digits = match raw.first() {
                    Some(0) if raw.len() > 1 => &raw[1..],
                    _ => &raw[..],
                };
                if digits.len() > 8 {
                    return None;
                }
                Some(digits.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
            }
            other => other.as_u32().map(u64::from),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::OctetString(v) | Value::Opaque(v) => Some(v),
            _ => None,
        }
    }

    /// OctetString or Opaque content as UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_oid(&self) -> Option<&Oid> {
        match self {
            Value::ObjectIdentifier(oid) => Some(oid),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<Ipv4Addr> {
        match self {
            Value::IpAddress(octets) => Some(Ipv4Addr::from(*octets)),
            _ => None,
        }
    }

    /// Append exactly one TLV for this value.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        match self {
            Value::Boolean(v) => buf.push_boolean(*v),
            Value::Integer(v) => buf.push_integer(*v),
            Value::OctetString(data) => buf.push_octet_string(data),
            Value::Null => buf.push_null(),
            Value::ObjectIdentifier(oid) => buf.push_oid(oid),
            Value::IpAddress(addr) => buf.push_ip_address(*addr),
            Value::Counter32(v) => buf.push_unsigned32(tag::application::COUNTER32, *v),
            Value::Gauge32(v) => buf.push_unsigned32(tag::application::GAUGE32, *v),
            Value::TimeTicks(v) => buf.push_unsigned32(tag::application::TIMETICKS, *v),
            Value::Opaque(data) => buf.push_tlv(tag::application::OPAQUE, data),
            Value::Counter64(data) => buf.push_tlv(tag::application::COUNTER64, data),
            Value::NoSuchObject => buf.push_tlv(tag::context::NO_SUCH_OBJECT, &[]),
            Value::NoSuchInstance => buf.push_tlv(tag::context::NO_SUCH_INSTANCE, &[]),
            Value::EndOfMibView => buf.push_tlv(tag::context::END_OF_MIB_VIEW, &[]),
        }
    }

    /// Decode one value TLV, inferring the type from the wire tag.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let at = decoder.offset();
        let tag = decoder.read_tag()?;
        let len = decoder.read_length()?;

        let Some(object_type) = ObjectType::from_tag(tag) else {
            return Err(Error::decode(at, DecodeErrorKind::UnknownValueType(tag)));
        };

        let value = match object_type {
            ObjectType::Boolean => {
                if len != 1 {
                    return Err(Error::decode(at, DecodeErrorKind::InvalidBoolean));
                }
                Value::Boolean(decoder.read_byte()? != 0)
            }
            ObjectType::Integer => Value::Integer(decoder.read_integer_value(len)?),
            ObjectType::OctetString => Value::OctetString(decoder.read_bytes(len)?),
            ObjectType::Null => {
                if len != 0 {
                    return Err(Error::decode(at, DecodeErrorKind::InvalidNull));
                }
                Value::Null
            }
            ObjectType::Oid => Value::ObjectIdentifier(decoder.read_oid_value(len)?),
            ObjectType::IpAddress => {
                if len != 4 {
                    return Err(Error::decode(
                        at,
                        DecodeErrorKind::InvalidIpAddressLength { length: len },
                    ));
                }
                let data = decoder.read_bytes(4)?;
                Value::IpAddress([data[0], data[1], data[2], data[3]])
            }
            ObjectType::Counter => Value::Counter32(decoder.read_unsigned32_value(len)?),
            ObjectType::Gauge => Value::Gauge32(decoder.read_unsigned32_value(len)?),
            ObjectType::TimeTicks => Value::TimeTicks(decoder.read_unsigned32_value(len)?),
            ObjectType::Opaque => Value::Opaque(decoder.read_bytes(len)?),
            ObjectType::Counter64 => Value::Counter64(decoder.read_bytes(len)?),
            // Exceptions are NULL-shaped; tolerate stray content.
            ObjectType::NoSuchObject => {
                decoder.read_bytes(len)?;
                Value::NoSuchObject
            }
            ObjectType::NoSuchInstance => {
                decoder.read_bytes(len)?;
                Value::NoSuchInstance
            }
            ObjectType::EndOfMibView => {
                decoder.read_bytes(len)?;
                Value::EndOfMibView
            }
        };
        Ok(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::OctetString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "{}", s),
                Err(_) => write!(f, "0x{}", crate::util::encode_hex(data)),
            },
            Value::Null => write!(f, "NULL"),
            Value::ObjectIdentifier(oid) => write!(f, "{}", oid),
            Value::IpAddress(a) => write!(f, "{}.{}.{}.{}", a[0], a[1], a[2], a[3]),
            Value::Counter32(v) | Value::Gauge32(v) => write!(f, "{}", v),
            Value::TimeTicks(v) => {
                let secs = v / 100;
                write!(
                    f,
                    "{}d {:02}:{:02}:{:02}.{:02}",
                    secs / 86400,
                    (secs / 3600) % 24,
                    (secs / 60) % 60,
                    secs % 60,
                    v % 100
                )
            }
            Value::Opaque(data) => write!(f, "Opaque(0x{})", crate::util::encode_hex(data)),
            Value::Counter64(_) => match self.as_u64() {
                Some(v) => write!(f, "{}", v),
                None => write!(f, "Counter64(0x{})", crate::util::encode_hex(self.as_raw())),
            },
            Value::NoSuchObject => write!(f, "noSuchObject"),
            Value::NoSuchInstance => write!(f, "noSuchInstance"),
            Value::EndOfMibView => write!(f, "endOfMibView"),
        }
    }
}

impl Value {
    fn as_raw(&self) -> &[u8] {
        match self {
            Value::Counter64(b) | Value::OctetString(b) | Value::Opaque(b) => b,
            _ => &[],
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::OctetString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::OctetString(Bytes::from(s))
    }
}

impl From<Bytes> for Value {
    fn from(data: Bytes) -> Self {
        Value::OctetString(data)
    }
}

impl From<Oid> for Value {
    fn from(oid: Oid) -> Self {
        Value::ObjectIdentifier(oid)
    }
}

impl From<Ipv4Addr> for Value {
    fn from(addr: Ipv4Addr) -> Self {
        Value::IpAddress(addr.octets())
    }
}
