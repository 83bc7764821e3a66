//! SNMP message wrappers.
//!
//! Messages carry a PDU together with version and security information.
//!
//! - [`CommunityMessage`] - v1/v2c messages with a community string
//! - [`V3Message`] - v3 messages with USM security

mod community;
mod v3;

pub use community::CommunityMessage;
pub use v3::{
    MSG_MAX_SIZE, MsgFlags, MsgGlobalData, SECURITY_MODEL_USM, ScopedPdu, V3Message,
    V3MessageData,
};

use crate::ber::Decoder;
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::Pdu;
use crate::version::Version;
use bytes::Bytes;

/// Decoded SNMP message of any version.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Community(CommunityMessage),
    V3(V3Message),
}

impl Message {
    /// Decode a datagram, dispatching on the version field.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;

        let at = seq.offset();
        let raw = seq.read_integer()?;
        let version = Version::from_i32(raw)
            .ok_or_else(|| Error::decode(at, DecodeErrorKind::UnknownVersion(raw)))?;

        match version {
            Version::V1 | Version::V2c => Ok(Message::Community(
                CommunityMessage::decode_from_sequence(&mut seq, version)?,
            )),
            Version::V3 => Ok(Message::V3(V3Message::decode_from_sequence(&mut seq)?)),
        }
    }

    /// Read just far enough to find the correlation key.
    ///
    /// Works on messages whose PDU body fails to decode, so the failure can
    /// be reported to the request it answers. Encrypted v3 messages yield
    /// their msgID.
    pub fn peek_req_id(data: &Bytes) -> Option<i32> {
        let mut decoder = Decoder::new(data.clone());
        let mut seq = decoder.read_sequence().ok()?;
        match Version::from_i32(seq.read_integer().ok()?)? {
            Version::V1 | Version::V2c => {
                seq.read_octet_string().ok()?;
                seq.read_tag().ok()?;
                let len = seq.read_length().ok()?;
                let mut pdu = seq.sub_decoder(len).ok()?;
                pdu.read_integer().ok()
            }
            Version::V3 => seq.read_sequence().ok()?.read_integer().ok(),
        }
    }

    pub fn version(&self) -> Version {
        match self {
            Message::Community(m) => m.version,
            Message::V3(_) => Version::V3,
        }
    }

    /// Correlation key: the PDU request id for v1/v2c, msgID for v3.
    pub fn req_id(&self) -> Option<i32> {
        match self {
            Message::Community(m) => m.pdu.request_id(),
            Message::V3(m) => Some(m.msg_id()),
        }
    }

    /// The PDU, `None` for a v3 message that is still encrypted.
    pub fn pdu(&self) -> Option<&Pdu> {
        match self {
            Message::Community(m) => Some(&m.pdu),
            Message::V3(m) => m.pdu(),
        }
    }
}
