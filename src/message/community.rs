//! Community-based SNMP message format (v1/v2c).
//!
//! `SEQUENCE { version INTEGER, community OCTET STRING, pdu PDU }`
//!
//! The only difference between v1 and v2c is the version number.

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::Pdu;
use crate::version::Version;
use bytes::Bytes;

/// Community-based SNMP message (v1/v2c).
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityMessage {
    pub version: Version,
    pub community: Bytes,
    pub pdu: Pdu,
}

impl CommunityMessage {
    pub fn new(version: Version, community: impl Into<Bytes>, pdu: Pdu) -> Self {
        Self {
            version,
            community: community.into(),
            pdu,
        }
    }

    /// Encode to BER.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.community);
            buf.push_integer(self.version.as_i32());
        });
        buf.finish()
    }

    /// Decode the rest of a message whose version has already been read.
    pub(crate) fn decode_from_sequence(seq: &mut Decoder, version: Version) -> Result<Self> {
        if !version.is_community() {
            return Err(Error::decode(
                seq.offset(),
                DecodeErrorKind::UnknownVersion(version.as_i32()),
            ));
        }
        let community = seq.read_octet_string()?;
        let pdu = Pdu::decode(seq)?;
        Ok(Self {
            version,
            community,
            pdu,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::oid;
    use crate::varbind::VarBind;

    #[test]
    fn v1_get_bytes() {
        let msg = CommunityMessage::new(
            Version::V1,
            Bytes::from_static(b"public"),
            Pdu::Get {
                request_id: 1,
                varbinds: vec![VarBind::null(oid!(1, 3, 6, 1))],
            },
        );
        let bytes = msg.encode();
        assert_eq!(&bytes[..5], &[0x30, 0x21, 0x02, 0x01, 0x00]);
        assert_eq!(&bytes[5..13], b"\x04\x06public");
        assert_eq!(bytes[13], 0xA0);

        match Message::decode(bytes).unwrap() {
            Message::Community(decoded) => assert_eq!(decoded, msg),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn v2c_keeps_version_and_community() {
        let msg = CommunityMessage::new(
            Version::V2c,
            Bytes::from_static(b"private"),
            Pdu::GetNext {
                request_id: 123,
                varbinds: vec![VarBind::null(oid!(1, 3, 6, 1, 2, 1))],
            },
        );
        match Message::decode(msg.encode()).unwrap() {
            Message::Community(decoded) => {
                assert_eq!(decoded.version, Version::V2c);
                assert_eq!(&decoded.community[..], b"private");
                assert_eq!(decoded.pdu.request_id(), Some(123));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
