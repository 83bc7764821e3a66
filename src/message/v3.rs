//! SNMPv3 message format (RFC 3412).
//!
//! ```text
//! SEQUENCE {
//!     INTEGER version (3)
//!     SEQUENCE msgGlobalData {
//!         INTEGER msgID
//!         INTEGER msgMaxSize
//!         OCTET STRING msgFlags (1 byte)
//!         INTEGER msgSecurityModel
//!     }
//!     OCTET STRING msgSecurityParameters (BER-encoded USM SEQUENCE)
//!     msgData (ScopedPDU or encrypted OCTET STRING)
//! }
//! ```
//!
//! Outgoing messages are encoded once. When authentication is on, the
//! digest field is written as twelve zero bytes and its exact offset is
//! tracked through both encoding layers, so the HMAC can be computed over
//! the finished buffer and written in place.

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{CryptoErrorKind, DecodeErrorKind, Error, Result};
use crate::pdu::Pdu;
use crate::v3::auth::authenticate_message;
use crate::v3::{LocalizedKeys, PrivKey, SecurityLevel, UsmSecurityParams};

/// msgMaxSize advertised on every request.
pub const MSG_MAX_SIZE: i32 = 65507;
/// User-based Security Model.
pub const SECURITY_MODEL_USM: i32 = 3;

/// Message flags (RFC 3412 Section 6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgFlags {
    pub security_level: SecurityLevel,
    pub reportable: bool,
}

impl MsgFlags {
    pub fn new(security_level: SecurityLevel, reportable: bool) -> Self {
        Self {
            security_level,
            reportable,
        }
    }

    pub fn from_byte(byte: u8, offset: usize) -> Result<Self> {
        let security_level = SecurityLevel::from_flags(byte)
            .ok_or_else(|| Error::decode(offset, DecodeErrorKind::InvalidMsgFlags))?;
        Ok(Self {
            security_level,
            reportable: byte & 0x04 != 0,
        })
    }

    pub fn to_byte(self) -> u8 {
        let mut flags = self.security_level.to_flags();
        if self.reportable {
            flags |= 0x04;
        }
        flags
    }
}

/// Message global data header (msgGlobalData).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgGlobalData {
    /// Correlation key for v3 exchanges.
    pub msg_id: i32,
    pub msg_max_size: i32,
    pub msg_flags: MsgFlags,
    pub msg_security_model: i32,
}

impl MsgGlobalData {
    /// Header of a request: USM, reportable, default max size.
    pub fn request(msg_id: i32, security_level: SecurityLevel) -> Self {
        Self {
            msg_id,
            msg_max_size: MSG_MAX_SIZE,
            msg_flags: MsgFlags::new(security_level, true),
            msg_security_model: SECURITY_MODEL_USM,
        }
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            buf.push_integer(self.msg_security_model);
            buf.push_octet_string(&[self.msg_flags.to_byte()]);
            buf.push_integer(self.msg_max_size);
            buf.push_integer(self.msg_id);
        });
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;

        let msg_id = seq.read_integer()?;
        let msg_max_size = seq.read_integer()?;

        let at = seq.offset();
        let flags = seq.read_octet_string()?;
        if flags.len() != 1 {
            return Err(Error::decode(at, DecodeErrorKind::InvalidMsgFlags));
        }
        let msg_flags = MsgFlags::from_byte(flags[0], at)?;

        let at = seq.offset();
        let msg_security_model = seq.read_integer()?;
        if msg_security_model != SECURITY_MODEL_USM {
            return Err(Error::decode(
                at,
                DecodeErrorKind::UnknownSecurityModel(msg_security_model),
            ));
        }

        Ok(Self {
            msg_id,
            msg_max_size,
            msg_flags,
            msg_security_model,
        })
    }
}

/// Scoped PDU (contextEngineID + contextName + PDU).
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedPdu {
    pub context_engine_id: Bytes,
    pub context_name: Bytes,
    pub pdu: Pdu,
}

impl ScopedPdu {
    /// Scoped PDU with an empty context name.
    pub fn new(context_engine_id: impl Into<Bytes>, pdu: Pdu) -> Self {
        Self {
            context_engine_id: context_engine_id.into(),
            context_name: Bytes::new(),
            pdu,
        }
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.context_name);
            buf.push_octet_string(&self.context_engine_id);
        });
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let context_engine_id = seq.read_octet_string()?;
        let context_name = seq.read_octet_string()?;
        let pdu = Pdu::decode(&mut seq)?;
        Ok(Self {
            context_engine_id,
            context_name,
            pdu,
        })
    }
}

/// Message data payload.
#[derive(Debug, Clone, PartialEq)]
pub enum V3MessageData {
    Plaintext(ScopedPdu),
    /// Ciphertext of a ScopedPdu.
    Encrypted(Bytes),
}

/// SNMPv3 message.
#[derive(Debug, Clone, PartialEq)]
pub struct V3Message {
    pub global_data: MsgGlobalData,
    pub security_params: UsmSecurityParams,
    pub data: V3MessageData,
    /// Offset of msgAuthenticationParameters content in the datagram this
    /// message was decoded from. Zero for locally built messages.
    pub auth_offset: usize,
}

impl V3Message {
    pub fn new(
        global_data: MsgGlobalData,
        security_params: UsmSecurityParams,
        scoped_pdu: ScopedPdu,
    ) -> Self {
        Self {
            global_data,
            security_params,
            data: V3MessageData::Plaintext(scoped_pdu),
            auth_offset: 0,
        }
    }

    /// Engine discovery probe: noAuthNoPriv, reportable, empty user and an
    /// empty GetRequest.
    pub fn discovery(msg_id: i32) -> Self {
        Self::new(
            MsgGlobalData::request(msg_id, SecurityLevel::NoAuthNoPriv),
            UsmSecurityParams::empty(),
            ScopedPdu::new(
                Bytes::new(),
                Pdu::Get {
                    request_id: msg_id,
                    varbinds: Vec::new(),
                },
            ),
        )
    }

    pub fn msg_id(&self) -> i32 {
        self.global_data.msg_id
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.global_data.msg_flags.security_level
    }

    /// Plaintext PDU, `None` while still encrypted.
    pub fn pdu(&self) -> Option<&Pdu> {
        match &self.data {
            V3MessageData::Plaintext(scoped) => Some(&scoped.pdu),
            V3MessageData::Encrypted(_) => None,
        }
    }

    pub fn into_pdu(self) -> Option<Pdu> {
        match self.data {
            V3MessageData::Plaintext(scoped) => Some(scoped.pdu),
            V3MessageData::Encrypted(_) => None,
        }
    }

    /// Encode as is, returning the bytes and the offset of the
    /// authentication parameters content when that field is non-empty.
    pub fn encode(&self) -> (Vec<u8>, Option<usize>) {
        let mut buf = EncodeBuf::new();
        let mut auth_mark = None;

        buf.push_sequence(|buf| {
            match &self.data {
                V3MessageData::Plaintext(scoped) => scoped.encode(buf),
                V3MessageData::Encrypted(ciphertext) => buf.push_octet_string(ciphertext),
            }

            // The security parameters are a separately encoded SEQUENCE
            // wrapped in an OCTET STRING.
            let mut params_buf = EncodeBuf::new();
            let inner_mark = self.security_params.encode_to_buf(&mut params_buf);
            let params = params_buf.finish();

            let outer = buf.mark();
            buf.push_bytes(&params);
            auth_mark = inner_mark.map(|m| m.nested_in(outer));
            buf.push_length(params.len());
            buf.push_tag(tag::universal::OCTET_STRING);

            self.global_data.encode(buf);
            buf.push_integer(3);
        });

        let mut bytes = buf.finish_vec();
        let total = bytes.len();
        bytes.shrink_to_fit();
        (bytes, auth_mark.map(|m| m.offset_in(total)))
    }

    /// Apply the outgoing USM transforms and encode.
    ///
    /// With privacy the scoped PDU is encrypted under a fresh salt, which is
    /// written straight into msgPrivacyParameters. With authentication a
    /// zero placeholder is encoded and then overwritten with the digest.
    pub fn encode_secured(mut self, keys: Option<&LocalizedKeys>) -> Result<Bytes> {
        let level = self.security_level();

        if level.requires_priv() {
            let priv_key = keys
                .and_then(|k| k.privacy.as_ref())
                .ok_or_else(|| Error::encrypt(None, CryptoErrorKind::NoPrivKey))?;
            self.encrypt_data(priv_key)?;
        }

        let auth_key = if level.requires_auth() {
            let key = keys.and_then(|k| k.auth.as_ref()).ok_or_else(|| {
                Error::auth(None, crate::error::AuthErrorKind::NoCredentials)
            })?;
            self.security_params = self
                .security_params
                .with_auth_placeholder(key.protocol().mac_len());
            Some(key)
        } else {
            None
        };

        let (mut bytes, auth_offset) = self.encode();
        if let Some(key) = auth_key {
            let offset = auth_offset.ok_or_else(|| {
                Error::auth(None, crate::error::AuthErrorKind::AuthParamsNotFound)
            })?;
            authenticate_message(key, &mut bytes, offset)?;
        }
        Ok(Bytes::from(bytes))
    }

    fn encrypt_data(&mut self, key: &PrivKey) -> Result<()> {
        if let V3MessageData::Plaintext(scoped) = &self.data {
            let mut buf = EncodeBuf::new();
            scoped.encode(&mut buf);
            let plaintext = buf.finish();

            let salt = PrivKey::new_salt()?;
            let ciphertext = key.encrypt(&plaintext, &salt)?;
            self.security_params.priv_params = Bytes::copy_from_slice(&salt);
            self.data = V3MessageData::Encrypted(Bytes::from(ciphertext));
        }
        Ok(())
    }

    /// Replace encrypted data with the decrypted scoped PDU.
    pub fn decrypt(&mut self, key: &PrivKey) -> Result<()> {
        if let V3MessageData::Encrypted(ciphertext) = &self.data {
            let plaintext = key.decrypt(ciphertext, &self.security_params.priv_params)?;
            // Trailing padding after the SEQUENCE is ignored.
            let scoped = ScopedPdu::decode(&mut Decoder::new(Bytes::from(plaintext)))?;
            self.data = V3MessageData::Plaintext(scoped);
        }
        Ok(())
    }

    /// Decode the rest of a message whose version has already been read.
    pub(crate) fn decode_from_sequence(seq: &mut Decoder) -> Result<Self> {
        let global_data = MsgGlobalData::decode(seq)?;

        let mut params = seq.read_octet_string_decoder()?;
        let (security_params, auth_offset) = UsmSecurityParams::decode_from(&mut params)?;

        let at = seq.offset();
        let data = match (global_data.msg_flags.security_level.requires_priv(), seq.peek_tag()) {
            (true, Some(tag::universal::OCTET_STRING)) => {
                V3MessageData::Encrypted(seq.read_octet_string()?)
            }
            (true, _) => return Err(Error::decode(at, DecodeErrorKind::ExpectedEncryption)),
            (false, Some(tag::universal::OCTET_STRING)) => {
                return Err(Error::decode(at, DecodeErrorKind::UnexpectedEncryption));
            }
            (false, _) => V3MessageData::Plaintext(ScopedPdu::decode(seq)?),
        };

        Ok(Self {
            global_data,
            security_params,
            data,
            auth_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::oid;
    use crate::v3::auth::verify_message;
    use crate::v3::{AuthProtocol, PrivProtocol, UsmKeys, UsmUser};
    use crate::varbind::VarBind;

    const ENGINE: &[u8] = &[0x80, 0x00, 0x1F, 0x88, 0x80, 0x01, 0x02, 0x03, 0x04];

    fn request(level: SecurityLevel) -> V3Message {
        V3Message::new(
            MsgGlobalData::request(4711, level),
            UsmSecurityParams::new(Bytes::from_static(ENGINE), 5, 300, Bytes::from_static(b"ops")),
            ScopedPdu::new(
                Bytes::from_static(ENGINE),
                Pdu::Get {
                    request_id: 99,
                    varbinds: vec![VarBind::null(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0))],
                },
            ),
        )
    }

    fn decode_v3(bytes: Bytes) -> V3Message {
        match Message::decode(bytes).unwrap() {
            Message::V3(msg) => msg,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn discovery_probe_shape() {
        let bytes = V3Message::discovery(17).encode_secured(None).unwrap();
        let msg = decode_v3(bytes);
        assert_eq!(msg.msg_id(), 17);
        assert_eq!(msg.global_data.msg_flags.to_byte(), 0x04);
        assert_eq!(msg.global_data.msg_max_size, 65507);
        assert!(msg.security_params.engine_id.is_empty());
        assert!(msg.security_params.username.is_empty());
        assert!(msg.pdu().unwrap().varbinds().is_empty());
    }

    #[test]
    fn auth_offset_matches_on_both_sides() {
        let keys = UsmKeys::derive(&UsmUser::auth("ops", AuthProtocol::Md5, "maplesyrup"))
            .unwrap()
            .localize(ENGINE);

        let mut msg = request(SecurityLevel::AuthNoPriv);
        msg.security_params = msg
            .security_params
            .with_auth_placeholder(AuthProtocol::Md5.mac_len());
        let (plain, offset) = msg.encode();
        let offset = offset.unwrap();
        assert_eq!(&plain[offset - 2..offset + 12], &[0x04, 0x0C, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(plain[offset - 1] as usize, AuthProtocol::Md5.mac_len());

        let bytes = request(SecurityLevel::AuthNoPriv)
            .encode_secured(Some(&keys))
            .unwrap();
        let decoded = decode_v3(bytes.clone());
        assert_eq!(decoded.auth_offset, offset);
        verify_message(keys.auth.as_ref().unwrap(), &bytes, decoded.auth_offset).unwrap();

        let mut tampered = bytes.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        assert!(verify_message(keys.auth.as_ref().unwrap(), &tampered, offset).is_err());
    }

    #[test]
    fn privacy_roundtrip() {
        let user = UsmUser::auth_priv(
            "ops",
            AuthProtocol::Sha1,
            "authpass1",
            PrivProtocol::Des,
            "privpass1",
        );
        let keys = UsmKeys::derive(&user).unwrap().localize(ENGINE);

        let bytes = request(SecurityLevel::AuthPriv)
            .encode_secured(Some(&keys))
            .unwrap();
        let mut decoded = decode_v3(bytes.clone());
        assert!(decoded.pdu().is_none());
        assert_eq!(decoded.security_params.priv_params.len(), 8);
        verify_message(keys.auth.as_ref().unwrap(), &bytes, decoded.auth_offset).unwrap();

        decoded.decrypt(keys.privacy.as_ref().unwrap()).unwrap();
        assert_eq!(decoded.pdu(), request(SecurityLevel::AuthPriv).pdu());
    }

    #[test]
    fn missing_keys_fail_before_encoding() {
        assert!(matches!(
            request(SecurityLevel::AuthPriv).encode_secured(None),
            Err(Error::EncryptionFailed {
                kind: CryptoErrorKind::NoPrivKey,
                ..
            })
        ));
        assert!(matches!(
            request(SecurityLevel::AuthNoPriv).encode_secured(None),
            Err(Error::AuthenticationFailed { .. })
        ));
    }

    #[test]
    fn plaintext_where_encryption_expected() {
        let mut msg = request(SecurityLevel::NoAuthNoPriv);
        msg.global_data.msg_flags = MsgFlags::new(SecurityLevel::AuthPriv, false);
        msg.security_params = msg
            .security_params
            .with_auth_placeholder(AuthProtocol::Md5.mac_len());
        let (bytes, _) = msg.encode();
        let err = Message::decode(Bytes::from(bytes)).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode {
                kind: DecodeErrorKind::ExpectedEncryption,
                ..
            }
        ));
    }
}
