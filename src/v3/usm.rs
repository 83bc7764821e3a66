//! User-based Security Model (USM) parameters (RFC 3414).
//!
//! USM security parameters are encoded as an OCTET STRING containing
//! a BER-encoded SEQUENCE:
//!
//! ```text
//! UsmSecurityParameters ::= SEQUENCE {
//!     msgAuthoritativeEngineID     OCTET STRING,
//!     msgAuthoritativeEngineBoots  INTEGER (0..2147483647),
//!     msgAuthoritativeEngineTime   INTEGER (0..2147483647),
//!     msgUserName                  OCTET STRING (SIZE(0..32)),
//!     msgAuthenticationParameters  OCTET STRING,
//!     msgPrivacyParameters         OCTET STRING
//! }
//! ```

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf, Mark, tag};
use crate::error::Result;

/// USM security parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsmSecurityParams {
    pub engine_id: Bytes,
    pub engine_boots: i32,
    pub engine_time: i32,
    pub username: Bytes,
    /// HMAC-96 digest, or empty.
    pub auth_params: Bytes,
    /// DES salt, or empty.
    pub priv_params: Bytes,
}

impl UsmSecurityParams {
    pub fn new(
        engine_id: impl Into<Bytes>,
        engine_boots: i32,
        engine_time: i32,
        username: impl Into<Bytes>,
    ) -> Self {
        Self {
            engine_id: engine_id.into(),
            engine_boots,
            engine_time,
            username: username.into(),
            ..Self::default()
        }
    }

    /// Parameters of a discovery probe: every field empty or zero.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fill the authentication field with a zero placeholder of `len` bytes.
    pub fn with_auth_placeholder(mut self, len: usize) -> Self {
        self.auth_params = Bytes::from(vec![0u8; len]);
        self
    }

    pub fn with_priv_params(mut self, priv_params: impl Into<Bytes>) -> Self {
        self.priv_params = priv_params.into();
        self
    }

    /// Encode the SEQUENCE into `buf`.
    ///
    /// Returns the position of the authentication parameters content when
    /// that field is non-empty.
    pub fn encode_to_buf(&self, buf: &mut EncodeBuf) -> Option<Mark> {
        let mut auth_mark = None;
        buf.push_sequence(|buf| {
            buf.push_octet_string(&self.priv_params);

            buf.push_bytes(&self.auth_params);
            if !self.auth_params.is_empty() {
                auth_mark = Some(buf.mark());
            }
            buf.push_length(self.auth_params.len());
            buf.push_tag(tag::universal::OCTET_STRING);

            buf.push_octet_string(&self.username);
            buf.push_integer(self.engine_time);
            buf.push_integer(self.engine_boots);
            buf.push_octet_string(&self.engine_id);
        });
        auth_mark
    }

    /// Decode the SEQUENCE.
    ///
    /// Also returns the absolute offset of the authentication parameters
    /// content, measured in the decoder's outermost buffer.
    pub fn decode_from(decoder: &mut Decoder) -> Result<(Self, usize)> {
        let mut seq = decoder.read_sequence()?;

        let engine_id = seq.read_octet_string()?;
        let engine_boots = seq.read_integer()?;
        let engine_time = seq.read_integer()?;
        let username = seq.read_octet_string()?;

        let len = seq.expect_tag(tag::universal::OCTET_STRING)?;
        let auth_offset = seq.offset();
        let auth_params = seq.read_bytes(len)?;

        let priv_params = seq.read_octet_string()?;

        Ok((
            Self {
                engine_id,
                engine_boots,
                engine_time,
                username,
                auth_params,
                priv_params,
            },
            auth_offset,
        ))
    }
}
