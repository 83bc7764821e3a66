//! Variable binding (VarBind) type.
//!
//! A VarBind pairs an OID with a value.

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{EncodeErrorKind, Error, Result};
use crate::oid::Oid;
use crate::value::Value;

/// Variable binding - an OID-value pair.
#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: Value,
}

impl VarBind {
    pub fn new(oid: Oid, value: impl Into<Value>) -> Self {
        Self {
            oid,
            value: value.into(),
        }
    }

    /// Create a VarBind with a NULL value (for read requests).
    pub fn null(oid: Oid) -> Self {
        Self {
            oid,
            value: Value::Null,
        }
    }

    /// `true` if the value is an exception marker.
    pub fn is_error(&self) -> bool {
        is_varbind_error(self)
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            self.value.encode(buf);
            buf.push_oid(&self.oid);
        });
    }

    /// Decode from BER.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let oid = seq.read_oid()?;
        let value = Value::decode(&mut seq)?;
        Ok(VarBind { oid, value })
    }
}

impl std::fmt::Display for VarBind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.oid, self.value)
    }
}

/// `true` iff the varbind carries noSuchObject, noSuchInstance or
/// endOfMibView.
pub fn is_varbind_error(vb: &VarBind) -> bool {
    vb.value.is_exception()
}

/// Describe an exception varbind, e.g. `"NoSuchObject: 1.3.6.1.2.1.1.99.0"`.
///
/// Returns `None` for ordinary values.
pub fn varbind_error(vb: &VarBind) -> Option<Error> {
    let kind = vb.value.object_type();
    kind.is_exception().then(|| Error::VarbindException {
        oid: vb.oid.clone(),
        kind,
    })
}

/// Reject values that only an agent may send.
///
/// Requests carrying exception markers are refused before anything is
/// encoded.
pub fn check_request_values(varbinds: &[VarBind]) -> Result<()> {
    match varbinds.iter().find(|vb| vb.value.is_exception()) {
        Some(vb) => Err(Error::encode(EncodeErrorKind::UnknownType(
            vb.value.object_type(),
        ))),
        None => Ok(()),
    }
}

/// Encodes a list of VarBinds as a SEQUENCE of SEQUENCE elements.
pub fn encode_varbind_list(buf: &mut EncodeBuf, varbinds: &[VarBind]) {
    buf.push_sequence(|buf| {
        for vb in varbinds.iter().rev() {
            vb.encode(buf);
        }
    });
}

/// Decodes a VarBind list, preserving wire order.
pub fn decode_varbind_list(decoder: &mut Decoder) -> Result<Vec<VarBind>> {
    let mut seq = decoder.read_sequence()?;
    let mut varbinds = Vec::with_capacity((seq.remaining() / 16).max(1));

    while !seq.is_empty() {
        varbinds.push(VarBind::decode(&mut seq)?);
    }

    Ok(varbinds)
}

/// Pair each OID with NULL, as read requests require.
pub fn null_varbinds(oids: &[Oid]) -> Vec<VarBind> {
    oids.iter().cloned().map(VarBind::null).collect()
}
