//! SNMP Protocol Data Units (PDUs).
//!
//! [`Pdu`] is a closed sum type over the nine PDU kinds. Every kind except
//! the v1 Trap shares one wire shape (request id, two integers, varbind
//! list) and is encoded by the same function, parameterized by its tag.

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::value::Value;
use crate::varbind::{VarBind, decode_varbind_list, encode_varbind_list};

/// `sysUpTime.0`, first varbind of every v2 notification.
pub const SYS_UPTIME_OID: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 3, 0];
/// `snmpTrapOID.0`, second varbind of every v2 notification.
pub const SNMP_TRAP_OID: &[u32] = &[1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0];
/// `snmpTraps`, parent of the standard v2 trap OIDs.
pub const SNMP_TRAPS: &[u32] = &[1, 3, 6, 1, 6, 3, 1, 1, 5];
/// `enterprises`, used as the v1 enterprise of generic traps.
pub const ENTERPRISES: &[u32] = &[1, 3, 6, 1, 4, 1];

/// PDU type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduType {
    GetRequest = 0xA0,
    GetNextRequest = 0xA1,
    /// GetResponse.
    Response = 0xA2,
    SetRequest = 0xA3,
    TrapV1 = 0xA4,
    GetBulkRequest = 0xA5,
    InformRequest = 0xA6,
    TrapV2 = 0xA7,
    Report = 0xA8,
}

impl PduType {
    /// Create from tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(Self::GetRequest),
            0xA1 => Some(Self::GetNextRequest),
            0xA2 => Some(Self::Response),
            0xA3 => Some(Self::SetRequest),
            0xA4 => Some(Self::TrapV1),
            0xA5 => Some(Self::GetBulkRequest),
            0xA6 => Some(Self::InformRequest),
            0xA7 => Some(Self::TrapV2),
            0xA8 => Some(Self::Report),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetRequest => write!(f, "GetRequest"),
            Self::GetNextRequest => write!(f, "GetNextRequest"),
            Self::Response => write!(f, "GetResponse"),
            Self::SetRequest => write!(f, "SetRequest"),
            Self::TrapV1 => write!(f, "Trap"),
            Self::GetBulkRequest => write!(f, "GetBulkRequest"),
            Self::InformRequest => write!(f, "InformRequest"),
            Self::TrapV2 => write!(f, "TrapV2"),
            Self::Report => write!(f, "Report"),
        }
    }
}

/// Body of a GetResponse or Report.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePdu {
    pub request_id: i32,
    pub error_status: i32,
    /// 1-based index of the offending varbind, 0 if none.
    pub error_index: i32,
    pub varbinds: Vec<VarBind>,
}

impl ResponsePdu {
    pub fn error_status(&self) -> ErrorStatus {
        ErrorStatus::from_i32(self.error_status)
    }

    /// Fail with [`Error::RequestFailed`] when the agent reported an error.
    ///
    /// The offending OID is attached when `error_index` names a varbind
    /// present in the response.
    pub fn check_status(&self) -> Result<()> {
        if self.error_status == 0 {
            return Ok(());
        }
        let index = self.error_index.max(0) as u32;
        let oid = (index >= 1)
            .then(|| self.varbinds.get(index as usize - 1))
            .flatten()
            .map(|vb| vb.oid.clone());
        Err(Error::RequestFailed {
            status: self.error_status(),
            index,
            oid,
        })
    }
}

/// SNMPv1 generic trap types (RFC 1157 Section 4.1.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum GenericTrap {
    ColdStart = 0,
    WarmStart = 1,
    LinkDown = 2,
    LinkUp = 3,
    AuthenticationFailure = 4,
    EgpNeighborLoss = 5,
    /// Vendor-specific; see the specific trap code.
    EnterpriseSpecific = 6,
}

impl GenericTrap {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::ColdStart),
            1 => Some(Self::WarmStart),
            2 => Some(Self::LinkDown),
            3 => Some(Self::LinkUp),
            4 => Some(Self::AuthenticationFailure),
            5 => Some(Self::EgpNeighborLoss),
            6 => Some(Self::EnterpriseSpecific),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Identity of a notification: a generic trap code or a full trap OID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapType {
    Generic(GenericTrap),
    Oid(Oid),
}

impl TrapType {
    /// snmpTrapOID.0 value for v2 notifications.
    ///
    /// Generic code N maps to `snmpTraps.(N+1)` (RFC 3584 Section 3).
    pub fn v2_trap_oid(&self) -> Oid {
        match self {
            TrapType::Generic(generic) => {
                Oid::from_slice(SNMP_TRAPS).child(generic.as_i32() as u32 + 1)
            }
            TrapType::Oid(oid) => oid.clone(),
        }
    }

    /// `(enterprise, generic, specific)` for a v1 Trap PDU.
    ///
    /// A trap OID is split at its last arc, which becomes the specific code
    /// of an enterprise-specific trap.
    pub fn v1_identity(&self) -> Result<(Oid, GenericTrap, i32)> {
        match self {
            TrapType::Generic(generic) => Ok((Oid::from_slice(ENTERPRISES), *generic, 0)),
            TrapType::Oid(oid) => {
                let (Some(enterprise), Some(specific)) = (oid.parent(), oid.last()) else {
                    return Err(Error::invalid_request("trap OID is empty"));
                };
                let specific = i32::try_from(specific).map_err(|_| {
                    Error::invalid_request(format!("specific trap code out of range in {}", oid))
                })?;
                Ok((enterprise, GenericTrap::EnterpriseSpecific, specific))
            }
        }
    }
}

impl From<GenericTrap> for TrapType {
    fn from(generic: GenericTrap) -> Self {
        TrapType::Generic(generic)
    }
}

impl From<Oid> for TrapType {
    fn from(oid: Oid) -> Self {
        TrapType::Oid(oid)
    }
}

/// Varbinds of a v2 notification: sysUpTime.0, snmpTrapOID.0, then the
/// caller's varbinds.
pub fn notification_varbinds(uptime: u32, trap_oid: Oid, varbinds: &[VarBind]) -> Vec<VarBind> {
    let mut out = Vec::with_capacity(varbinds.len() + 2);
    out.push(VarBind::new(
        Oid::from_slice(SYS_UPTIME_OID),
        Value::TimeTicks(uptime),
    ));
    out.push(VarBind::new(
        Oid::from_slice(SNMP_TRAP_OID),
        Value::ObjectIdentifier(trap_oid),
    ));
    out.extend_from_slice(varbinds);
    out
}

/// SNMPv1 Trap PDU (RFC 1157 Section 4.1.6).
///
/// Carries no request id; nothing answers it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapV1Pdu {
    pub enterprise: Oid,
    pub agent_addr: [u8; 4],
    pub generic_trap: i32,
    pub specific_trap: i32,
    /// Hundredths of a second since the sender (re)initialized.
    pub time_stamp: u32,
    pub varbinds: Vec<VarBind>,
}

impl TrapV1Pdu {
    fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(PduType::TrapV1.tag(), |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_unsigned32(tag::application::TIMETICKS, self.time_stamp);
            buf.push_integer(self.specific_trap);
            buf.push_integer(self.generic_trap);
            buf.push_ip_address(self.agent_addr);
            buf.push_oid(&self.enterprise);
        });
    }

    fn decode_body(pdu: &mut Decoder) -> Result<Self> {
        let enterprise = pdu.read_oid()?;
        let agent_addr = match Value::decode(pdu)? {
            Value::IpAddress(addr) => addr,
            other => {
                return Err(Error::decode(
                    pdu.offset(),
                    DecodeErrorKind::UnexpectedTag {
                        expected: tag::application::IP_ADDRESS,
                        actual: other.object_type().tag(),
                    },
                ));
            }
        };
        let generic_trap = pdu.read_integer()?;
        let specific_trap = pdu.read_integer()?;
        let len = pdu.expect_tag(tag::application::TIMETICKS)?;
        let time_stamp = pdu.read_unsigned32_value(len)?;
        let varbinds = decode_varbind_list(pdu)?;
        Ok(Self {
            enterprise,
            agent_addr,
            generic_trap,
            specific_trap,
            time_stamp,
            varbinds,
        })
    }
}

/// One PDU of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    Get {
        request_id: i32,
        varbinds: Vec<VarBind>,
    },
    GetNext {
        request_id: i32,
        varbinds: Vec<VarBind>,
    },
    GetBulk {
        request_id: i32,
        non_repeaters: i32,
        max_repetitions: i32,
        varbinds: Vec<VarBind>,
    },
    Set {
        request_id: i32,
        varbinds: Vec<VarBind>,
    },
    Inform {
        request_id: i32,
        varbinds: Vec<VarBind>,
    },
    TrapV2 {
        request_id: i32,
        varbinds: Vec<VarBind>,
    },
    TrapV1(TrapV1Pdu),
    Response(ResponsePdu),
    Report(ResponsePdu),
}

impl Pdu {
    pub fn pdu_type(&self) -> PduType {
        match self {
            Pdu::Get { .. } => PduType::GetRequest,
            Pdu::GetNext { .. } => PduType::GetNextRequest,
            Pdu::GetBulk { .. } => PduType::GetBulkRequest,
            Pdu::Set { .. } => PduType::SetRequest,
            Pdu::Inform { .. } => PduType::InformRequest,
            Pdu::TrapV2 { .. } => PduType::TrapV2,
            Pdu::TrapV1(_) => PduType::TrapV1,
            Pdu::Response(_) => PduType::Response,
            Pdu::Report(_) => PduType::Report,
        }
    }

    /// Request id, absent only for the v1 Trap.
    pub fn request_id(&self) -> Option<i32> {
        match self {
            Pdu::Get { request_id, .. }
            | Pdu::GetNext { request_id, .. }
            | Pdu::GetBulk { request_id, .. }
            | Pdu::Set { request_id, .. }
            | Pdu::Inform { request_id, .. }
            | Pdu::TrapV2 { request_id, .. } => Some(*request_id),
            Pdu::Response(r) | Pdu::Report(r) => Some(r.request_id),
            Pdu::TrapV1(_) => None,
        }
    }

    /// Replace the request id. Has no effect on a v1 Trap.
    pub fn set_request_id(&mut self, id: i32) {
        match self {
            Pdu::Get { request_id, .. }
            | Pdu::GetNext { request_id, .. }
            | Pdu::GetBulk { request_id, .. }
            | Pdu::Set { request_id, .. }
            | Pdu::Inform { request_id, .. }
            | Pdu::TrapV2 { request_id, .. } => *request_id = id,
            Pdu::Response(r) | Pdu::Report(r) => r.request_id = id,
            Pdu::TrapV1(_) => {}
        }
    }

    pub fn varbinds(&self) -> &[VarBind] {
        match self {
            Pdu::Get { varbinds, .. }
            | Pdu::GetNext { varbinds, .. }
            | Pdu::GetBulk { varbinds, .. }
            | Pdu::Set { varbinds, .. }
            | Pdu::Inform { varbinds, .. }
            | Pdu::TrapV2 { varbinds, .. } => varbinds,
            Pdu::TrapV1(trap) => &trap.varbinds,
            Pdu::Response(r) | Pdu::Report(r) => &r.varbinds,
        }
    }

    /// `true` for kinds the receiver answers with a GetResponse.
    pub fn expects_response(&self) -> bool {
        matches!(
            self,
            Pdu::Get { .. }
                | Pdu::GetNext { .. }
                | Pdu::GetBulk { .. }
                | Pdu::Set { .. }
                | Pdu::Inform { .. }
        )
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        let tag = self.pdu_type().tag();
        match self {
            Pdu::Get {
                request_id,
                varbinds,
            }
            | Pdu::GetNext {
                request_id,
                varbinds,
            }
            | Pdu::Set {
                request_id,
                varbinds,
            }
            | Pdu::Inform {
                request_id,
                varbinds,
            }
            | Pdu::TrapV2 {
                request_id,
                varbinds,
            } => encode_fields(buf, tag, *request_id, 0, 0, varbinds),
            Pdu::GetBulk {
                request_id,
                non_repeaters,
                max_repetitions,
                varbinds,
            } => encode_fields(
                buf,
                tag,
                *request_id,
                *non_repeaters,
                *max_repetitions,
                varbinds,
            ),
            Pdu::Response(r) | Pdu::Report(r) => encode_fields(
                buf,
                tag,
                r.request_id,
                r.error_status,
                r.error_index,
                &r.varbinds,
            ),
            Pdu::TrapV1(trap) => trap.encode(buf),
        }
    }

    /// Decode any PDU, dispatching on its own tag.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let at = decoder.offset();
        let tag = decoder.read_tag()?;
        let pdu_type = PduType::from_tag(tag)
            .ok_or_else(|| Error::decode(at, DecodeErrorKind::UnknownPduType(tag)))?;
        let len = decoder.read_length()?;
        let mut body = decoder.sub_decoder(len)?;

        if pdu_type == PduType::TrapV1 {
            return TrapV1Pdu::decode_body(&mut body).map(Pdu::TrapV1);
        }

        let request_id = body.read_integer()?;
        let second = body.read_integer()?;
        let third = body.read_integer()?;
        let varbinds = decode_varbind_list(&mut body)?;

        Ok(match pdu_type {
            PduType::GetRequest => Pdu::Get {
                request_id,
                varbinds,
            },
            PduType::GetNextRequest => Pdu::GetNext {
                request_id,
                varbinds,
            },
            PduType::SetRequest => Pdu::Set {
                request_id,
                varbinds,
            },
            PduType::InformRequest => Pdu::Inform {
                request_id,
                varbinds,
            },
            PduType::TrapV2 => Pdu::TrapV2 {
                request_id,
                varbinds,
            },
            PduType::GetBulkRequest => Pdu::GetBulk {
                request_id,
                non_repeaters: second,
                max_repetitions: third,
                varbinds,
            },
            PduType::Report => Pdu::Report(ResponsePdu {
                request_id,
                error_status: second,
                error_index: third,
                varbinds,
            }),
            // TrapV1 returned above.
            PduType::Response | PduType::TrapV1 => Pdu::Response(ResponsePdu {
                request_id,
                error_status: second,
                error_index: third,
                varbinds,
            }),
        })
    }
}

fn encode_fields(
    buf: &mut EncodeBuf,
    tag: u8,
    request_id: i32,
    second: i32,
    third: i32,
    varbinds: &[VarBind],
) {
    buf.push_constructed(tag, |buf| {
        encode_varbind_list(buf, varbinds);
        buf.push_integer(third);
        buf.push_integer(second);
        buf.push_integer(request_id);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    fn roundtrip(pdu: &Pdu) -> Pdu {
        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        let mut decoder = Decoder::new(buf.finish());
        let decoded = Pdu::decode(&mut decoder).unwrap();
        assert!(decoder.is_empty());
        decoded
    }

    #[test]
    fn get_request_wire_shape() {
        let pdu = Pdu::Get {
            request_id: 1,
            varbinds: vec![VarBind::null(oid!(1, 3, 6, 1))],
        };
        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        assert_eq!(
            &buf.finish()[..],
            &[
                0xA0, 0x14, 0x02, 0x01, 0x01, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x09,
                0x30, 0x07, 0x06, 0x03, 0x2B, 0x06, 0x01, 0x05, 0x00
            ][..]
        );
    }

    #[test]
    fn get_bulk_carries_counts() {
        let pdu = Pdu::GetBulk {
            request_id: 77,
            non_repeaters: 1,
            max_repetitions: 10,
            varbinds: vec![
                VarBind::null(oid!(1, 3, 6, 1, 2, 1, 1, 3)),
                VarBind::null(oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 2)),
            ],
        };
        assert_eq!(roundtrip(&pdu), pdu);
    }

    #[test]
    fn set_request_id_rewrites_id() {
        let mut pdu = Pdu::GetNext {
            request_id: 1,
            varbinds: vec![VarBind::null(oid!(1, 3, 6, 1))],
        };
        pdu.set_request_id(99);
        assert_eq!(pdu.request_id(), Some(99));
        assert_eq!(roundtrip(&pdu).request_id(), Some(99));
    }

    #[test]
    fn report_keeps_its_tag() {
        let pdu = Pdu::Report(ResponsePdu {
            request_id: 0,
            error_status: 0,
            error_index: 0,
            varbinds: vec![VarBind::new(
                oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 4, 0),
                Value::Counter32(1),
            )],
        });
        let decoded = roundtrip(&pdu);
        assert_eq!(decoded.pdu_type(), PduType::Report);
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn trap_v1_roundtrip() {
        let pdu = Pdu::TrapV1(TrapV1Pdu {
            enterprise: oid!(1, 3, 6, 1, 4, 1, 2021, 251),
            agent_addr: [10, 1, 2, 3],
            generic_trap: 6,
            specific_trap: 1,
            time_stamp: 4242,
            varbinds: vec![VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 5, 0), "edge")],
        });
        let decoded = roundtrip(&pdu);
        assert_eq!(decoded.request_id(), None);
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn unknown_tag_rejected() {
        let err = Pdu::decode(&mut Decoder::from_slice(&[0xA9, 0x00])).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode {
                kind: DecodeErrorKind::UnknownPduType(0xA9),
                ..
            }
        ));
    }

    #[test]
    fn check_status_resolves_offending_oid() {
        let response = ResponsePdu {
            request_id: 3,
            error_status: 2,
            error_index: 2,
            varbinds: vec![
                VarBind::null(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)),
                VarBind::null(oid!(1, 3, 6, 1, 2, 1, 1, 99, 0)),
            ],
        };
        match response.check_status().unwrap_err() {
            Error::RequestFailed { status, index, oid } => {
                assert_eq!(status, ErrorStatus::NoSuchName);
                assert_eq!(index, 2);
                assert_eq!(oid, Some(oid!(1, 3, 6, 1, 2, 1, 1, 99, 0)));
            }
            other => panic!("unexpected {other:?}"),
        }

        let out_of_range = ResponsePdu {
            error_index: 9,
            ..response.clone()
        };
        assert!(matches!(
            out_of_range.check_status(),
            Err(Error::RequestFailed { oid: None, .. })
        ));

        let ok = ResponsePdu {
            error_status: 0,
            ..response
        };
        assert!(ok.check_status().is_ok());
    }

    #[test]
    fn trap_identity() {
        let trap = TrapType::Oid(oid!(1, 3, 6, 1, 4, 1, 2021, 251, 1));
        let (enterprise, generic, specific) = trap.v1_identity().unwrap();
        assert_eq!(enterprise, oid!(1, 3, 6, 1, 4, 1, 2021, 251));
        assert_eq!(generic, GenericTrap::EnterpriseSpecific);
        assert_eq!(specific, 1);

        let trap = TrapType::Generic(GenericTrap::LinkDown);
        let (enterprise, generic, specific) = trap.v1_identity().unwrap();
        assert_eq!(enterprise, oid!(1, 3, 6, 1, 4, 1));
        assert_eq!(generic, GenericTrap::LinkDown);
        assert_eq!(specific, 0);
        assert_eq!(trap.v2_trap_oid(), oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 3));

        assert!(TrapType::Oid(Oid::empty()).v1_identity().is_err());
    }

    #[test]
    fn notification_prefix() {
        let extra = [VarBind::new(oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 1, 3), 3)];
        let vbs = notification_varbinds(500, oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 1), &extra);
        assert_eq!(vbs.len(), 3);
        assert_eq!(vbs[0].oid, oid!(1, 3, 6, 1, 2, 1, 1, 3, 0));
        assert_eq!(vbs[0].value, Value::TimeTicks(500));
        assert_eq!(vbs[1].oid, oid!(1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0));
        assert_eq!(
            vbs[1].value,
            Value::ObjectIdentifier(oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 1))
        );
        assert_eq!(vbs[2], extra[0]);
    }
}
