//! Pending requests and per-operation response checks.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::time::delay_queue;

use crate::error::{Error, Result};
use crate::pdu::{Pdu, PduType};
use crate::varbind::{VarBind, is_varbind_error};

/// Reply channel of one caller.
pub(crate) type Reply = oneshot::Sender<Result<Vec<VarBind>>>;

/// How a GetResponse must relate to the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseCheck {
    /// Same OIDs in the same order (Get, Set, Inform).
    SameOids,
    /// Same count, each OID after its request OID unless it is an exception
    /// (GetNext).
    FollowingOids,
    /// Checked by the caller (GetBulk).
    Deferred,
}

impl ResponseCheck {
    pub(crate) fn for_pdu(pdu: &Pdu) -> Self {
        match pdu.pdu_type() {
            PduType::GetNextRequest => Self::FollowingOids,
            PduType::GetBulkRequest => Self::Deferred,
            _ => Self::SameOids,
        }
    }

    pub(crate) fn apply(
        self,
        pdu_type: PduType,
        request: &[VarBind],
        response: Vec<VarBind>,
    ) -> Result<Vec<VarBind>> {
        match self {
            Self::SameOids => {
                if request.len() != response.len() {
                    let what = if pdu_type == PduType::InformRequest {
                        "Inform"
                    } else {
                        "Requested"
                    };
                    return Err(Error::invalid_response(format!(
                        "{what} OIDs do not match response OIDs"
                    )));
                }
                for (i, (req, resp)) in request.iter().zip(&response).enumerate() {
                    if req.oid != resp.oid {
                        return Err(Error::invalid_response(format!(
                            "OID '{}' in request at position '{i}' does not match OID '{}' in response at position '{i}'",
                            req.oid, resp.oid
                        )));
                    }
                }
            }
            Self::FollowingOids => {
                if request.len() != response.len() {
                    return Err(Error::invalid_response(
                        "Requested OIDs do not match response OIDs",
                    ));
                }
                for (i, (req, resp)) in request.iter().zip(&response).enumerate() {
                    if !is_varbind_error(resp) && !resp.oid.follows(&req.oid) {
                        return Err(Error::invalid_response(format!(
                            "OID '{}' in request at position '{i}' does not precede OID '{}' in response at position '{i}'",
                            req.oid, resp.oid
                        )));
                    }
                }
            }
            Self::Deferred => {}
        }
        Ok(response)
    }
}

/// Outstanding exchange, owned by the event loop from registration until
/// it is answered, times out, or the session closes.
pub(crate) struct PendingRequest {
    /// Serialized message, resent as is on retry.
    pub payload: Bytes,
    pub destination: SocketAddr,
    pub retries_left: u32,
    pub first_sent: Instant,
    pub timer: delay_queue::Key,
    pub reply: Reply,
    /// Request varbinds and kind, for the response check.
    pub pdu_type: PduType,
    pub request_varbinds: Vec<VarBind>,
    pub check: ResponseCheck,
    /// Set on a v3 discovery probe: the PDU to send once the engine is known.
    pub original_pdu: Option<Pdu>,
}
