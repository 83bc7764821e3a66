//! Trap and inform PDU construction.

use std::net::Ipv4Addr;

use crate::error::Result;
use crate::pdu::{Pdu, TrapType, TrapV1Pdu, notification_varbinds};
use crate::varbind::VarBind;
use crate::version::Version;

/// Per-notification options.
#[derive(Debug, Clone, Default)]
pub struct NotifyOptions {
    /// Agent address of a v1 trap (default: 127.0.0.1).
    pub agent_addr: Option<Ipv4Addr>,
    /// sysUpTime.0 / v1 time-stamp in hundredths of a second (default: the
    /// session's uptime).
    pub up_time: Option<u32>,
}

impl NotifyOptions {
    pub fn agent_addr(mut self, addr: Ipv4Addr) -> Self {
        self.agent_addr = Some(addr);
        self
    }

    pub fn up_time(mut self, ticks: u32) -> Self {
        self.up_time = Some(ticks);
        self
    }
}

pub(super) fn trap_pdu(
    version: Version,
    request_id: i32,
    trap: &TrapType,
    varbinds: &[VarBind],
    options: &NotifyOptions,
    uptime: u32,
) -> Result<Pdu> {
    let up_time = options.up_time.unwrap_or(uptime);
    match version {
        Version::V1 => {
            let (enterprise, generic, specific) = trap.v1_identity()?;
            Ok(Pdu::TrapV1(TrapV1Pdu {
                enterprise,
                agent_addr: options.agent_addr.unwrap_or(Ipv4Addr::LOCALHOST).octets(),
                generic_trap: generic.as_i32(),
                specific_trap: specific,
                time_stamp: up_time,
                varbinds: varbinds.to_vec(),
            }))
        }
        Version::V2c | Version::V3 => Ok(Pdu::TrapV2 {
            request_id,
            varbinds: notification_varbinds(up_time, trap.v2_trap_oid(), varbinds),
        }),
    }
}

/// InformRequest PDU; the same shape on every version.
pub(super) fn inform_pdu(
    request_id: i32,
    trap: &TrapType,
    varbinds: &[VarBind],
    options: &NotifyOptions,
    uptime: u32,
) -> Pdu {
    Pdu::Inform {
        request_id,
        varbinds: notification_varbinds(
            options.up_time.unwrap_or(uptime),
            trap.v2_trap_oid(),
            varbinds,
        ),
    }
}
