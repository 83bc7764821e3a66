//! In-process SNMP agent for testing.
//!
//! Serves a fixed MIB over a UDP socket on an ephemeral localhost port,
//! speaking v1/v2c with one community and v3 with one USM user. It uses the
//! library's own message types, so it only exercises the session logic
//! and not an independent encoder.

use crate::common::fixtures;

use bytes::Bytes;
use snmp_session::message::{
    CommunityMessage, MSG_MAX_SIZE, Message, MsgFlags, MsgGlobalData, SECURITY_MODEL_USM,
    ScopedPdu, V3Message,
};
use snmp_session::pdu::ResponsePdu;
use snmp_session::v3::auth::verify_message;
use snmp_session::v3::{UsmKeys, UsmSecurityParams};
use snmp_session::{
    ErrorStatus, Oid, Pdu, SecurityLevel, SessionConfig, UsmUser, Value, VarBind, Version, oid,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::ops::Bound;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How the agent treats incoming datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Respond,
    /// Read everything, answer nothing.
    Silent,
    /// Ignore the first N datagrams, then answer normally.
    DropFirst(usize),
    /// Answer, but rewrite the last byte equal to `.0` in each reply to `.1`.
    /// Aimed at a value's type tag to produce an undecodable varbind.
    Retag(u8, u8),
}

#[derive(Default)]
struct State {
    mib: BTreeMap<Oid, Value>,
    received: usize,
    notifications: Vec<Pdu>,
}

struct Config {
    community: Bytes,
    user: Option<UsmUser>,
    engine_id: Bytes,
    engine_boots: i32,
    engine_time: i32,
    behavior: Behavior,
    corrupt_digests: bool,
}

/// An in-process SNMP agent.
///
/// Stops when dropped.
pub struct TestAgent {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl TestAgent {
    /// A v1/v2c agent serving the system group.
    pub async fn new() -> Self {
        TestAgentBuilder::new().build().await
    }

    pub async fn with_data(data: BTreeMap<Oid, Value>) -> Self {
        TestAgentBuilder::new().data(data).build().await
    }

    pub fn builder() -> TestAgentBuilder {
        TestAgentBuilder::new()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Session options pointing requests and notifications at this agent.
    pub fn config(&self, version: Version) -> SessionConfig {
        SessionConfig {
            version: Some(version),
            port: self.addr.port(),
            trap_port: self.addr.port(),
            retries: 0,
            timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    pub fn get(&self, oid: &Oid) -> Option<Value> {
        self.state.lock().unwrap().mib.get(oid).cloned()
    }

    /// Datagrams received so far, answered or not.
    pub fn received(&self) -> usize {
        self.state.lock().unwrap().received
    }

    /// Traps and informs received so far.
    pub fn notifications(&self) -> Vec<Pdu> {
        self.state.lock().unwrap().notifications.clone()
    }

    /// Wait until `count` notifications have arrived.
    pub async fn wait_for_notifications(&self, count: usize) -> Vec<Pdu> {
        for _ in 0..200 {
            let seen = self.notifications();
            if seen.len() >= count {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} notifications");
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TestAgent {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct TestAgentBuilder {
    data: BTreeMap<Oid, Value>,
    config: Config,
}

impl TestAgentBuilder {
    pub fn new() -> Self {
        Self {
            data: fixtures::system_mib(),
            config: Config {
                community: Bytes::from_static(fixtures::COMMUNITY.as_bytes()),
                user: None,
                engine_id: Bytes::from_static(fixtures::AGENT_ENGINE_ID),
                engine_boots: 3,
                engine_time: 1200,
                behavior: Behavior::Respond,
                corrupt_digests: false,
            },
        }
    }

    pub fn data(mut self, data: BTreeMap<Oid, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn community(mut self, community: &str) -> Self {
        self.config.community = Bytes::copy_from_slice(community.as_bytes());
        self
    }

    pub fn user(mut self, user: UsmUser) -> Self {
        self.config.user = Some(user);
        self
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.config.behavior = behavior;
        self
    }

    /// Flip a bit of the digest in every authenticated response.
    pub fn corrupt_digests(mut self) -> Self {
        self.config.corrupt_digests = true;
        self
    }

    pub async fn build(self) -> TestAgent {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test agent");
        let addr = socket.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State {
            mib: self.data,
            ..Default::default()
        }));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(serve(
            socket,
            self.config,
            state.clone(),
            cancel.clone(),
        ));

        TestAgent {
            addr,
            state,
            cancel,
            _task: task,
        }
    }
}

async fn serve(
    socket: UdpSocket,
    config: Config,
    state: Arc<Mutex<State>>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; 65535];
    loop {
        let (len, peer) = tokio::select! {
            _ = cancel.cancelled() => return,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(_) => return,
            },
        };

        let seen = {
            let mut state = state.lock().unwrap();
            state.received += 1;
            state.received
        };
        match config.behavior {
            Behavior::Silent => continue,
            Behavior::DropFirst(n) if seen <= n => continue,
            _ => {}
        }

        let data = Bytes::copy_from_slice(&buf[..len]);
        if let Some(mut reply) = handle(&config, &state, data) {
            if let Behavior::Retag(from, to) = config.behavior {
                let mut bytes = reply.to_vec();
                if let Some(at) = bytes.iter().rposition(|b| *b == from) {
                    bytes[at] = to;
                }
                reply = Bytes::from(bytes);
            }
            let _ = socket.send_to(&reply, peer).await;
        }
    }
}

fn handle(config: &Config, state: &Mutex<State>, data: Bytes) -> Option<Bytes> {
    match Message::decode(data.clone()).ok()? {
        Message::Community(msg) => {
            if msg.community != config.community {
                return None;
            }
            let response = answer(msg.version, state, msg.pdu)?;
            Some(CommunityMessage::new(msg.version, msg.community, response).encode())
        }
        Message::V3(msg) => handle_v3(config, state, msg, &data),
    }
}

fn handle_v3(config: &Config, state: &Mutex<State>, mut msg: V3Message, raw: &[u8]) -> Option<Bytes> {
    let user = config.user.as_ref()?;
    let msg_id = msg.msg_id();

    // Notifications carry the sender's engine id; requests carry ours.
    let is_notification = matches!(msg.pdu(), Some(Pdu::TrapV2 { .. }));
    if msg.security_params.engine_id.is_empty() && !is_notification {
        let report = Pdu::Report(ResponsePdu {
            request_id: msg.pdu().and_then(Pdu::request_id).unwrap_or(msg_id),
            error_status: 0,
            error_index: 0,
            varbinds: vec![VarBind::new(
                oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 4, 0),
                Value::Counter32(1),
            )],
        });
        return reply_v3(config, msg_id, SecurityLevel::NoAuthNoPriv, Bytes::new(), report, None);
    }

    let level = msg.security_level();
    let keys = UsmKeys::derive(user)
        .ok()?
        .localize(&msg.security_params.engine_id);

    if level.requires_auth() {
        let key = keys.auth.as_ref()?;
        if verify_message(key, raw, msg.auth_offset).is_err() {
            let report = Pdu::Report(ResponsePdu {
                request_id: 0,
                error_status: 0,
                error_index: 0,
                varbinds: vec![VarBind::new(
                    oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 5, 0),
                    Value::Counter32(1),
                )],
            });
            return reply_v3(config, msg_id, SecurityLevel::NoAuthNoPriv, Bytes::new(), report, None);
        }
    }
    if level.requires_priv() {
        msg.decrypt(keys.privacy.as_ref()?).ok()?;
    }

    let username = msg.security_params.username.clone();
    let response = answer(Version::V3, state, msg.into_pdu()?)?;
    let mut bytes = reply_v3(config, msg_id, level, username, response, Some(&keys))?;

    if config.corrupt_digests && level.requires_auth() {
        let Message::V3(sent) = Message::decode(bytes.clone()).ok()? else {
            return None;
        };
        let mut corrupted = bytes.to_vec();
        corrupted[sent.auth_offset] ^= 0x01;
        bytes = Bytes::from(corrupted);
    }
    Some(bytes)
}

fn reply_v3(
    config: &Config,
    msg_id: i32,
    level: SecurityLevel,
    username: Bytes,
    pdu: Pdu,
    keys: Option<&snmp_session::v3::LocalizedKeys>,
) -> Option<Bytes> {
    let global = MsgGlobalData {
        msg_id,
        msg_max_size: MSG_MAX_SIZE,
        msg_flags: MsgFlags::new(level, false),
        msg_security_model: SECURITY_MODEL_USM,
    };
    let params = UsmSecurityParams::new(
        config.engine_id.clone(),
        config.engine_boots,
        config.engine_time,
        username,
    );
    V3Message::new(global, params, ScopedPdu::new(config.engine_id.clone(), pdu))
        .encode_secured(keys)
        .ok()
}

fn response(request_id: i32, varbinds: Vec<VarBind>) -> Pdu {
    Pdu::Response(ResponsePdu {
        request_id,
        error_status: 0,
        error_index: 0,
        varbinds,
    })
}

fn failure(request_id: i32, status: ErrorStatus, index: usize, varbinds: Vec<VarBind>) -> Pdu {
    Pdu::Response(ResponsePdu {
        request_id,
        error_status: status.as_i32(),
        error_index: index as i32,
        varbinds,
    })
}

fn next_after(mib: &BTreeMap<Oid, Value>, oid: &Oid) -> Option<VarBind> {
    mib.range((Bound::Excluded(oid.clone()), Bound::Unbounded))
        .next()
        .map(|(oid, value)| VarBind::new(oid.clone(), value.clone()))
}

/// Build the response PDU; `None` for PDUs that get no answer.
fn answer(version: Version, state: &Mutex<State>, pdu: Pdu) -> Option<Pdu> {
    let mut state = state.lock().unwrap();
    let v1 = version == Version::V1;

    match pdu {
        Pdu::Get {
            request_id,
            varbinds,
        } => {
            let mut out = Vec::with_capacity(varbinds.len());
            for (i, vb) in varbinds.iter().enumerate() {
                match state.mib.get(&vb.oid) {
                    Some(value) => out.push(VarBind::new(vb.oid.clone(), value.clone())),
                    None if v1 => {
                        return Some(failure(
                            request_id,
                            ErrorStatus::NoSuchName,
                            i + 1,
                            varbinds.clone(),
                        ));
                    }
                    None => out.push(VarBind::new(vb.oid.clone(), Value::NoSuchObject)),
                }
            }
            Some(response(request_id, out))
        }
        Pdu::GetNext {
            request_id,
            varbinds,
        } => {
            let mut out = Vec::with_capacity(varbinds.len());
            for (i, vb) in varbinds.iter().enumerate() {
                match next_after(&state.mib, &vb.oid) {
                    Some(next) => out.push(next),
                    None if v1 => {
                        return Some(failure(
                            request_id,
                            ErrorStatus::NoSuchName,
                            i + 1,
                            varbinds.clone(),
                        ));
                    }
                    None => out.push(VarBind::new(vb.oid.clone(), Value::EndOfMibView)),
                }
            }
            Some(response(request_id, out))
        }
        Pdu::GetBulk {
            request_id,
            non_repeaters,
            max_repetitions,
            varbinds,
        } => {
            let non_repeaters = (non_repeaters.max(0) as usize).min(varbinds.len());
            let mut out = Vec::new();
            for vb in &varbinds[..non_repeaters] {
                out.push(
                    next_after(&state.mib, &vb.oid)
                        .unwrap_or_else(|| VarBind::new(vb.oid.clone(), Value::EndOfMibView)),
                );
            }
            let mut cursors: Vec<Oid> = varbinds[non_repeaters..]
                .iter()
                .map(|vb| vb.oid.clone())
                .collect();
            if !cursors.is_empty() {
                for _ in 0..max_repetitions.max(0) {
                    let mut all_done = true;
                    for cursor in &mut cursors {
                        match next_after(&state.mib, cursor) {
                            Some(next) => {
                                *cursor = next.oid.clone();
                                out.push(next);
                                all_done = false;
                            }
                            None => out.push(VarBind::new(cursor.clone(), Value::EndOfMibView)),
                        }
                    }
                    if all_done {
                        break;
                    }
                }
            }
            Some(response(request_id, out))
        }
        Pdu::Set {
            request_id,
            varbinds,
        } => {
            for vb in &varbinds {
                state.mib.insert(vb.oid.clone(), vb.value.clone());
            }
            Some(response(request_id, varbinds))
        }
        Pdu::Inform {
            request_id,
            varbinds,
        } => {
            state.notifications.push(Pdu::Inform {
                request_id,
                varbinds: varbinds.clone(),
            });
            Some(response(request_id, varbinds))
        }
        notification @ (Pdu::TrapV2 { .. } | Pdu::TrapV1(_)) => {
            state.notifications.push(notification);
            None
        }
        Pdu::Response(_) | Pdu::Report(_) => None,
    }
}
