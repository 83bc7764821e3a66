//! Session event loop.
//!
//! One task per session owns the transport, the table of pending requests,
//! their retry timers and the USM keys. Caller commands, inbound datagrams
//! and timer expirations are handled one at a time, so no state is shared
//! and nothing is locked.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::ops::ControlFlow;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::time::DelayQueue;

use super::SessionEvent;
use super::request::{PendingRequest, Reply, ResponseCheck};
use crate::error::{AuthErrorKind, CryptoErrorKind, Error, Result};
use crate::message::{
    CommunityMessage, Message, MsgFlags, MsgGlobalData, ScopedPdu, V3Message,
};
use crate::pdu::Pdu;
use crate::transport::Transport;
use crate::util::{IdBits, encode_hex};
use crate::v3::auth::verify_message;
use crate::v3::{LocalizedKeys, UsmKeys, UsmSecurityParams, UsmUser};
use crate::varbind::VarBind;
use crate::version::Version;

pub(crate) enum Command {
    /// Confirmed request: Get, GetNext, GetBulk, Set or Inform.
    Request { pdu: Pdu, port: u16, reply: Reply },
    /// Unconfirmed notification; answered once the datagram is sent.
    Notify {
        pdu: Pdu,
        port: u16,
        reply: oneshot::Sender<Result<()>>,
    },
    Close { done: oneshot::Sender<()> },
}

/// Everything the event loop needs from the session configuration.
pub(crate) struct ActorConfig {
    pub host: IpAddr,
    pub version: Version,
    pub community: Bytes,
    pub retries: u32,
    pub timeout: Duration,
    pub id_bits: IdBits,
    pub user: Option<UsmUser>,
    pub keys: Option<UsmKeys>,
}

/// Engines whose localized keys are kept before the cache is reset.
const LOCALIZED_KEYS_CAPACITY: usize = 8;

/// Localized keys per authoritative engine id.
#[derive(Default)]
struct KeyCache {
    entries: HashMap<Bytes, LocalizedKeys>,
}

impl KeyCache {
    fn get(&mut self, master: &UsmKeys, engine_id: &Bytes) -> LocalizedKeys {
        if !self.entries.contains_key(engine_id)
            && self.entries.len() >= LOCALIZED_KEYS_CAPACITY
        {
            self.entries.clear();
        }
        self.entries
            .entry(engine_id.clone())
            .or_insert_with(|| master.localize(engine_id))
            .clone()
    }
}

pub(crate) struct Actor<T: Transport> {
    transport: T,
    config: ActorConfig,
    /// Keys per authoritative engine id, localized on first use.
    localized: KeyCache,
    reqs: HashMap<i32, PendingRequest>,
    timers: DelayQueue<i32>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<SessionEvent>,
}

/// What a pending request remembers about the PDU it carries.
struct Exchange {
    pdu: Pdu,
    original_pdu: Option<Pdu>,
}

impl<T: Transport> Actor<T> {
    pub(crate) fn new(
        transport: T,
        config: ActorConfig,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            transport,
            config,
            localized: KeyCache::default(),
            reqs: HashMap::new(),
            timers: DelayQueue::new(),
            commands,
            events,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await.is_break() {
                            return;
                        }
                    }
                    None => {
                        // Every handle was dropped.
                        self.shutdown();
                        return;
                    }
                },
                received = self.transport.recv_from() => match received {
                    Ok((data, source)) => self.handle_datagram(data, source).await,
                    Err(e) => self.publish(e),
                },
                Some(expired) = self.timers.next(), if !self.timers.is_empty() => {
                    self.handle_timeout(expired.into_inner()).await;
                }
            }
        }
    }

    fn publish(&self, error: Error) {
        tracing::debug!(target: "snmp_session::session", error = %error, "session error");
        self.emit(SessionEvent::Error(error));
    }

    /// Queue an event; dropped when nobody drains the queue.
    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.events.try_send(event) {
            tracing::trace!(
                target: "snmp_session::session",
                { event = ?e.into_inner() },
                "event queue full or unsubscribed, dropping event"
            );
        }
    }

    fn destination(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.config.host, port)
    }

    /// An id no pending request uses.
    fn unused_id(&self) -> i32 {
        loop {
            let id = self.config.id_bits.generate();
            if !self.reqs.contains_key(&id) {
                return id;
            }
        }
    }

    fn keys_for(&mut self, engine_id: &Bytes) -> Option<LocalizedKeys> {
        let master = self.config.keys.as_ref()?;
        Some(self.localized.get(master, engine_id))
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Request {
                mut pdu,
                port,
                reply,
            } => {
                let destination = self.destination(port);
                match self.config.version {
                    Version::V1 | Version::V2c => {
                        let Some(mut key) = pdu.request_id() else {
                            let _ = reply.send(Err(Error::invalid_request(
                                "PDU without request id cannot be confirmed",
                            )));
                            return ControlFlow::Continue(());
                        };
                        if self.reqs.contains_key(&key) {
                            key = self.unused_id();
                            pdu.set_request_id(key);
                        }
                        let payload = CommunityMessage::new(
                            self.config.version,
                            self.config.community.clone(),
                            pdu.clone(),
                        )
                        .encode();
                        let exchange = Exchange {
                            pdu,
                            original_pdu: None,
                        };
                        self.dispatch(key, payload, destination, reply, exchange)
                            .await;
                    }
                    Version::V3 => {
                        let msg_id = self.unused_id();
                        tracing::debug!(
                            target: "snmp_session::session",
                            { snmp.msg_id = msg_id },
                            "sending engine discovery probe"
                        );
                        match V3Message::discovery(msg_id).encode_secured(None) {
                            Ok(payload) => {
                                let exchange = Exchange {
                                    pdu: pdu.clone(),
                                    original_pdu: Some(pdu),
                                };
                                self.dispatch(msg_id, payload, destination, reply, exchange)
                                    .await;
                            }
                            Err(e) => {
                                let _ = reply.send(Err(e));
                            }
                        }
                    }
                }
            }
            Command::Notify { pdu, port, reply } => {
                let destination = self.destination(port);
                let result = match self.encode_notification(pdu) {
                    Ok(payload) => self.transport.send_to(&payload, destination).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::Close { done } => {
                self.shutdown();
                let _ = done.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Serialize a trap: community form, or USM form addressed from the
    /// user's own engine with boots and time zero.
    fn encode_notification(&mut self, pdu: Pdu) -> Result<Bytes> {
        match self.config.version {
            Version::V1 | Version::V2c => Ok(CommunityMessage::new(
                self.config.version,
                self.config.community.clone(),
                pdu,
            )
            .encode()),
            Version::V3 => {
                let Some(user) = self.config.user.clone() else {
                    return Err(Error::Config("SNMPv3 session requires a USM user".into()));
                };
                let keys = self.keys_for(&user.engine_id);
                let mut global = MsgGlobalData::request(self.unused_id(), user.level);
                global.msg_flags = MsgFlags::new(user.level, false);
                let message = V3Message::new(
                    global,
                    UsmSecurityParams::new(user.engine_id.clone(), 0, 0, user.name.clone()),
                    ScopedPdu::new(user.engine_id.clone(), pdu),
                );
                message.encode_secured(keys.as_ref())
            }
        }
    }

    /// Send and, on success, register the request with a fresh timer.
    async fn dispatch(
        &mut self,
        key: i32,
        payload: Bytes,
        destination: SocketAddr,
        reply: Reply,
        exchange: Exchange,
    ) {
        tracing::trace!(
            target: "snmp_session::session",
            {
                snmp.request_id = key,
                snmp.pdu_type = %exchange.pdu.pdu_type(),
                data = %encode_hex(&payload),
            },
            "sending request"
        );
        if let Err(e) = self.transport.send_to(&payload, destination).await {
            let _ = reply.send(Err(e));
            return;
        }

        let timer = self.timers.insert(key, self.config.timeout);
        let check = ResponseCheck::for_pdu(&exchange.pdu);
        let pdu_type = exchange.pdu.pdu_type();
        let request_varbinds = exchange.pdu.varbinds().to_vec();
        self.reqs.insert(
            key,
            PendingRequest {
                payload,
                destination,
                retries_left: self.config.retries,
                first_sent: Instant::now(),
                timer,
                reply,
                pdu_type,
                request_varbinds,
                check,
                original_pdu: exchange.original_pdu,
            },
        );
    }

    fn unregister(&mut self, key: i32) -> Option<PendingRequest> {
        let req = self.reqs.remove(&key)?;
        self.timers.remove(&req.timer);
        Some(req)
    }

    async fn handle_timeout(&mut self, key: i32) {
        // The expired timer is gone from the queue; re-arm or drop the request.
        let Some(req) = self.reqs.get_mut(&key) else {
            return;
        };

        if req.retries_left > 0 {
            req.retries_left -= 1;
            req.timer = self.timers.insert(key, self.config.timeout);
            let payload = req.payload.clone();
            let destination = req.destination;
            tracing::debug!(
                target: "snmp_session::session",
                { snmp.request_id = key, snmp.retries = req.retries_left },
                "retrying request"
            );
            if let Err(e) = self.transport.send_to(&payload, destination).await {
                if let Some(req) = self.unregister(key) {
                    let _ = req.reply.send(Err(e));
                }
            }
            return;
        }

        if let Some(req) = self.reqs.remove(&key) {
            let elapsed = req.first_sent.elapsed();
            tracing::debug!(
                target: "snmp_session::session",
                { snmp.request_id = key, snmp.target = %req.destination, ?elapsed },
                "request timed out"
            );
            let _ = req.reply.send(Err(Error::Timeout {
                target: Some(req.destination),
                elapsed,
                request_id: key,
                retries: self.config.retries,
            }));
        }
    }

    async fn handle_datagram(&mut self, data: Bytes, source: SocketAddr) {
        tracing::trace!(
            target: "snmp_session::session",
            { snmp.source = %source, data = %encode_hex(&data) },
            "received datagram"
        );
        let message = match Message::decode(data.clone()) {
            Ok(message) => message,
            Err(e) => {
                // A readable id ties the failure to its request.
                match Message::peek_req_id(&data).and_then(|key| self.unregister(key)) {
                    Some(req) => {
                        let _ = req.reply.send(Err(e));
                    }
                    None => self.publish(e),
                }
                return;
            }
        };

        let Some(key) = message.req_id() else {
            tracing::debug!(target: "snmp_session::session", { snmp.source = %source }, "ignoring message without request id");
            return;
        };
        let Some(req) = self.unregister(key) else {
            tracing::debug!(target: "snmp_session::session", { snmp.request_id = key }, "no pending request, dropping response");
            return;
        };

        match message {
            Message::Community(msg) => {
                let result = self.community_response(&req, msg);
                let _ = req.reply.send(result);
            }
            Message::V3(msg) => self.v3_response(req, msg, &data).await,
        }
    }

    fn community_response(
        &self,
        req: &PendingRequest,
        msg: CommunityMessage,
    ) -> Result<Vec<VarBind>> {
        if msg.version != self.config.version {
            return Err(Error::invalid_response(format!(
                "Version in request '{}' does not match version in response '{}'",
                self.config.version, msg.version
            )));
        }
        if msg.community != self.config.community {
            return Err(Error::invalid_response(format!(
                "Community '{}' in request does not match community '{}' in response",
                String::from_utf8_lossy(&self.config.community),
                String::from_utf8_lossy(&msg.community)
            )));
        }
        finish_response(req, msg.pdu)
    }

    async fn v3_response(&mut self, req: PendingRequest, mut msg: V3Message, raw: &[u8]) {
        let engine_id = msg.security_params.engine_id.clone();
        let level = msg.security_level();
        let target = Some(req.destination);
        let keys = if level.requires_auth() {
            self.keys_for(&engine_id)
        } else {
            None
        };

        if level.requires_auth() {
            let verified = match keys.as_ref().and_then(|k| k.auth.as_ref()) {
                Some(key) => verify_message(key, raw, msg.auth_offset).map_err(|e| match e {
                    Error::AuthenticationFailed { kind, .. } => Error::auth(target, kind),
                    other => other,
                }),
                None => Err(Error::auth(target, AuthErrorKind::NoCredentials)),
            };
            if let Err(e) = verified {
                let _ = req.reply.send(Err(e));
                return;
            }
        }

        if level.requires_priv() {
            let decrypted = match keys.as_ref().and_then(|k| k.privacy.as_ref()) {
                Some(key) => msg.decrypt(key),
                None => Err(Error::decrypt(target, CryptoErrorKind::NoPrivKey)),
            };
            if let Err(e) = decrypted {
                let _ = req.reply.send(Err(e));
                return;
            }
        }

        let security_params = msg.security_params.clone();
        let Some(pdu) = msg.into_pdu() else {
            let _ = req
                .reply
                .send(Err(Error::decrypt(target, CryptoErrorKind::CipherError)));
            return;
        };

        match pdu {
            Pdu::Report(_) if req.original_pdu.is_some() => {
                self.reissue(req, security_params).await;
            }
            pdu => {
                let result = finish_response(&req, pdu);
                let _ = req.reply.send(result);
            }
        }
    }

    /// Second leg of discovery: send the real PDU under the engine
    /// parameters the Report revealed.
    async fn reissue(&mut self, req: PendingRequest, learned: UsmSecurityParams) {
        let PendingRequest {
            destination,
            reply,
            original_pdu,
            ..
        } = req;
        let (Some(pdu), Some(user)) = (original_pdu, self.config.user.clone()) else {
            let _ = reply.send(Err(Error::invalid_response("Unexpected Report PDU")));
            return;
        };

        let keys = self.keys_for(&learned.engine_id);
        let msg_id = self.unused_id();
        tracing::debug!(
            target: "snmp_session::session",
            {
                snmp.msg_id = msg_id,
                snmp.engine_id = %encode_hex(&learned.engine_id),
                snmp.engine_boots = learned.engine_boots,
                snmp.engine_time = learned.engine_time,
            },
            "engine discovered, reissuing request"
        );

        let message = V3Message::new(
            MsgGlobalData::request(msg_id, user.level),
            UsmSecurityParams::new(
                learned.engine_id.clone(),
                learned.engine_boots,
                learned.engine_time,
                user.name.clone(),
            ),
            ScopedPdu::new(learned.engine_id.clone(), pdu.clone()),
        );
        match message.encode_secured(keys.as_ref()) {
            Ok(payload) => {
                let exchange = Exchange {
                    pdu,
                    original_pdu: None,
                };
                self.dispatch(msg_id, payload, destination, reply, exchange)
                    .await;
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    /// Fail everything still pending and drop all timers.
    fn shutdown(&mut self) {
        tracing::debug!(
            target: "snmp_session::session",
            { pending = self.reqs.len() },
            "closing session"
        );
        for (_, req) in self.reqs.drain() {
            let _ = req.reply.send(Err(Error::SessionClosed));
        }
        self.timers.clear();
        self.emit(SessionEvent::Closed);
    }
}

/// Per-operation handling of a decoded response PDU.
fn finish_response(req: &PendingRequest, pdu: Pdu) -> Result<Vec<VarBind>> {
    match pdu {
        Pdu::Response(response) => {
            response.check_status()?;
            req.check
                .apply(req.pdu_type, &req.request_varbinds, response.varbinds)
        }
        Pdu::Report(_) => Err(Error::invalid_response("Unexpected Report PDU")),
        other => Err(Error::invalid_response(format!(
            "Unknown PDU type '{}' in response",
            other.pdu_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v3::AuthProtocol;

    #[test]
    fn key_cache_is_bounded() {
        let user = UsmUser::auth("u", AuthProtocol::Md5, "maplesyrup");
        let master = UsmKeys::derive(&user).unwrap();
        let mut cache = KeyCache::default();
        let first = Bytes::from_static(b"\x80\x00\x00\x00\x01");
        let expected = master.localize(&first);

        let keys = cache.get(&master, &first);
        assert_eq!(
            keys.auth.as_ref().unwrap().as_bytes(),
            expected.auth.as_ref().unwrap().as_bytes()
        );
        for i in 0..100u32 {
            cache.get(&master, &Bytes::from(i.to_be_bytes().to_vec()));
            assert!(cache.entries.len() <= LOCALIZED_KEYS_CAPACITY);
        }

        // Evicted engines are localized again, to the same key.
        let again = cache.get(&master, &first);
        assert_eq!(
            again.auth.as_ref().unwrap().as_bytes(),
            expected.auth.as_ref().unwrap().as_bytes()
        );
    }
}
