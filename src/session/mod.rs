//! SNMP session: request operations over one UDP socket.
//!
//! A [`Session`] is a cheap handle to a background task that owns the
//! socket, the pending requests and their timers. Every operation sends a
//! command to that task and awaits its own reply, so many requests can be
//! in flight at once and complete in any order.
//!
//! ```rust,no_run
//! use snmp_session::{Session, SessionConfig, Version, oid};
//!
//! # async fn example() -> snmp_session::Result<()> {
//! let config = SessionConfig {
//!     version: Some(Version::V2c),
//!     ..Default::default()
//! };
//! let session = Session::community("192.0.2.10", "public", config).await?;
//! for vb in session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await? {
//!     println!("{vb}");
//! }
//! session.close().await;
//! # Ok(())
//! # }
//! ```

mod actor;
mod bulk;
mod config;
mod notify;
mod request;
mod walk;

pub use bulk::{BulkResult, split_bulk};
pub use config::{
    DEFAULT_MAX_REPETITIONS, DEFAULT_PORT, DEFAULT_RETRIES, DEFAULT_TIMEOUT, DEFAULT_TRAP_PORT,
    SessionBuilder, SessionConfig,
};
pub use notify::NotifyOptions;
pub use walk::Table;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::oid::Oid;
use crate::pdu::{Pdu, TrapType};
use crate::transport::{Transport, UdpTransport};
use crate::util::IdBits;
use crate::v3::{UsmKeys, UsmUser};
use crate::varbind::{VarBind, check_request_values, null_varbinds};
use crate::version::Version;
use actor::{Actor, ActorConfig, Command};

/// GetBulk non-repeaters when the caller has no preference.
pub const DEFAULT_BULK_NON_REPEATERS: i32 = 0;
/// GetBulk max-repetitions when the caller has no preference.
pub const DEFAULT_BULK_MAX_REPETITIONS: i32 = 10;

/// Session events buffered for [`Session::events`].
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Session-level notification, for problems no single request owns.
#[derive(Debug)]
pub enum SessionEvent {
    /// A datagram could not be decoded, or receiving failed.
    Error(Error),
    /// The session shut down.
    Closed,
}

/// Handle to a running SNMP session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    commands: mpsc::UnboundedSender<Command>,
    events: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
    target: SocketAddr,
    version: Version,
    trap_port: u16,
    id_bits: IdBits,
    max_repetitions: i32,
    started: Instant,
}

impl Session {
    /// Start a v1/v2c session.
    ///
    /// The version defaults to v1; asking for v3 here is an error.
    pub async fn community(
        target: &str,
        community: impl Into<Bytes>,
        mut config: SessionConfig,
    ) -> Result<Self> {
        if let Some(version) = config.version.filter(|v| !v.is_community()) {
            return Err(Error::Config(format!(
                "SNMP community session requested but version '{version}' specified"
            )));
        }
        config.version = Some(config.version.unwrap_or(Version::V1));
        config.community = community.into();
        config.usm_user = None;
        Self::start(target, config).await
    }

    /// Start a v3 session for `user`.
    pub async fn v3(target: &str, user: UsmUser, mut config: SessionConfig) -> Result<Self> {
        if let Some(version) = config.version.filter(|v| *v != Version::V3) {
            return Err(Error::Config(format!(
                "SNMPv3 session requested but version '{version}' specified"
            )));
        }
        config.version = Some(Version::V3);
        config.usm_user = Some(user);
        Self::start(target, config).await
    }

    /// Start a session from a builder or configuration.
    pub fn builder(target: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(target)
    }

    pub(crate) async fn start(target: &str, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let target = resolve(target, config.port).await?;
        let transport = UdpTransport::bind(target, config.source_address, config.source_port)?;
        Self::with_transport(transport, target, config)
    }

    /// Run a session over a caller-supplied transport.
    ///
    /// Requests go to `target`; notifications to the same host on the
    /// configured trap port.
    pub fn with_transport<T: Transport>(
        transport: T,
        target: SocketAddr,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let version = config.effective_version();
        // Password-to-key runs once here; localization happens per engine.
        let keys = config.usm_user.as_ref().map(UsmKeys::derive).transpose()?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let actor = Actor::new(
            transport,
            ActorConfig {
                host: target.ip(),
                version,
                community: config.community.clone(),
                retries: config.retries,
                timeout: config.timeout,
                id_bits: config.id_bits,
                user: config.usm_user.clone(),
                keys,
            },
            commands_rx,
            events_tx,
        );
        tokio::spawn(actor.run());

        tracing::debug!(
            target: "snmp_session::session",
            { snmp.target = %target, snmp.version = %version },
            "session started"
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                commands: commands_tx,
                events: Mutex::new(Some(events_rx)),
                target,
                version,
                trap_port: config.trap_port,
                id_bits: config.id_bits,
                max_repetitions: config.max_repetitions,
                started: Instant::now(),
            }),
        })
    }

    /// Agent address requests are sent to.
    pub fn target(&self) -> SocketAddr {
        self.inner.target
    }

    pub fn version(&self) -> Version {
        self.inner.version
    }

    /// Session-level events. The receiver can be taken once.
    ///
    /// The queue holds [`EVENT_QUEUE_CAPACITY`] events; further events are
    /// dropped until the receiver catches up.
    pub fn events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.inner.events.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Time since the session started, in hundredths of a second.
    ///
    /// Wraps modulo 2^32 like a TimeTicks counter (about 497 days).
    pub fn uptime(&self) -> u32 {
        let ticks = self.inner.started.elapsed().as_millis() / 10;
        (ticks % (1u128 << 32)) as u32
    }

    fn next_request_id(&self) -> i32 {
        self.inner.id_bits.generate()
    }

    pub(crate) async fn request(&self, pdu: Pdu, port: u16) -> Result<Vec<VarBind>> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Request { pdu, port, reply })
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    async fn notify(&self, pdu: Pdu) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Notify {
                pdu,
                port: self.inner.trap_port,
                reply,
            })
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    fn port(&self) -> u16 {
        self.inner.target.port()
    }

    /// GET the given OIDs. The response must echo them in order.
    #[instrument(skip_all, err, fields(snmp.target = %self.inner.target, snmp.oid_count = oids.len()))]
    pub async fn get(&self, oids: &[Oid]) -> Result<Vec<VarBind>> {
        let pdu = Pdu::Get {
            request_id: self.next_request_id(),
            varbinds: null_varbinds(oids),
        };
        self.request(pdu, self.port()).await
    }

    /// GETNEXT for the given OIDs. Each returned OID follows its request
    /// OID unless the value is an exception.
    #[instrument(skip_all, err, fields(snmp.target = %self.inner.target, snmp.oid_count = oids.len()))]
    pub async fn get_next(&self, oids: &[Oid]) -> Result<Vec<VarBind>> {
        let pdu = Pdu::GetNext {
            request_id: self.next_request_id(),
            varbinds: null_varbinds(oids),
        };
        self.request(pdu, self.port()).await
    }

    /// GETBULK, split into one [`BulkResult::Scalar`] per non-repeater and
    /// one [`BulkResult::Column`] per repeated OID.
    ///
    /// Callers without a preference use [`DEFAULT_BULK_NON_REPEATERS`] and
    /// [`DEFAULT_BULK_MAX_REPETITIONS`].
    #[instrument(skip_all, err, fields(
        snmp.target = %self.inner.target,
        snmp.oid_count = oids.len(),
        snmp.non_repeaters = non_repeaters,
        snmp.max_repetitions = max_repetitions
    ))]
    pub async fn get_bulk(
        &self,
        oids: &[Oid],
        non_repeaters: i32,
        max_repetitions: i32,
    ) -> Result<Vec<BulkResult>> {
        let request = null_varbinds(oids);
        let pdu = Pdu::GetBulk {
            request_id: self.next_request_id(),
            non_repeaters,
            max_repetitions,
            varbinds: request.clone(),
        };
        let response = self.request(pdu, self.port()).await?;
        split_bulk(&request, non_repeaters.max(0) as usize, response)
    }

    /// SET the given varbinds. Exception values cannot be sent.
    #[instrument(skip_all, err, fields(snmp.target = %self.inner.target, snmp.oid_count = varbinds.len()))]
    pub async fn set(&self, varbinds: &[VarBind]) -> Result<Vec<VarBind>> {
        check_request_values(varbinds)?;
        let pdu = Pdu::Set {
            request_id: self.next_request_id(),
            varbinds: varbinds.to_vec(),
        };
        self.request(pdu, self.port()).await
    }

    /// Send an InformRequest to the trap port and wait for the receiver's
    /// acknowledgement.
    #[instrument(skip_all, err, fields(snmp.target = %self.inner.target))]
    pub async fn inform(
        &self,
        trap: impl Into<TrapType>,
        varbinds: &[VarBind],
        options: NotifyOptions,
    ) -> Result<Vec<VarBind>> {
        check_request_values(varbinds)?;
        let pdu = notify::inform_pdu(
            self.next_request_id(),
            &trap.into(),
            varbinds,
            &options,
            self.uptime(),
        );
        self.request(pdu, self.inner.trap_port).await
    }

    /// Send a trap to the trap port. Completes once the datagram is sent.
    #[instrument(skip_all, err, fields(snmp.target = %self.inner.target))]
    pub async fn trap(
        &self,
        trap: impl Into<TrapType>,
        varbinds: &[VarBind],
        options: NotifyOptions,
    ) -> Result<()> {
        check_request_values(varbinds)?;
        let pdu = notify::trap_pdu(
            self.inner.version,
            self.next_request_id(),
            &trap.into(),
            varbinds,
            &options,
            self.uptime(),
        )?;
        self.notify(pdu).await
    }

    /// Stop the session. Pending requests fail with [`Error::SessionClosed`].
    pub async fn close(&self) {
        let (done, rx) = oneshot::channel();
        if self.inner.commands.send(Command::Close { done }).is_ok() {
            let _ = rx.await;
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.inner.target)
            .field("version", &self.inner.version)
            .finish_non_exhaustive()
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| Error::Io {
            target: None,
            source,
        })?;
    addrs
        .next()
        .ok_or_else(|| Error::Config(format!("could not resolve target '{host}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CommunityMessage, Message};
    use crate::oid;
    use crate::pdu::ResponsePdu;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    async fn agent_socket() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    async fn session_for(agent: &UdpSocket, retries: u32) -> Session {
        let config = SessionConfig {
            version: Some(Version::V2c),
            port: agent.local_addr().unwrap().port(),
            retries,
            timeout: Duration::from_millis(200),
            ..Default::default()
        };
        Session::community("127.0.0.1", "public", config).await.unwrap()
    }

    async fn recv_request(agent: &UdpSocket) -> (CommunityMessage, SocketAddr) {
        let mut buf = vec![0u8; 2048];
        let (len, from) = agent.recv_from(&mut buf).await.unwrap();
        match Message::decode(Bytes::copy_from_slice(&buf[..len])).unwrap() {
            Message::Community(msg) => (msg, from),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn community_rejects_v3() {
        let config = SessionConfig {
            version: Some(Version::V3),
            ..Default::default()
        };
        assert!(matches!(
            Session::community("127.0.0.1", "public", config).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn v3_rejects_community_version() {
        let config = SessionConfig {
            version: Some(Version::V2c),
            ..Default::default()
        };
        assert!(matches!(
            Session::v3("127.0.0.1", UsmUser::new("u"), config).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn retries_then_times_out() {
        let agent = agent_socket().await;
        let session = session_for(&agent, 2).await;

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await }
        });

        let (first, _) = recv_request(&agent).await;
        for _ in 0..2 {
            let (again, _) = recv_request(&agent).await;
            assert_eq!(again.pdu.request_id(), first.pdu.request_id());
        }

        match pending.await.unwrap() {
            Err(Error::Timeout {
                request_id,
                retries,
                ..
            }) => {
                assert_eq!(Some(request_id), first.pdu.request_id());
                assert_eq!(retries, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_fails_pending_requests() {
        let agent = agent_socket().await;
        let session = session_for(&agent, 5).await;
        let mut events = session.events().unwrap();
        assert!(session.events().is_none());

        let a = tokio::spawn({
            let session = session.clone();
            async move { session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await }
        });
        let b = tokio::spawn({
            let session = session.clone();
            async move { session.get_next(&[oid!(1, 3, 6, 1, 2, 1, 1)]).await }
        });
        recv_request(&agent).await;
        recv_request(&agent).await;

        session.close().await;
        for handle in [a, b] {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, Error::SessionClosed));
            assert_eq!(err.to_string(), "socket closed");
        }
        assert!(matches!(events.recv().await, Some(SessionEvent::Closed)));
        assert!(matches!(
            session.get(&[oid!(1, 3)]).await,
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn garbage_datagram_is_a_session_event() {
        let agent = agent_socket().await;
        let session = session_for(&agent, 0).await;
        let mut events = session.events().unwrap();

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)]).await }
        });
        let (request, from) = recv_request(&agent).await;
        agent.send_to(&[0xFF, 0x00], from).await.unwrap();
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::Error(Error::Decode { .. }))
        ));

        // The request is still pending and completes normally.
        let response = CommunityMessage::new(
            Version::V2c,
            Bytes::from_static(b"public"),
            Pdu::Response(ResponsePdu {
                request_id: request.pdu.request_id().unwrap(),
                error_status: 0,
                error_index: 0,
                varbinds: vec![VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 5, 0), "host")],
            }),
        );
        agent.send_to(&response.encode(), from).await.unwrap();
        let varbinds = pending.await.unwrap().unwrap();
        assert_eq!(varbinds[0].value.as_str(), Some("host"));
    }

    #[tokio::test]
    async fn community_mismatch_fails_request() {
        let agent = agent_socket().await;
        let session = session_for(&agent, 0).await;

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)]).await }
        });
        let (request, from) = recv_request(&agent).await;
        let response = CommunityMessage::new(
            Version::V2c,
            Bytes::from_static(b"private"),
            Pdu::Response(ResponsePdu {
                request_id: request.pdu.request_id().unwrap(),
                error_status: 0,
                error_index: 0,
                varbinds: request.pdu.varbinds().to_vec(),
            }),
        );
        agent.send_to(&response.encode(), from).await.unwrap();
        let err = pending.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("Community 'public' in request"));
    }

    #[tokio::test]
    async fn set_rejects_exception_values() {
        let agent = agent_socket().await;
        let session = session_for(&agent, 0).await;
        let err = session
            .set(&[VarBind::new(
                oid!(1, 3, 6, 1, 2, 1, 1, 5, 0),
                crate::value::Value::NoSuchObject,
            )])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encode { .. }));
    }

    fn echo(request: &CommunityMessage, value: crate::value::Value) -> CommunityMessage {
        let varbinds = request
            .pdu
            .varbinds()
            .iter()
            .map(|vb| VarBind::new(vb.oid.clone(), value.clone()))
            .collect();
        CommunityMessage::new(
            Version::V2c,
            Bytes::from_static(b"public"),
            Pdu::Response(ResponsePdu {
                request_id: request.pdu.request_id().unwrap(),
                error_status: 0,
                error_index: 0,
                varbinds,
            }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn uptime_wraps_like_timeticks() {
        let agent = agent_socket().await;
        let session = session_for(&agent, 0).await;

        tokio::time::advance(Duration::from_millis(1_234_560)).await;
        assert_eq!(session.uptime(), 123_456);
        // 2^32 hundredths later the counter is back where it was.
        tokio::time::advance(Duration::from_millis(10 * (1u64 << 32))).await;
        assert_eq!(session.uptime(), 123_456);
    }

    #[tokio::test]
    async fn colliding_request_id_is_redrawn() {
        let agent = agent_socket().await;
        let session = session_for(&agent, 0).await;
        let get = |oid: Oid| Pdu::Get {
            request_id: 7,
            varbinds: null_varbinds(&[oid]),
        };

        let first = tokio::spawn({
            let session = session.clone();
            let pdu = get(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0));
            async move { session.request(pdu, session.port()).await }
        });
        let (a, from) = recv_request(&agent).await;
        let second = tokio::spawn({
            let session = session.clone();
            let pdu = get(oid!(1, 3, 6, 1, 2, 1, 1, 5, 0));
            async move { session.request(pdu, session.port()).await }
        });
        let (b, _) = recv_request(&agent).await;

        assert_eq!(a.pdu.request_id(), Some(7));
        assert_ne!(b.pdu.request_id(), Some(7));

        // Answer the second first; both callers get their own reply.
        agent
            .send_to(&echo(&b, crate::value::Value::from("b")).encode(), from)
            .await
            .unwrap();
        agent
            .send_to(&echo(&a, crate::value::Value::from("a")).encode(), from)
            .await
            .unwrap();
        assert_eq!(first.await.unwrap().unwrap()[0].value.as_str(), Some("a"));
        assert_eq!(second.await.unwrap().unwrap()[0].value.as_str(), Some("b"));
    }

    #[tokio::test]
    async fn undecodable_varbind_fails_its_request() {
        let agent = agent_socket().await;
        let session = session_for(&agent, 0).await;
        let mut events = session.events().unwrap();

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.get(&[oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 10, 1)]).await }
        });
        let (request, from) = recv_request(&agent).await;

        let mut reply = echo(&request, crate::value::Value::Counter32(5))
            .encode()
            .to_vec();
        let tag = reply.iter().rposition(|b| *b == 0x41).unwrap();
        reply[tag] = 0x47;
        let started = Instant::now();
        agent.send_to(&reply, from).await.unwrap();

        let err = pending.await.unwrap().unwrap_err();
        assert!(
            matches!(
                err,
                Error::Decode {
                    kind: crate::error::DecodeErrorKind::UnknownValueType(0x47),
                    ..
                }
            ),
            "{err:?}"
        );
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn unread_events_are_bounded() {
        let agent = agent_socket().await;
        let session = session_for(&agent, 0).await;

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)]).await }
        });
        let (request, from) = recv_request(&agent).await;
        for _ in 0..EVENT_QUEUE_CAPACITY + 16 {
            agent.send_to(&[0xFF, 0x00], from).await.unwrap();
        }
        // Queued behind the garbage, so every datagram was handled by now.
        agent
            .send_to(&echo(&request, crate::value::Value::from("host")).encode(), from)
            .await
            .unwrap();
        pending.await.unwrap().unwrap();

        let mut events = session.events().unwrap();
        let mut queued = 0;
        while let Ok(event) = events.try_recv() {
            assert!(matches!(event, SessionEvent::Error(Error::Decode { .. })));
            queued += 1;
        }
        assert_eq!(queued, EVENT_QUEUE_CAPACITY);
    }
}
