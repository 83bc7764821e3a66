//! Transport layer abstraction.
//!
//! The session treats the network as "send bytes to an address" and
//! "receive the next datagram from anyone". Source addresses are reported
//! but not filtered.

mod udp;

pub use udp::UdpTransport;

use crate::error::Result;
use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;

/// Largest datagram accepted from the network.
pub const MAX_DATAGRAM: usize = 65535;

/// Datagram transport owned by a session's event loop.
pub trait Transport: Send + Sync + 'static {
    /// Send one datagram to `target`.
    fn send_to(&self, data: &[u8], target: SocketAddr) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next inbound datagram.
    ///
    /// Must be cancel safe; the event loop races it against commands and
    /// timers.
    fn recv_from(&self) -> impl Future<Output = Result<(Bytes, SocketAddr)>> + Send;

    /// Local bind address.
    fn local_addr(&self) -> SocketAddr;
}
