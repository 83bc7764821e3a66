//! UDP transport implementation.

use super::{MAX_DATAGRAM, Transport};
use crate::error::{Error, Result};
use crate::util::{bind_udp_socket, local_bind_addr};
use bytes::{Bytes, BytesMut};
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;

/// Unconnected UDP socket.
///
/// Requests and notifications go to different ports of the same host, so
/// the socket is never connected to a single peer.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind a socket suitable for talking to `target`.
    pub fn bind(
        target: SocketAddr,
        source_address: Option<IpAddr>,
        source_port: Option<u16>,
    ) -> Result<Self> {
        let addr = local_bind_addr(target, source_address, source_port);
        let io_err = |source| Error::Io {
            target: Some(target),
            source,
        };

        let socket = bind_udp_socket(addr).map_err(io_err)?;
        let local_addr = socket.local_addr().map_err(io_err)?;

        tracing::debug!(
            target: "snmp_session::transport",
            { snmp.target = %target, snmp.local_addr = %local_addr },
            "UDP transport bound"
        );

        Ok(Self { socket, local_addr })
    }
}

impl Transport for UdpTransport {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        tracing::trace!(
            target: "snmp_session::transport",
            { snmp.target = %target, snmp.bytes = data.len() },
            "UDP send"
        );
        self.socket
            .send_to(data, target)
            .await
            .map_err(|source| Error::Io {
                target: Some(target),
                source,
            })?;
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Bytes, SocketAddr)> {
        let mut buf = BytesMut::zeroed(MAX_DATAGRAM);
        let (len, source) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|source| Error::Io {
                target: None,
                source,
            })?;
        buf.truncate(len);
        tracing::trace!(
            target: "snmp_session::transport",
            { snmp.source = %source, snmp.bytes = len },
            "UDP recv"
        );
        Ok((buf.freeze(), source))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
