//! Internal utilities.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Create and bind a UDP socket.
///
/// IPv6 sockets get `IPV6_V6ONLY` so they never see IPv4-mapped traffic.
pub(crate) fn bind_udp_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

/// Local address to bind for talking to `target`.
///
/// Without an explicit source address the wildcard of the target's family
/// is used; a port of 0 asks for an ephemeral port.
pub(crate) fn local_bind_addr(
    target: SocketAddr,
    source_address: Option<IpAddr>,
    source_port: Option<u16>,
) -> SocketAddr {
    let ip = source_address.unwrap_or(if target.is_ipv6() {
        IpAddr::V6(Ipv6Addr::UNSPECIFIED)
    } else {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    });
    SocketAddr::new(ip, source_port.unwrap_or(0))
}

/// Width of generated request ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdBits {
    /// Ids below 65535, for agents that reject large values.
    Sixteen,
    #[default]
    ThirtyTwo,
}

impl IdBits {
    /// Draw a random request id.
    ///
    /// Ids are independent draws rather than a counter so separate sessions
    /// do not walk the same sequence.
    pub fn generate(self) -> i32 {
        let raw = random_u32();
        match self {
            IdBits::Sixteen => (raw % 65535) as i32,
            IdBits::ThirtyTwo => (raw & 0x7FFF_FFFF) as i32,
        }
    }
}

fn random_u32() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::fill(&mut buf).is_err() {
        // OS entropy is unavailable; fall back to the clock so ids still vary.
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        return nanos;
    }
    u32::from_be_bytes(buf)
}

/// Lower-case hex, used for log fields and value display.
pub fn encode_hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0F) as usize] as char);
    }
    out
}
