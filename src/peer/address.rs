//! Peer addresses

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use crate::error::TorrentError;

/// Size of one peer in the compact tracker format
pub const COMPACT_PEER_LEN: usize = 6;

/// IPv4 address and port of a candidate peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Decode the compact format: 4 address octets then a big-endian port
    pub fn from_compact(data: &[u8]) -> Result<Vec<Self>, TorrentError> {
        if data.len() % COMPACT_PEER_LEN != 0 {
            return Err(TorrentError::tracker_error(format!(
                "compact peer list length {} is not a multiple of {}",
                data.len(),
                COMPACT_PEER_LEN
            )));
        }

        Ok(data
            .chunks_exact(COMPACT_PEER_LEN)
            .map(|c| Self::new(Ipv4Addr::new(c[0], c[1], c[2], c[3]), u16::from_be_bytes([c[4], c[5]])))
            .collect())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = TorrentError;

    /// Parse `ip:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddrV4 = s.trim().parse()?;
        Ok(Self::new(*addr.ip(), addr.port()))
    }
}

impl From<SocketAddrV4> for PeerAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}
