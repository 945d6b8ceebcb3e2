//! Compact peer records from the tracker response.
//!
//! The tracker advertises peers as a byte string of 6-byte entries, a
//! big-endian IPv4 address followed by a big-endian port.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ReadBytesExt};

const COMPACT_PEER_LEN: usize = 6;

/// One peer in the swarm: an IPv4 address and a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Peer {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Parse a compact peer list, 6 bytes per peer.
pub fn from_compact(bytes: &[u8]) -> Result<Vec<Peer>> {
    if !bytes.len().is_multiple_of(COMPACT_PEER_LEN) {
        return Err(anyhow!(
            "tracker sent a peer list of {} bytes, not a multiple of {}",
            bytes.len(),
            COMPACT_PEER_LEN
        ));
    }

    let mut peers = Vec::with_capacity(bytes.len() / COMPACT_PEER_LEN);
    for chunk in bytes.chunks_exact(COMPACT_PEER_LEN) {
        let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
        let mut port_bytes = &chunk[4..];
        let port = port_bytes.read_u16::<BigEndian>()?;
        peers.push(Peer { ip, port });
    }

    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_six_byte_records() {
        let raw = vec![192, 168, 1, 1, 0x1A, 0xE1, 10, 0, 0, 7, 0x00, 0x50];
        let peers = from_compact(&raw).unwrap();

        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].ip, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(peers[0].port, 6881);
        assert_eq!(peers[1].ip, Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(peers[1].port, 80);
    }

    #[test]
    fn rejects_truncated_records() {
        assert!(from_compact(&[1, 2, 3, 4, 5, 6, 7]).is_err());
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(from_compact(&[]).unwrap().is_empty());
    }
}
