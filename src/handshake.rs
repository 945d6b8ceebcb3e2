//! The 68-byte handshake exchanged before any wire messages.
//!
//! Layout: `[pstrlen=19][pstr="BitTorrent protocol"][8 reserved bytes]
//! [info_hash: 20][peer_id: 20]`. The info hash binds the connection to one
//! torrent; a peer answering with a different hash is serving a different
//! file and must be dropped.

use std::io::Read;

use crate::error::PeerError;

const PROTOCOL_ID: &[u8] = b"BitTorrent protocol";

/// A decoded handshake frame.
#[derive(Debug)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Handshake {
        Handshake { info_hash, peer_id }
    }

    /// Encode as a single 68-byte frame.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(49 + PROTOCOL_ID.len());
        buf.push(PROTOCOL_ID.len() as u8);
        buf.extend_from_slice(PROTOCOL_ID);
        buf.extend_from_slice(&[0; 8]);
        buf.extend_from_slice(&self.info_hash);
        buf.extend_from_slice(&self.peer_id);
        buf
    }

    /// Read and decode the handshake sent by the remote peer.
    ///
    /// Accepts any non-zero pstrlen and reads `48 + pstrlen` further bytes.
    /// Validating the info hash is left to the caller.
    pub fn read<R: Read>(stream: &mut R) -> Result<Handshake, PeerError> {
        let mut first = [0; 1];
        stream
            .read_exact(&mut first)
            .map_err(|e| PeerError::Handshake(format!("could not read pstrlen: {}", e)))?;

        let pstrlen = first[0] as usize;
        if pstrlen == 0 {
            return Err(PeerError::Handshake("peer sent a zero pstrlen".to_string()));
        }

        let mut rest = vec![0; 48 + pstrlen];
        stream
            .read_exact(&mut rest)
            .map_err(|e| PeerError::Handshake(format!("short handshake: {}", e)))?;

        let mut info_hash = [0; 20];
        info_hash.copy_from_slice(&rest[pstrlen + 8..pstrlen + 28]);
        let mut peer_id = [0; 20];
        peer_id.copy_from_slice(&rest[pstrlen + 28..pstrlen + 48]);

        Ok(Handshake { info_hash, peer_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    #[test]
    fn wire_layout() {
        let encoded = Handshake::new([0xAA; 20], [0xBB; 20]).serialize();

        assert_eq!(encoded.len(), 68);
        assert_eq!(encoded[0], 0x13);
        assert_eq!(&encoded[1..20], b"BitTorrent protocol");
        assert_eq!(&encoded[20..28], &[0; 8]);
        assert_eq!(&encoded[28..48], &[0xAA; 20]);
        assert_eq!(&encoded[48..68], &[0xBB; 20]);
    }

    #[test]
    fn round_trip() {
        let encoded = Handshake::new([0x11; 20], [0x22; 20]).serialize();
        let decoded = Handshake::read(&mut Cursor::new(encoded)).unwrap();
        assert_eq!(decoded.info_hash, [0x11; 20]);
        assert_eq!(decoded.peer_id, [0x22; 20]);
    }

    #[test]
    fn rejects_zero_pstrlen() {
        let err = Handshake::read(&mut Cursor::new(vec![0u8; 68])).unwrap_err();
        assert!(matches!(err, PeerError::Handshake(_)));
    }

    #[test]
    fn rejects_short_frame() {
        let mut encoded = Handshake::new([0x11; 20], [0x22; 20]).serialize();
        encoded.truncate(40);
        let err = Handshake::read(&mut Cursor::new(encoded)).unwrap_err();
        assert!(matches!(err, PeerError::Handshake(_)));
    }
}
