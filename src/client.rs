//! One TCP connection to a remote peer.
//!
//! A `Client` owns the socket for exactly one peer. It dials with a connect
//! timeout, performs the handshake under a 3 second deadline, receives the
//! mandatory bitfield under a 5 second deadline, and then exposes typed
//! send and receive operations for the wire messages. Deadlines are scoped
//! to one exchange and cleared afterwards.

use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt};

use crate::bitfield::Bitfield;
use crate::error::PeerError;
use crate::handshake::Handshake;
use crate::message::{
    self, Message, MESSAGE_BITFIELD, MESSAGE_CHOKE, MESSAGE_HAVE, MESSAGE_INTERESTED,
    MESSAGE_NOT_INTERESTED, MESSAGE_REQUEST, MESSAGE_UNCHOKE,
};
use crate::peer::Peer;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const BITFIELD_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected, handshaken peer.
#[derive(Debug)]
pub struct Client {
    conn: TcpStream,
    bitfield: Bitfield,
    choked: bool,
}

impl Client {
    /// Dial `peer`, exchange handshakes, and receive its bitfield.
    ///
    /// The peer starts out choking us. Any failure drops the connection.
    pub fn connect(
        peer: Peer,
        peer_id: [u8; 20],
        info_hash: [u8; 20],
        num_pieces: u32,
    ) -> Result<Client, PeerError> {
        let mut conn = TcpStream::connect_timeout(&peer.addr(), CONNECT_TIMEOUT)?;

        set_deadline(&conn, Some(HANDSHAKE_TIMEOUT))?;
        exchange_handshake(&mut conn, peer_id, info_hash)?;
        set_deadline(&conn, None)?;

        set_deadline(&conn, Some(BITFIELD_TIMEOUT))?;
        let bitfield = receive_bitfield(&mut conn, num_pieces)?;
        set_deadline(&conn, None)?;

        debug!("handshake and bitfield complete for peer {}", peer);

        Ok(Client {
            conn,
            bitfield,
            choked: true,
        })
    }

    /// Whether the peer is currently choking us.
    pub fn is_choked(&self) -> bool {
        self.choked
    }

    pub fn set_choked(&mut self, choked: bool) {
        self.choked = choked;
    }

    /// Whether the peer advertises piece `index`.
    pub fn has_piece(&self, index: u32) -> bool {
        self.bitfield.has(index).unwrap_or(false)
    }

    /// Record a Have announcement from the peer.
    pub fn record_have(&mut self, index: u32) -> Result<(), PeerError> {
        self.bitfield.set(index)
    }

    /// Set or clear the read and write deadlines on the connection.
    pub fn set_deadline(&self, timeout: Option<Duration>) -> Result<(), PeerError> {
        set_deadline(&self.conn, timeout)
    }

    #[allow(dead_code)]
    pub fn send_choke(&mut self) -> Result<(), PeerError> {
        self.send_message(&Message::new(MESSAGE_CHOKE))
    }

    pub fn send_unchoke(&mut self) -> Result<(), PeerError> {
        self.send_message(&Message::new(MESSAGE_UNCHOKE))
    }

    pub fn send_interested(&mut self) -> Result<(), PeerError> {
        self.send_message(&Message::new(MESSAGE_INTERESTED))
    }

    #[allow(dead_code)]
    pub fn send_not_interested(&mut self) -> Result<(), PeerError> {
        self.send_message(&Message::new(MESSAGE_NOT_INTERESTED))
    }

    /// Tell the peer we now have piece `index`.
    pub fn send_have(&mut self, index: u32) -> Result<(), PeerError> {
        let mut payload = vec![];
        payload.write_u32::<BigEndian>(index)?;
        self.send_message(&Message::with_payload(MESSAGE_HAVE, payload))
    }

    /// Ask the peer for `length` bytes of piece `index` starting at `begin`.
    pub fn send_request(&mut self, index: u32, begin: u32, length: u32) -> Result<(), PeerError> {
        let mut payload = vec![];
        payload.write_u32::<BigEndian>(index)?;
        payload.write_u32::<BigEndian>(begin)?;
        payload.write_u32::<BigEndian>(length)?;
        self.send_message(&Message::with_payload(MESSAGE_REQUEST, payload))
    }

    /// Read the next message from the peer; `None` is a keep-alive.
    pub fn read(&mut self) -> Result<Option<Message>, PeerError> {
        message::read_message(&mut self.conn)
    }

    fn send_message(&mut self, msg: &Message) -> Result<(), PeerError> {
        self.conn.write_all(&msg.serialize()?)?;
        Ok(())
    }
}

fn set_deadline(conn: &TcpStream, timeout: Option<Duration>) -> Result<(), PeerError> {
    conn.set_read_timeout(timeout)?;
    conn.set_write_timeout(timeout)?;
    Ok(())
}

fn exchange_handshake(
    conn: &mut TcpStream,
    peer_id: [u8; 20],
    info_hash: [u8; 20],
) -> Result<(), PeerError> {
    let ours = Handshake::new(info_hash, peer_id);
    conn.write_all(&ours.serialize())
        .map_err(|e| PeerError::Handshake(format!("could not send handshake: {}", e)))?;

    // The peer chooses its own id; only the info hash is checked.
    let theirs = Handshake::read(conn)?;
    if theirs.info_hash != info_hash {
        return Err(PeerError::Handshake("info hash mismatch".to_string()));
    }

    Ok(())
}

fn receive_bitfield(conn: &mut TcpStream, num_pieces: u32) -> Result<Bitfield, PeerError> {
    match message::read_message(conn)? {
        None => Err(PeerError::NoBitfield("a keep-alive".to_string())),
        Some(msg) if msg.id != MESSAGE_BITFIELD => {
            Err(PeerError::NoBitfield(format!("message id {}", msg.id)))
        }
        Some(msg) => Bitfield::from_payload(msg.payload, num_pieces),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Read;
    use std::net::{Ipv4Addr, TcpListener};
    use std::thread;

    fn local_peer(listener: &TcpListener) -> Peer {
        Peer {
            ip: Ipv4Addr::LOCALHOST,
            port: listener.local_addr().unwrap().port(),
        }
    }

    // Accepts one connection, consumes the client handshake, then runs `reply`.
    fn serve_once<F>(reply: F) -> Peer
    where
        F: FnOnce(&mut TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let peer = local_peer(&listener);

        thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut handshake = [0u8; 68];
            conn.read_exact(&mut handshake).unwrap();
            reply(&mut conn);
        });

        peer
    }

    #[test]
    fn connect_rejects_wrong_info_hash() {
        let peer = serve_once(|conn| {
            let reply = Handshake::new([0xEE; 20], [0xCC; 20]).serialize();
            conn.write_all(&reply).unwrap();
        });

        let err = Client::connect(peer, [0xBB; 20], [0xAA; 20], 8).unwrap_err();
        assert!(matches!(err, PeerError::Handshake(_)));
    }

    #[test]
    fn connect_requires_a_bitfield_first() {
        let peer = serve_once(|conn| {
            let reply = Handshake::new([0xAA; 20], [0xCC; 20]).serialize();
            conn.write_all(&reply).unwrap();
            let have = Message::with_payload(MESSAGE_HAVE, vec![0, 0, 0, 1]);
            conn.write_all(&have.serialize().unwrap()).unwrap();
        });

        let err = Client::connect(peer, [0xBB; 20], [0xAA; 20], 8).unwrap_err();
        assert!(matches!(err, PeerError::NoBitfield(_)));
    }

    #[test]
    fn connect_rejects_keep_alive_before_bitfield() {
        let peer = serve_once(|conn| {
            let reply = Handshake::new([0xAA; 20], [0xCC; 20]).serialize();
            conn.write_all(&reply).unwrap();
            conn.write_all(&message::keep_alive()).unwrap();
        });

        let err = Client::connect(peer, [0xBB; 20], [0xAA; 20], 8).unwrap_err();
        assert!(matches!(err, PeerError::NoBitfield(_)));
    }

    #[test]
    fn connect_rejects_short_bitfield() {
        let peer = serve_once(|conn| {
            let reply = Handshake::new([0xAA; 20], [0xCC; 20]).serialize();
            conn.write_all(&reply).unwrap();
            // 16 pieces need two bytes, send only one.
            let bitfield = Message::with_payload(MESSAGE_BITFIELD, vec![0xFF]);
            conn.write_all(&bitfield.serialize().unwrap()).unwrap();
        });

        let err = Client::connect(peer, [0xBB; 20], [0xAA; 20], 16).unwrap_err();
        assert!(matches!(
            err,
            PeerError::BadBitfield { expected: 2, actual: 1 }
        ));
    }

    #[test]
    fn connect_accepts_a_valid_peer() {
        let peer = serve_once(|conn| {
            let reply = Handshake::new([0xAA; 20], [0xCC; 20]).serialize();
            conn.write_all(&reply).unwrap();
            let bitfield = Message::with_payload(MESSAGE_BITFIELD, vec![0b10100000]);
            conn.write_all(&bitfield.serialize().unwrap()).unwrap();
        });

        let client = Client::connect(peer, [0xBB; 20], [0xAA; 20], 8).unwrap();
        assert!(client.is_choked());
        assert!(client.has_piece(0));
        assert!(!client.has_piece(1));
        assert!(client.has_piece(2));
    }
}
