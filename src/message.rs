//! Peer wire message codec.
//!
//! Every message is a 4-byte big-endian length prefix followed by a one-byte
//! id and a payload of `length - 1` bytes. A zero length prefix is a
//! keep-alive and carries no id or payload.
//!
//! | id | message |
//! |----|---------|
//! | 0 | Choke |
//! | 1 | Unchoke |
//! | 2 | Interested |
//! | 3 | NotInterested |
//! | 4 | Have (u32 piece index) |
//! | 5 | Bitfield (packed bits) |
//! | 6 | Request (u32 index, u32 begin, u32 length) |
//! | 7 | Piece (u32 index, u32 begin, block bytes) |
//! | 8 | Cancel (same layout as Request) |
//! | 9 | Port |

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::PeerError;

pub const MESSAGE_CHOKE: u8 = 0;
pub const MESSAGE_UNCHOKE: u8 = 1;
pub const MESSAGE_INTERESTED: u8 = 2;
pub const MESSAGE_NOT_INTERESTED: u8 = 3;
pub const MESSAGE_HAVE: u8 = 4;
pub const MESSAGE_BITFIELD: u8 = 5;
pub const MESSAGE_REQUEST: u8 = 6;
pub const MESSAGE_PIECE: u8 = 7;
#[allow(dead_code)]
pub const MESSAGE_CANCEL: u8 = 8;
#[allow(dead_code)]
pub const MESSAGE_PORT: u8 = 9;

/// A wire message other than a keep-alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u8,
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a message without a payload.
    pub fn new(id: u8) -> Message {
        Message {
            id,
            payload: vec![],
        }
    }

    /// Build a message with a payload.
    pub fn with_payload(id: u8, payload: Vec<u8>) -> Message {
        Message { id, payload }
    }

    /// Encode as `[len = 1 + |payload| BE][id][payload]`.
    pub fn serialize(&self) -> Result<Vec<u8>, PeerError> {
        let mut buf = Vec::with_capacity(5 + self.payload.len());
        buf.write_u32::<BigEndian>(1 + self.payload.len() as u32)?;
        buf.push(self.id);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

/// Encoded keep-alive: a zero length prefix and nothing else.
#[allow(dead_code)]
pub fn keep_alive() -> Vec<u8> {
    vec![0; 4]
}

/// Read one message from `stream`.
///
/// Returns `None` for a keep-alive. A short read or EOF mid-message is
/// fatal for the connection.
pub fn read_message<R: Read>(stream: &mut R) -> Result<Option<Message>, PeerError> {
    let length = stream.read_u32::<BigEndian>()? as usize;
    if length == 0 {
        return Ok(None);
    }

    let mut buf = vec![0; length];
    stream.read_exact(&mut buf)?;

    let payload = buf.split_off(1);
    Ok(Some(Message {
        id: buf[0],
        payload,
    }))
}

/// Copy the block carried by a Piece message into `buf` at its declared
/// offset, returning the number of bytes written.
pub fn parse_piece(buf: &mut [u8], expected_index: u32, msg: &Message) -> Result<u32, PeerError> {
    if msg.id != MESSAGE_PIECE || msg.payload.len() < 8 {
        return Err(PeerError::Malformed("piece"));
    }

    let mut header = Cursor::new(&msg.payload[..8]);
    let index = header.read_u32::<BigEndian>()?;
    let begin = header.read_u32::<BigEndian>()?;
    let block = &msg.payload[8..];
    let piece_len = buf.len() as u32;

    if index != expected_index {
        return Err(PeerError::PieceMismatch {
            expected: expected_index,
            actual: index,
        });
    }
    if begin >= piece_len {
        return Err(PeerError::OffsetOutOfRange { begin, piece_len });
    }
    if begin as u64 + block.len() as u64 > piece_len as u64 {
        return Err(PeerError::BlockOverflow {
            begin,
            block_len: block.len() as u32,
            piece_len,
        });
    }

    buf[begin as usize..begin as usize + block.len()].copy_from_slice(block);
    Ok(block.len() as u32)
}

/// Extract the piece index announced by a Have message.
pub fn parse_have(msg: &Message) -> Result<u32, PeerError> {
    if msg.id != MESSAGE_HAVE || msg.payload.len() != 4 {
        return Err(PeerError::Malformed("have"));
    }

    let mut payload = Cursor::new(&msg.payload);
    Ok(payload.read_u32::<BigEndian>()?)
}
