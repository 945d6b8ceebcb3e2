//! Error types for the peer wire layer.
//!
//! Workers branch on these to decide what a failed piece attempt means for
//! the connection, so the wire layer reports typed errors instead of plain
//! strings. Application-level code wraps them in `anyhow` as usual.

use std::io;

use thiserror::Error;

/// Errors raised while talking to a single peer.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Connect, read, write, or deadline expiry on the peer socket.
    #[error("peer i/o failed: {0}")]
    Io(#[from] io::Error),

    /// The 68-byte handshake could not be completed or validated.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The first message after the handshake was not a bitfield.
    #[error("expected a bitfield message, peer sent {0}")]
    NoBitfield(String),

    /// The peer's bitfield payload has the wrong byte length.
    #[error("expected a bitfield of {expected} bytes, peer sent {actual}")]
    BadBitfield { expected: usize, actual: usize },

    /// A piece index beyond the end of the torrent.
    #[error("piece index {index} is out of range for {num_pieces} pieces")]
    OutOfRange { index: u32, num_pieces: u32 },

    /// A block for a different piece than the one being downloaded.
    #[error("peer sent a block for piece {actual}, expected piece {expected}")]
    PieceMismatch { expected: u32, actual: u32 },

    /// A block offset past the end of the piece buffer.
    #[error("block offset {begin} lies outside a piece of {piece_len} bytes")]
    OffsetOutOfRange { begin: u32, piece_len: u32 },

    /// A block that starts inside the piece but runs past its end.
    #[error("block of {block_len} bytes at offset {begin} overflows a piece of {piece_len} bytes")]
    BlockOverflow {
        begin: u32,
        block_len: u32,
        piece_len: u32,
    },

    /// A message whose payload does not match its id.
    #[error("peer sent a malformed {0} message")]
    Malformed(&'static str),
}

/// Fatal download failure: every worker has exited while pieces were still
/// waiting in the queue, so no peer can make further progress.
#[derive(Debug, Error)]
#[error("swarm exhausted: all peers gone with {remaining} pieces left to download")]
pub struct SwarmExhausted {
    pub remaining: usize,
}
