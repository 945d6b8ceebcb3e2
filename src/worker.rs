//! Per-peer download worker.
//!
//! One worker owns one connection. It pulls piece jobs from the shared
//! queue, runs the pipelined block downloader against its peer, verifies
//! each piece digest, and delivers verified pieces to the coordinator.
//! Every job taken from the queue has a single outcome: delivered once, or
//! requeued once at the tail for another peer to retry.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::client::Client;
use crate::error::PeerError;
use crate::message::{self, MESSAGE_CHOKE, MESSAGE_HAVE, MESSAGE_PIECE, MESSAGE_UNCHOKE};
use crate::peer::Peer;
use crate::piece::{verify_digest, PieceJob, PieceResult};

/// Outstanding block requests allowed on one connection.
const MAX_BACKLOG: u32 = 5;

/// Size of one block request, 16 KiB.
const BLOCK_SIZE: u32 = 16384;

/// Read/write deadline spanning one whole piece download.
const PIECE_DEADLINE: Duration = Duration::from_secs(30);

/// Downloads pieces from a single peer.
pub struct Worker {
    peer: Peer,
    peer_id: [u8; 20],
    info_hash: [u8; 20],
    num_pieces: u32,
    jobs: Receiver<PieceJob>,
    requeue: Sender<PieceJob>,
    results: Sender<PieceResult>,
}

impl Worker {
    pub fn new(
        peer: Peer,
        peer_id: [u8; 20],
        info_hash: [u8; 20],
        num_pieces: u32,
        jobs: Receiver<PieceJob>,
        requeue: Sender<PieceJob>,
        results: Sender<PieceResult>,
    ) -> Worker {
        Worker {
            peer,
            peer_id,
            info_hash,
            num_pieces,
            jobs,
            requeue,
            results,
        }
    }

    /// Drive the download loop until the queue drains or the connection dies.
    ///
    /// Dropping `self.results` on exit is what lets the coordinator notice
    /// a swarm with no live workers left.
    pub fn run(self) {
        let mut client =
            match Client::connect(self.peer, self.peer_id, self.info_hash, self.num_pieces) {
                Ok(client) => client,
                Err(e) => {
                    debug!("dropping peer {}: {}", self.peer, e);
                    return;
                }
            };

        // A dead connection surfaces on the first piece attempt anyway.
        if let Err(e) = client.send_unchoke() {
            debug!("could not send unchoke to peer {}: {}", self.peer, e);
        }
        if let Err(e) = client.send_interested() {
            debug!("could not send interested to peer {}: {}", self.peer, e);
        }

        while let Ok(job) = self.jobs.recv() {
            if !client.has_piece(job.index) {
                self.requeue(job);
                continue;
            }

            let data = match download_piece(&mut client, &job) {
                Ok(data) => data,
                Err(e) => {
                    warn!("piece {} failed on peer {}: {}", job.index, self.peer, e);
                    self.requeue(job);
                    return;
                }
            };

            if !verify_digest(&data, &job.digest) {
                warn!(
                    "piece {} from peer {} failed its integrity check",
                    job.index, self.peer
                );
                self.requeue(job);
                continue;
            }

            if let Err(e) = client.send_have(job.index) {
                debug!("could not send have to peer {}: {}", self.peer, e);
                self.requeue(job);
                return;
            }

            let index = job.index;
            if self.results.send(PieceResult { index, data }).is_err() {
                // The coordinator is gone; nothing left to deliver to.
                return;
            }
            debug!("piece {} delivered by peer {}", index, self.peer);
        }
    }

    fn requeue(&self, job: PieceJob) {
        // Cannot fail: this worker holds a receiver for the same queue.
        let _ = self.requeue.send(job);
    }
}

/// Progress of one piece download over one connection.
struct PieceProgress {
    buf: Vec<u8>,
    downloaded: u32,
    requested: u32,
    backlog: u32,
}

/// Download one piece with pipelined block requests, under a 30 second
/// deadline that is cleared before returning.
fn download_piece(client: &mut Client, job: &PieceJob) -> Result<Vec<u8>, PeerError> {
    client.set_deadline(Some(PIECE_DEADLINE))?;
    let result = run_piece(client, job);
    match client.set_deadline(None) {
        Ok(()) => result,
        Err(e) => result.and(Err(e)),
    }
}

/// Keep up to `MAX_BACKLOG` requests in flight while the peer leaves us
/// unchoked, assembling the answered blocks at their declared offsets.
fn run_piece(client: &mut Client, job: &PieceJob) -> Result<Vec<u8>, PeerError> {
    let mut progress = PieceProgress {
        buf: vec![0; job.length as usize],
        downloaded: 0,
        requested: 0,
        backlog: 0,
    };

    while progress.downloaded < job.length {
        if !client.is_choked() {
            while progress.backlog < MAX_BACKLOG && progress.requested < job.length {
                let block_size = BLOCK_SIZE.min(job.length - progress.requested);
                client.send_request(job.index, progress.requested, block_size)?;
                progress.backlog += 1;
                progress.requested += block_size;
            }
        }

        match client.read()? {
            // Keep-alives carry nothing.
            None => {}
            Some(msg) => match msg.id {
                MESSAGE_PIECE => {
                    let written = message::parse_piece(&mut progress.buf, job.index, &msg)?;
                    progress.downloaded += written;
                    progress.backlog = progress.backlog.saturating_sub(1);
                }
                MESSAGE_CHOKE => client.set_choked(true),
                MESSAGE_UNCHOKE => client.set_choked(false),
                MESSAGE_HAVE => {
                    let index = message::parse_have(&msg)?;
                    client.record_have(index)?;
                }
                // Cancel, Port and unknown ids change nothing.
                _ => {}
            },
        }
    }

    Ok(progress.buf)
}
