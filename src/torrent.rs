//! Torrent metadata, tracker discovery and the swarm coordinator.
//!
//! `Torrent::open` parses a bencoded `.torrent` file and asks its tracker
//! for a compact peer list. `Torrent::download` then runs the swarm: a
//! bounded work queue seeded with one job per piece, one worker thread per
//! peer, and a reassembly loop that places verified pieces into the output
//! buffer by index.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use boring::sha::Sha1;
use crossbeam_channel::bounded;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_bencode::{de, ser};
use serde_bytes::ByteBuf;
use url::Url;

use crate::error::SwarmExhausted;
use crate::peer::{self, Peer};
use crate::piece::{PieceJob, PieceResult};
use crate::worker::Worker;

/// Port advertised to the tracker.
const PORT: u16 = 6881;

const SHA1_LEN: usize = 20;

/// A single-file torrent and the swarm state needed to download it.
pub struct Torrent {
    announce: String,
    info_hash: [u8; 20],
    piece_digests: Vec<[u8; 20]>,
    piece_length: u32,
    length: u32,
    name: String,
    peer_id: [u8; 20],
    peers: Vec<Peer>,
}

#[derive(Deserialize, Serialize)]
struct BencodeInfo {
    // Concatenation of all 20-byte piece digests
    pieces: ByteBuf,
    #[serde(rename = "piece length")]
    piece_length: u32,
    length: u32,
    name: String,
}

#[derive(Deserialize)]
struct BencodeTorrent {
    announce: String,
    info: BencodeInfo,
}

#[derive(Debug, Deserialize, Serialize)]
struct BencodeTracker {
    // Seconds until the tracker wants to hear from us again; unused, we
    // never re-announce.
    interval: u32,
    peers: ByteBuf,
}

impl BencodeInfo {
    /// SHA-1 over the bencoded info dictionary, identifying the torrent.
    fn info_hash(&self) -> Result<[u8; 20]> {
        let encoded = ser::to_bytes::<BencodeInfo>(self)?;

        let mut hasher = Sha1::new();
        hasher.update(&encoded);
        Ok(hasher.finish())
    }

    /// Split the concatenated `pieces` field into per-piece digests.
    fn piece_digests(&self) -> Result<Vec<[u8; 20]>> {
        if !self.pieces.len().is_multiple_of(SHA1_LEN) {
            return Err(anyhow!(
                "pieces field is {} bytes, not a multiple of {}",
                self.pieces.len(),
                SHA1_LEN
            ));
        }

        let mut digests = Vec::with_capacity(self.pieces.len() / SHA1_LEN);
        for chunk in self.pieces.chunks_exact(SHA1_LEN) {
            let mut digest = [0; SHA1_LEN];
            digest.copy_from_slice(chunk);
            digests.push(digest);
        }

        Ok(digests)
    }
}

impl Torrent {
    /// Parse a `.torrent` file and discover peers from its tracker.
    pub fn open(filepath: &Path) -> Result<Torrent> {
        let mut buf = vec![];
        File::open(filepath)
            .map_err(|_| anyhow!("could not open torrent file"))?
            .read_to_end(&mut buf)
            .map_err(|_| anyhow!("could not read torrent file"))?;

        let bencode = de::from_bytes::<BencodeTorrent>(&buf)
            .map_err(|_| anyhow!("could not decode torrent file"))?;

        // 20 random bytes identify us to the tracker and the swarm.
        let mut peer_id = [0u8; 20];
        rand::thread_rng().fill(&mut peer_id[..]);

        let mut torrent = Torrent {
            announce: bencode.announce,
            info_hash: bencode.info.info_hash()?,
            piece_digests: bencode.info.piece_digests()?,
            piece_length: bencode.info.piece_length,
            length: bencode.info.length,
            name: bencode.info.name,
            peer_id,
            peers: vec![],
        };
        torrent.peers = torrent.request_peers()?;

        Ok(torrent)
    }

    /// The suggested filename from the torrent metadata.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the tracker for a compact peer list.
    fn request_peers(&self) -> Result<Vec<Peer>> {
        let url = self.build_tracker_url()?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|_| anyhow!("could not build http client"))?;

        let response = client
            .get(url)
            .send()
            .and_then(|r| r.bytes())
            .map_err(|_| anyhow!("could not reach tracker {}", self.announce))?;

        let tracker = de::from_bytes::<BencodeTracker>(&response)
            .map_err(|_| anyhow!("could not decode tracker response"))?;

        let peers = peer::from_compact(&tracker.peers)?;
        if peers.is_empty() {
            return Err(anyhow!("tracker returned no peers"));
        }

        info!("tracker returned {} peers", peers.len());

        Ok(peers)
    }

    fn build_tracker_url(&self) -> Result<String> {
        // The 20-byte fields are raw binary; encode each byte as %XX by
        // hand instead of going through a string-based urlencoder.
        fn percent_encode(data: &[u8]) -> String {
            const HEX: &[u8] = b"0123456789ABCDEF";
            let mut out = String::with_capacity(data.len() * 3);
            for &byte in data {
                out.push('%');
                out.push(HEX[(byte >> 4) as usize] as char);
                out.push(HEX[(byte & 0x0F) as usize] as char);
            }
            out
        }

        let base = Url::parse(&self.announce)
            .map_err(|_| anyhow!("could not parse tracker url {}", self.announce))?;

        let query = format!(
            "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&compact=1&left={}",
            percent_encode(&self.info_hash),
            percent_encode(&self.peer_id),
            PORT,
            self.length
        );

        let mut url = base.to_string();
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query);

        Ok(url)
    }

    /// Download the whole file from the swarm.
    ///
    /// Fails with [`SwarmExhausted`] if every worker exits while pieces are
    /// still missing; any single-peer fault only costs that peer.
    pub fn download(&self) -> Result<Vec<u8>> {
        let num_pieces = self.piece_digests.len();

        println!("Downloading {:?} ({} pieces)", self.name, num_pieces);

        // The queue holds every job at once, so seeding never blocks and
        // requeued jobs always fit.
        let (job_tx, job_rx) = bounded::<PieceJob>(num_pieces);
        for (index, digest) in self.piece_digests.iter().enumerate() {
            let index = index as u32;
            let job = PieceJob {
                index,
                length: self.piece_len_at(index),
                digest: *digest,
            };
            job_tx
                .send(job)
                .map_err(|_| anyhow!("could not seed the work queue"))?;
        }

        let (result_tx, result_rx) = bounded::<PieceResult>(0);

        for &peer in &self.peers {
            let worker = Worker::new(
                peer,
                self.peer_id,
                self.info_hash,
                num_pieces as u32,
                job_rx.clone(),
                job_tx.clone(),
                result_tx.clone(),
            );
            thread::spawn(move || worker.run());
        }

        // Workers hold the only result senders; once the last one exits,
        // the receive below fails instead of blocking forever.
        drop(result_tx);

        let progress = ProgressBar::new(self.length as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {bytes}/{total_bytes} [{bar:40.cyan/blue}] {percent}%")?
                .progress_chars("#>-"),
        );

        let mut data = vec![0; self.length as usize];
        let mut done = 0;
        while done < num_pieces {
            let piece: PieceResult = result_rx.recv().map_err(|_| SwarmExhausted {
                remaining: num_pieces - done,
            })?;

            let begin = piece.index as usize * self.piece_length as usize;
            data[begin..begin + piece.data.len()].copy_from_slice(&piece.data);

            progress.inc(piece.data.len() as u64);
            done += 1;
        }

        Ok(data)
    }

    /// Length of piece `index`; only the last piece may be short.
    fn piece_len_at(&self, index: u32) -> u32 {
        let begin = index * self.piece_length;
        let end = (begin + self.piece_length).min(self.length);
        end - begin
    }
}
