//! # Strand
//!
//! A command-line BitTorrent downloader for single-file torrents.
//!
//! ## Usage
//!
//! ```bash
//! strand <torrent_file>
//! strand <torrent_file> -o <output_file>
//! ```
//!
//! ## Architecture
//!
//! The main thread parses the torrent, contacts the tracker, and then acts
//! as the swarm coordinator: it seeds a work queue with one job per piece
//! and reassembles verified pieces into the output buffer. Each discovered
//! peer gets its own worker thread running the peer wire protocol, with
//! pieces flowing back over a result channel.

#[macro_use]
extern crate log;

mod bitfield;
mod client;
mod error;
mod handshake;
mod message;
mod peer;
mod piece;
mod torrent;
mod worker;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::Parser;

use torrent::Torrent;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A command-line BitTorrent downloader, written in Rust."
)]
struct Args {
    /// Path to the .torrent file
    torrent: String,

    /// Output filename (defaults to the name from the torrent)
    #[arg(short = 'o', long)]
    output: Option<String>,
}

/// Keep path separators out of torrent-provided names.
fn sanitize_filename(filename: &str) -> String {
    let safe = filename.replace(['/', '\\'], "_");

    if safe.trim().is_empty() {
        "download".to_string()
    } else {
        safe
    }
}

fn run(args: Args) -> Result<()> {
    let torrent_path = Path::new(&args.torrent);
    if !torrent_path.exists() {
        return Err(anyhow!("could not find torrent file: {}", args.torrent));
    }

    let torrent = Torrent::open(torrent_path)?;

    let default_name = sanitize_filename(torrent.name());
    let output_name = args.output.as_deref().unwrap_or(&default_name);
    let output_path = PathBuf::from(output_name);

    if output_path.exists() {
        print!(
            "Output file '{}' already exists, overwrite? (y/N): ",
            output_name
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !matches!(input.trim().to_lowercase().as_str(), "y" | "yes") {
            println!("Download cancelled.");
            return Ok(());
        }
    }

    let data = torrent.download()?;

    let mut output_file = File::create(&output_path)
        .map_err(|e| anyhow!("could not create output file '{}': {}", output_name, e))?;
    output_file
        .write_all(&data)
        .map_err(|e| anyhow!("could not write output file '{}': {}", output_name, e))?;

    println!("Saved in {:?}.", output_name);

    Ok(())
}

fn main() {
    pretty_env_logger::init_timed();

    let args = Args::parse();

    if let Err(error) = run(args) {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(sanitize_filename("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_filename("  "), "download");
        assert_eq!(sanitize_filename("debian.iso"), "debian.iso");
    }
}
