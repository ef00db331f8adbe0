//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::peer::PeerAddress;
use crate::tracker::DEFAULT_PORT;

/// CLI arguments for bitfetch
#[derive(Debug, Parser)]
#[command(name = "bitfetch")]
#[command(about = "Fetch a single-file torrent from its peers", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Seconds a peer may stay silent before failing over
    #[arg(long, global = true, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Port reported to the tracker
    #[arg(short, long, global = true, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Reject peers whose handshake names a different torrent
    #[arg(long, global = true)]
    pub verify_handshake: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode {
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Print the metadata of a .torrent file
    Info {
        torrent: PathBuf,
        /// Print as JSON instead of labelled lines
        #[arg(long)]
        json: bool,
    },
    /// List the peers returned by the tracker
    Peers { torrent: PathBuf },
    /// Handshake with one peer and print its peer id
    Handshake { torrent: PathBuf, peer: PeerAddress },
    /// Download and verify a single piece
    #[command(name = "download_piece")]
    DownloadPiece {
        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,
        torrent: PathBuf,
        index: u32,
    },
    /// Download and verify the whole file
    Download {
        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,
        torrent: PathBuf,
    },
}

impl Command {
    /// Commands that transfer pieces log at INFO by default
    pub fn is_transfer(&self) -> bool {
        matches!(self, Command::DownloadPiece { .. } | Command::Download { .. })
    }
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings.
    ///
    /// Commands that print data keep stdout clean by logging only warnings.
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else if self.command.is_transfer() {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}
