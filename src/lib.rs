//! bitfetch
//!
//! A single-file BitTorrent client: bencode decoding, info-hash extraction,
//! tracker announce and a peer-wire download with failover across peers.

pub mod bencode;
pub mod cli;
pub mod download;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod storage;
pub mod torrent;
pub mod tracker;

pub use error::TorrentError;

pub use bencode::{decode, decode_all, BencodeDict, BencodeValue};
pub use cli::{CliArgs, Command, Config, ProgressDisplay};
pub use download::{DownloadCoordinator, DownloadStats};
pub use peer::{PeerAddress, PeerConnection, PeerSession, SessionState, VerifiedPiece};
pub use protocol::{Handshake, Message, MessageId};
pub use storage::{FileOutput, OutputWriter};
pub use torrent::{InfoHashExtractor, MetadataParser, Torrent, TorrentMetadata};
pub use tracker::{AnnounceRequest, AnnounceResponse, HttpTracker, TrackerClient};
