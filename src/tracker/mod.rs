//! Tracker module
//!
//! Peer discovery through the torrent's announce URL.

pub mod http;
pub mod response;

use async_trait::async_trait;

use crate::error::TorrentError;

pub use http::HttpTracker;
pub use response::AnnounceResponse;

/// Port reported to trackers unless configured otherwise
pub const DEFAULT_PORT: u16 = 6881;

/// Parameters of one announce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

impl AnnounceRequest {
    /// A fresh download: nothing transferred, `left` bytes to go
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], left: u64) -> Self {
        Self { info_hash, peer_id, port: DEFAULT_PORT, uploaded: 0, downloaded: 0, left }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Something that can turn an announce into a peer list
#[async_trait]
pub trait TrackerClient: Send + Sync {
    async fn announce(&self, url: &str, request: &AnnounceRequest) -> Result<AnnounceResponse, TorrentError>;
}
