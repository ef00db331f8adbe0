//! Announce response parsing

use std::net::Ipv4Addr;

use tracing::{debug, warn};

use crate::bencode::{decode, BencodeValue};
use crate::error::TorrentError;
use crate::peer::PeerAddress;

/// What a tracker returned for an announce
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnnounceResponse {
    /// Seconds the tracker asks us to wait before re-announcing
    pub interval: Option<u32>,
    pub peers: Vec<PeerAddress>,
    pub warning: Option<String>,
}

impl AnnounceResponse {
    /// Parse a bencoded announce response body
    pub fn parse(body: &[u8]) -> Result<Self, TorrentError> {
        let (root, _) = decode(body, 0)?;
        let dict = root
            .as_dict()
            .ok_or_else(|| TorrentError::tracker_error(format!("response must be a dictionary, got {}", root.kind())))?;

        if let Some(reason) = dict.get(b"failure reason") {
            let reason = reason
                .as_bytes()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_else(|| "unspecified".to_string());
            return Err(TorrentError::tracker_error(format!("tracker refused announce: {}", reason)));
        }

        let warning = dict.get(b"warning message").and_then(|v| v.as_str()).map(String::from);
        if let Some(message) = &warning {
            warn!("Tracker warning: {}", message);
        }

        let interval = dict
            .get(b"interval")
            .and_then(|v| v.as_int())
            .and_then(|i| u32::try_from(i).ok());

        let peers = match dict.get(b"peers") {
            Some(BencodeValue::Bytes(compact)) => PeerAddress::from_compact(compact)?,
            Some(BencodeValue::List(entries)) => parse_peer_dicts(entries),
            Some(other) => {
                return Err(TorrentError::tracker_error(format!("peers must be a string, got {}", other.kind())));
            }
            None => return Err(TorrentError::tracker_error("response has no peers")),
        };

        debug!("Tracker returned {} peers, interval {:?}", peers.len(), interval);
        Ok(Self { interval, peers, warning })
    }
}

/// Non-compact form: a list of `{ip, port}` dictionaries. IPv6 and
/// hostname entries are skipped.
fn parse_peer_dicts(entries: &[BencodeValue]) -> Vec<PeerAddress> {
    entries
        .iter()
        .filter_map(|entry| {
            let ip: Ipv4Addr = entry.get(b"ip")?.as_str()?.parse().ok()?;
            let port = u16::try_from(entry.get(b"port")?.as_int()?).ok()?;
            Some(PeerAddress::new(ip, port))
        })
        .collect()
}
