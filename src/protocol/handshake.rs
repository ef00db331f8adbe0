//! BitTorrent handshake
//!
//! The handshake is a fixed 68-byte message: protocol name length (19),
//! the protocol name, 8 reserved bytes, the info hash and a peer id.

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace, warn};

use crate::error::TorrentError;

/// BitTorrent protocol identifier string
pub const PROTOCOL_STRING: &[u8; 19] = b"BitTorrent protocol";

/// Length of the protocol string
pub const PROTOCOL_LENGTH: u8 = 19;

/// Total size of a handshake on the wire
pub const HANDSHAKE_LEN: usize = 68;

/// Client prefix used in generated peer ids
pub const PEER_ID_PREFIX: &[u8; 8] = b"-BF0001-";

/// BitTorrent handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol identifier as sent by the peer
    pub protocol_id: [u8; 19],
    /// Reserved / extension bits
    pub reserved: [u8; 8],
    /// Torrent info hash
    pub info_hash: [u8; 20],
    /// Sender's peer id
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Create a handshake with all reserved bits cleared
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        debug!("Creating handshake for info_hash: {}", hex::encode(info_hash));
        Self {
            protocol_id: *PROTOCOL_STRING,
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    /// Generate a random peer id with the client prefix
    pub fn generate_peer_id() -> [u8; 20] {
        let mut peer_id = [0u8; 20];
        peer_id[..8].copy_from_slice(PEER_ID_PREFIX);
        peer_id[8..].copy_from_slice(&rand::random::<[u8; 12]>());
        debug!("Generated peer ID: {}", hex::encode(peer_id));
        peer_id
    }

    /// Serialize to the 68-byte wire form
    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL_LENGTH);
        buf.put_slice(&self.protocol_id);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        trace!("Handshake serialized: {} bytes", buf.len());
        buf
    }

    /// Split a received handshake into its fields without judging them.
    ///
    /// The length byte is read but not enforced; see [`Handshake::validate`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, TorrentError> {
        if data.len() < HANDSHAKE_LEN {
            return Err(TorrentError::protocol_error(format!(
                "handshake too short: expected {} bytes, got {}",
                HANDSHAKE_LEN,
                data.len()
            )));
        }

        let mut handshake = Self {
            protocol_id: [0u8; 19],
            reserved: [0u8; 8],
            info_hash: [0u8; 20],
            peer_id: [0u8; 20],
        };
        handshake.protocol_id.copy_from_slice(&data[1..20]);
        handshake.reserved.copy_from_slice(&data[20..28]);
        handshake.info_hash.copy_from_slice(&data[28..48]);
        handshake.peer_id.copy_from_slice(&data[48..68]);
        trace!("Handshake parsed, peer id {}", hex::encode(handshake.peer_id));
        Ok(handshake)
    }

    /// Check the protocol name and info hash of a peer's handshake
    pub fn validate(&self, expected_info_hash: &[u8; 20]) -> Result<(), TorrentError> {
        if &self.protocol_id != PROTOCOL_STRING {
            warn!("Handshake validation failed: invalid protocol identifier");
            return Err(TorrentError::protocol_error("invalid protocol identifier in handshake"));
        }

        if self.info_hash != *expected_info_hash {
            warn!(
                "Handshake validation failed: info hash mismatch (expected {}, got {})",
                hex::encode(expected_info_hash),
                hex::encode(self.info_hash)
            );
            return Err(TorrentError::protocol_error("info hash mismatch in handshake"));
        }

        Ok(())
    }
}
