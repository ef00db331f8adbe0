//! Torrent metadata
//!
//! Loads a single-file `.torrent` into the fields a download needs:
//! announce URL, total length, piece length and the piece hash table.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, error, info, trace};

use crate::bencode::{decode_all, BencodeDict, BencodeValue};
use crate::error::TorrentError;
use crate::protocol::BLOCK_SIZE;
use crate::storage::PieceJob;
use crate::torrent::info_hash::InfoHashExtractor;

/// Parsed torrent metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentMetadata {
    /// Tracker announce URL
    pub announce: String,
    /// Suggested file name, when present
    pub name: Option<String>,
    /// Total content length in bytes
    pub length: u64,
    /// Nominal piece length in bytes
    pub piece_length: u64,
    /// One SHA-1 digest per piece
    #[serde(serialize_with = "serialize_hex_hashes")]
    pub pieces: Vec<[u8; 20]>,
}

fn serialize_hex_hashes<S: serde::Serializer>(pieces: &[[u8; 20]], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(pieces.iter().map(hex::encode))
}

impl TorrentMetadata {
    /// Number of pieces
    pub fn num_pieces(&self) -> usize {
        self.pieces.len()
    }

    /// Effective length of a piece; only the last one may be short
    pub fn piece_len(&self, index: usize) -> Option<u64> {
        let count = self.pieces.len();
        if index >= count {
            return None;
        }
        if index + 1 == count {
            Some(self.length - self.piece_length * (count as u64 - 1))
        } else {
            Some(self.piece_length)
        }
    }

    /// Offset of a piece within the whole content
    pub fn piece_offset(&self, index: usize) -> Option<u64> {
        if index >= self.pieces.len() {
            return None;
        }
        Some(index as u64 * self.piece_length)
    }

    /// Expected digest of a piece
    pub fn piece_hash(&self, index: usize) -> Option<[u8; 20]> {
        self.pieces.get(index).copied()
    }

    /// Number of blocks a piece is requested in
    pub fn total_blocks(&self, index: usize) -> Option<u32> {
        self.piece_len(index)
            .map(|len| len.div_ceil(BLOCK_SIZE as u64) as u32)
    }

    /// What a connection needs to fetch and verify one piece
    pub fn piece_job(&self, index: usize) -> Option<PieceJob> {
        Some(PieceJob {
            index: index as u32,
            length: self.piece_len(index)? as u32,
            hash: self.piece_hash(index)?,
        })
    }

    /// Piece hashes as lowercase hex
    pub fn piece_hashes_hex(&self) -> Vec<String> {
        self.pieces.iter().map(hex::encode).collect()
    }

    /// Split concatenated 20-byte digests
    pub fn parse_piece_hashes(pieces_bytes: &[u8]) -> Result<Vec<[u8; 20]>, TorrentError> {
        if pieces_bytes.len() % 20 != 0 {
            return Err(TorrentError::structural_error_with_field(
                format!("pieces length must be a multiple of 20, got {}", pieces_bytes.len()),
                "pieces",
            ));
        }

        Ok(pieces_bytes
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect())
    }
}

/// A metadata file together with its info hash
#[derive(Debug, Clone, Serialize)]
pub struct Torrent {
    #[serde(flatten)]
    pub metadata: TorrentMetadata,
    #[serde(serialize_with = "serialize_hex_hash")]
    pub info_hash: [u8; 20],
}

fn serialize_hex_hash<S: serde::Serializer>(hash: &[u8; 20], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(hash))
}

impl Torrent {
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}

/// Parser for `.torrent` files
pub struct MetadataParser;

impl MetadataParser {
    /// Read a metadata file and compute its info hash
    pub fn load(path: &Path) -> Result<Torrent, TorrentError> {
        info!("Loading torrent file: {}", path.display());
        let data = std::fs::read(path).map_err(|e| {
            error!("Failed to read torrent file '{}': {}", path.display(), e);
            TorrentError::storage_error_full("Failed to read torrent file", path.display().to_string(), e.to_string())
        })?;
        debug!("Torrent file size: {} bytes", data.len());
        Self::parse_torrent(&data)
    }

    /// Parse metadata bytes and compute the info hash from the raw span
    pub fn parse_torrent(data: &[u8]) -> Result<Torrent, TorrentError> {
        let metadata = Self::parse_bytes(data)?;
        let info_hash = InfoHashExtractor::extract(data)?;
        info!("Loaded torrent: {} bytes in {} pieces, info hash {}", metadata.length, metadata.num_pieces(), hex::encode(info_hash));
        Ok(Torrent { metadata, info_hash })
    }

    /// Parse metadata bytes
    pub fn parse_bytes(data: &[u8]) -> Result<TorrentMetadata, TorrentError> {
        trace!("Parsing torrent metadata from {} bytes", data.len());
        let root = decode_all(data)?;
        Self::from_value(&root)
    }

    /// Build metadata from an already decoded root dictionary
    pub fn from_value(root: &BencodeValue) -> Result<TorrentMetadata, TorrentError> {
        let root = root
            .as_dict()
            .ok_or_else(|| TorrentError::structural_error("metadata root must be a dictionary"))?;

        let announce = root
            .get(b"announce")
            .and_then(|v| v.as_bytes())
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .ok_or_else(|| TorrentError::structural_error_with_field("missing announce URL", "announce"))?;

        let info = root
            .get(b"info")
            .and_then(|v| v.as_dict())
            .ok_or_else(|| TorrentError::structural_error_with_field("info dictionary not found", "info"))?;

        let length = required_int(info, "length")?;
        if length < 0 {
            return Err(TorrentError::structural_error_with_field("length must not be negative", "length"));
        }
        let piece_length = required_int(info, "piece length")?;
        if piece_length <= 0 {
            return Err(TorrentError::structural_error_with_field("piece length must be positive", "piece length"));
        }
        if piece_length > u32::MAX as i64 {
            return Err(TorrentError::structural_error_with_field(
                "piece length does not fit a 32-bit wire offset",
                "piece length",
            ));
        }

        let pieces_bytes = info
            .get(b"pieces")
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| TorrentError::structural_error_with_field("missing pieces", "pieces"))?;
        let pieces = TorrentMetadata::parse_piece_hashes(pieces_bytes)?;

        let (length, piece_length) = (length as u64, piece_length as u64);
        let expected = length.div_ceil(piece_length);
        if pieces.len() as u64 != expected {
            return Err(TorrentError::structural_error_with_field(
                format!("expected {} piece hashes for {} bytes, found {}", expected, length, pieces.len()),
                "pieces",
            ));
        }

        let name = info
            .get(b"name")
            .and_then(|v| v.as_bytes())
            .map(|b| String::from_utf8_lossy(b).into_owned());

        Ok(TorrentMetadata {
            announce,
            name,
            length,
            piece_length,
            pieces,
        })
    }
}

fn required_int(dict: &BencodeDict, key: &str) -> Result<i64, TorrentError> {
    match dict.get(key.as_bytes()) {
        Some(BencodeValue::Integer(i)) => Ok(*i),
        Some(other) => Err(TorrentError::structural_error_with_field(
            format!("expected integer, found {}", other.kind()),
            key,
        )),
        None => Err(TorrentError::structural_error_with_field("missing field", key)),
    }
}
