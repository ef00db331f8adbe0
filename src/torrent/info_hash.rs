//! Info hash extraction
//!
//! The info hash must be computed over the exact bytes of the `info` value
//! as they appear in the metadata file. Re-encoding a decoded copy can
//! change key order or integer formatting and give a different hash, so the
//! extractor walks the raw bytes and only records offsets.

use std::ops::Range;

use sha1::{Digest, Sha1};
use tracing::{debug, trace};

use crate::bencode::decoder::{parse_integer, parse_string_header, MAX_DEPTH};
use crate::error::TorrentError;

/// Key whose value is hashed, as it is encoded on the wire
const INFO_KEY: &[u8] = b"4:info";

/// Locates and hashes the raw `info` span of a metadata file
pub struct InfoHashExtractor;

impl InfoHashExtractor {
    /// SHA-1 over the raw bytes of the top-level `info` value
    pub fn extract(data: &[u8]) -> Result<[u8; 20], TorrentError> {
        let span = Self::info_span(data)?;
        debug!("Hashing info span {}..{} ({} bytes)", span.start, span.end, span.len());
        Ok(sha1_digest(&data[span]))
    }

    /// Byte range `[start, end)` occupied by the top-level `info` value
    pub fn info_span(data: &[u8]) -> Result<Range<usize>, TorrentError> {
        if data.first() != Some(&b'd') {
            return Err(TorrentError::structural_error("metadata root must be a dictionary"));
        }

        let mut span = None;
        let mut idx = 1;
        loop {
            match data.get(idx) {
                Some(b'e') => break,
                Some(_) => {
                    let key_start = idx;
                    if !data[key_start].is_ascii_digit() {
                        return Err(TorrentError::parse_error_at("dictionary key must be a string", key_start));
                    }
                    let key_end = skip_value(data, key_start, 1)?;

                    let value_end = skip_value(data, key_end, 1)?;
                    if &data[key_start..key_end] == INFO_KEY {
                        trace!("Found info key at {}, value spans {}..{}", key_start, key_end, value_end);
                        span = Some(key_end..value_end);
                    }
                    idx = value_end;
                }
                None => return Err(TorrentError::parse_error_at("unterminated dictionary", 0)),
            }
        }

        span.ok_or_else(|| TorrentError::structural_error_with_field("info dictionary not found", "info"))
    }
}

/// Skip over one value without materializing it, returning the index after it
fn skip_value(data: &[u8], pos: usize, depth: usize) -> Result<usize, TorrentError> {
    let byte = *data
        .get(pos)
        .ok_or_else(|| TorrentError::parse_error_at("unexpected end of data", pos))?;

    match byte {
        b'i' => parse_integer(data, pos).map(|(_, next)| next),
        b'l' | b'd' => {
            if depth >= MAX_DEPTH {
                return Err(TorrentError::parse_error_at("nesting too deep", pos));
            }
            let mut idx = pos + 1;
            loop {
                match data.get(idx) {
                    Some(b'e') => return Ok(idx + 1),
                    Some(_) => {
                        if byte == b'd' {
                            let key = data[idx];
                            if !key.is_ascii_digit() {
                                return Err(TorrentError::parse_error_at("dictionary key must be a string", idx));
                            }
                            idx = skip_value(data, idx, depth + 1)?;
                        }
                        idx = skip_value(data, idx, depth + 1)?;
                    }
                    None => return Err(TorrentError::parse_error_at("unterminated container", pos)),
                }
            }
        }
        b'0'..=b'9' => parse_string_header(data, pos).map(|(len, payload)| payload + len),
        _ => Err(TorrentError::parse_error_at("invalid bencoded value", pos)),
    }
}

pub(crate) fn sha1_digest(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}
