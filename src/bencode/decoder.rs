//! Bencode decoder
//!
//! Works on raw bytes. Every value is self-delimiting: integers and
//! containers end with `e`, strings carry an explicit length prefix.

use tracing::trace;

use crate::bencode::value::{BencodeDict, BencodeValue};
use crate::error::TorrentError;

/// Nesting limit for lists and dictionaries
pub const MAX_DEPTH: usize = 256;

/// Decode one value starting at `start`.
///
/// Returns the value and the index of the first byte after it.
pub fn decode(data: &[u8], start: usize) -> Result<(BencodeValue, usize), TorrentError> {
    decode_value(data, start, 0)
}

/// Decode a buffer that must hold exactly one value
pub fn decode_all(data: &[u8]) -> Result<BencodeValue, TorrentError> {
    let (value, next) = decode(data, 0)?;
    if next != data.len() {
        return Err(TorrentError::parse_error_at(
            format!("{} trailing bytes after value", data.len() - next),
            next,
        ));
    }
    Ok(value)
}

fn decode_value(data: &[u8], pos: usize, depth: usize) -> Result<(BencodeValue, usize), TorrentError> {
    let byte = *data
        .get(pos)
        .ok_or_else(|| TorrentError::parse_error_at("unexpected end of data", pos))?;

    match byte {
        b'i' => {
            let (value, next) = parse_integer(data, pos)?;
            Ok((BencodeValue::Integer(value), next))
        }
        b'l' => {
            check_depth(depth, pos)?;
            let mut idx = pos + 1;
            let mut list = Vec::new();
            loop {
                match data.get(idx) {
                    Some(b'e') => break,
                    Some(_) => {
                        let (item, next) = decode_value(data, idx, depth + 1)?;
                        list.push(item);
                        idx = next;
                    }
                    None => return Err(TorrentError::parse_error_at("unterminated list", pos)),
                }
            }
            trace!("Decoded list of {} items at {}", list.len(), pos);
            Ok((BencodeValue::List(list), idx + 1))
        }
        b'd' => {
            check_depth(depth, pos)?;
            let mut idx = pos + 1;
            let mut dict = BencodeDict::new();
            loop {
                match data.get(idx) {
                    Some(b'e') => break,
                    Some(_) => {
                        let key = match decode_value(data, idx, depth + 1)? {
                            (BencodeValue::Bytes(key), next) => {
                                idx = next;
                                key
                            }
                            (other, _) => {
                                return Err(TorrentError::parse_error_at(
                                    format!("dictionary key must be a string, got {}", other.kind()),
                                    idx,
                                ))
                            }
                        };
                        let (value, next) = decode_value(data, idx, depth + 1)?;
                        dict.insert(key, value);
                        idx = next;
                    }
                    None => return Err(TorrentError::parse_error_at("unterminated dictionary", pos)),
                }
            }
            trace!("Decoded dictionary of {} keys at {}", dict.len(), pos);
            Ok((BencodeValue::Dict(dict), idx + 1))
        }
        b'0'..=b'9' => {
            let (len, payload) = parse_string_header(data, pos)?;
            let end = payload + len;
            Ok((BencodeValue::Bytes(data[payload..end].to_vec()), end))
        }
        _ => Err(TorrentError::parse_error_at("invalid bencoded value", pos)),
    }
}

fn check_depth(depth: usize, pos: usize) -> Result<(), TorrentError> {
    if depth >= MAX_DEPTH {
        return Err(TorrentError::parse_error_at("nesting too deep", pos));
    }
    Ok(())
}

/// Parse `i<digits>e` at `pos`, returning the integer and the index after `e`.
pub(crate) fn parse_integer(data: &[u8], pos: usize) -> Result<(i64, usize), TorrentError> {
    let body_start = pos + 1;
    let end = data
        .get(body_start..)
        .and_then(|rest| rest.iter().position(|&b| b == b'e'))
        .map(|p| p + body_start)
        .ok_or_else(|| TorrentError::parse_error_at("unterminated integer", pos))?;

    let body = &data[body_start..end];
    let digits = body.strip_prefix(b"-").unwrap_or(body);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(TorrentError::parse_error_at("invalid integer value", pos));
    }

    // body is ASCII at this point
    let text = std::str::from_utf8(body)
        .map_err(|_| TorrentError::parse_error_at("invalid integer value", pos))?;
    let value = text
        .parse::<i64>()
        .map_err(|e| TorrentError::parse_error_at(format!("invalid integer value: {}", e), pos))?;

    Ok((value, end + 1))
}

/// Parse the `<len>:` prefix of a string at `pos`.
///
/// Returns the declared length and the index where the payload starts,
/// after checking that the whole payload is present.
pub(crate) fn parse_string_header(data: &[u8], pos: usize) -> Result<(usize, usize), TorrentError> {
    let digits_len = data[pos..].iter().take_while(|b| b.is_ascii_digit()).count();
    let colon = pos + digits_len;
    if data.get(colon) != Some(&b':') {
        return Err(TorrentError::parse_error_at("invalid string value: missing ':'", pos));
    }

    let len = std::str::from_utf8(&data[pos..colon])
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| TorrentError::parse_error_at("invalid string length", pos))?;

    let payload = colon + 1;
    match payload.checked_add(len) {
        Some(end) if end <= data.len() => Ok((len, payload)),
        _ => Err(TorrentError::parse_error_at(
            format!("invalid string length: declared {}, {} available", len, data.len() - payload),
            pos,
        )),
    }
}
