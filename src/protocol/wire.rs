//! Framing over a growing receive buffer
//!
//! Bytes arrive in arbitrary chunks. These helpers pull out complete
//! length-prefixed frames and leave partial ones in the buffer.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::TorrentError;

/// Largest frame accepted from a peer (a 16 KiB block plus header, or a
/// bitfield for a very large torrent)
pub const MAX_FRAME_LEN: usize = 1 << 21;

/// Take one complete frame body off the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed. A keep-alive yields an
/// empty body.
pub fn read_frame(buf: &mut BytesMut) -> Result<Option<Bytes>, TorrentError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if length > MAX_FRAME_LEN {
        return Err(TorrentError::protocol_error(format!(
            "frame of {} bytes exceeds limit of {}",
            length, MAX_FRAME_LEN
        )));
    }

    if buf.len() < 4 + length {
        return Ok(None);
    }

    buf.advance(4);
    Ok(Some(buf.split_to(length).freeze()))
}

/// Take the fixed-size handshake off the front of `buf`
pub fn read_exact(buf: &mut BytesMut, len: usize) -> Option<Bytes> {
    if buf.len() < len {
        return None;
    }
    Some(buf.split_to(len).freeze())
}
