//! Peer-wire messages
//!
//! Every message after the handshake is `<u32 length><u8 id><payload>`;
//! a zero length is a keep-alive with no id.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::TorrentError;

/// Message ids this client understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            other => Err(other),
        }
    }
}

/// A decoded peer-wire message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Bytes },
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Bytes },
    Cancel { index: u32, begin: u32, length: u32 },
    /// Ids outside the base protocol (port, extensions, ...)
    Unknown { id: u8, payload: Bytes },
}

impl Message {
    /// The message id, `None` for keep-alive
    pub fn id(&self) -> Option<u8> {
        match self {
            Message::KeepAlive => None,
            Message::Choke => Some(MessageId::Choke as u8),
            Message::Unchoke => Some(MessageId::Unchoke as u8),
            Message::Interested => Some(MessageId::Interested as u8),
            Message::NotInterested => Some(MessageId::NotInterested as u8),
            Message::Have { .. } => Some(MessageId::Have as u8),
            Message::Bitfield { .. } => Some(MessageId::Bitfield as u8),
            Message::Request { .. } => Some(MessageId::Request as u8),
            Message::Piece { .. } => Some(MessageId::Piece as u8),
            Message::Cancel { .. } => Some(MessageId::Cancel as u8),
            Message::Unknown { id, .. } => Some(*id),
        }
    }

    /// Length field value: id byte plus payload
    pub fn length(&self) -> u32 {
        match self {
            Message::KeepAlive => 0,
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 1,
            Message::Have { .. } => 5,
            Message::Bitfield { bitfield } => 1 + bitfield.len() as u32,
            Message::Request { .. } | Message::Cancel { .. } => 13,
            Message::Piece { block, .. } => 9 + block.len() as u32,
            Message::Unknown { payload, .. } => 1 + payload.len() as u32,
        }
    }

    /// Append the framed message (length prefix included) to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(4 + self.length() as usize);
        buf.put_u32(self.length());
        if let Some(id) = self.id() {
            buf.put_u8(id);
        }

        match self {
            Message::Have { piece_index } => buf.put_u32(*piece_index),
            Message::Bitfield { bitfield } => buf.put_slice(bitfield),
            Message::Request { index, begin, length } | Message::Cancel { index, begin, length } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, block } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(block);
            }
            Message::Unknown { payload, .. } => buf.put_slice(payload),
            _ => {}
        }
    }

    /// Encode into a fresh buffer
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a frame body (everything after the length prefix)
    pub fn decode(mut frame: Bytes) -> Result<Self, TorrentError> {
        if frame.is_empty() {
            return Ok(Message::KeepAlive);
        }

        let id = frame.get_u8();
        let message_id = match MessageId::try_from(id) {
            Ok(message_id) => message_id,
            Err(id) => {
                trace!("Unknown message id {} with {} byte payload", id, frame.len());
                return Ok(Message::Unknown { id, payload: frame });
            }
        };

        let message = match message_id {
            MessageId::Choke => Message::Choke,
            MessageId::Unchoke => Message::Unchoke,
            MessageId::Interested => Message::Interested,
            MessageId::NotInterested => Message::NotInterested,
            MessageId::Have => {
                expect_len(&frame, 4, "have")?;
                Message::Have { piece_index: frame.get_u32() }
            }
            MessageId::Bitfield => Message::Bitfield { bitfield: frame },
            MessageId::Request | MessageId::Cancel => {
                expect_len(&frame, 12, "request")?;
                let (index, begin, length) = (frame.get_u32(), frame.get_u32(), frame.get_u32());
                if message_id == MessageId::Request {
                    Message::Request { index, begin, length }
                } else {
                    Message::Cancel { index, begin, length }
                }
            }
            MessageId::Piece => {
                if frame.len() < 8 {
                    return Err(TorrentError::protocol_error(format!(
                        "piece message too short: expected at least 8 bytes, got {}",
                        frame.len()
                    )));
                }
                let index = frame.get_u32();
                let begin = frame.get_u32();
                Message::Piece { index, begin, block: frame }
            }
        };

        Ok(message)
    }
}

fn expect_len(payload: &Bytes, expected: usize, kind: &str) -> Result<(), TorrentError> {
    if payload.len() != expected {
        return Err(TorrentError::protocol_error(format!(
            "{} message payload must be {} bytes, got {}",
            kind,
            expected,
            payload.len()
        )));
    }
    Ok(())
}
