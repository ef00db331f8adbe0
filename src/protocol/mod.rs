//! BitTorrent protocol module
//!
//! Implements the base peer-wire protocol: handshake, message codec and
//! length-prefixed framing.

pub mod handshake;
pub mod message;
pub mod wire;

pub use handshake::{Handshake, HANDSHAKE_LEN, PROTOCOL_STRING};
pub use message::{Message, MessageId};
pub use wire::{read_exact, read_frame};

/// Size of a block request
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// Maximum number of outstanding block requests per piece
pub const MAX_PIPELINE: u32 = 5;
