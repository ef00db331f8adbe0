//! Bencode support
//!
//! Decoding of the length-prefixed serialization format used by torrent
//! metadata files and tracker responses.

pub mod decoder;
pub mod value;

pub use decoder::{decode, decode_all};
pub use value::{BencodeDict, BencodeValue};
