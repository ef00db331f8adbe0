//! Torrent file handling module
//!
//! Metadata parsing and info hash computation for `.torrent` files.

pub mod info_hash;
pub mod metadata;

pub use info_hash::InfoHashExtractor;
pub use metadata::{MetadataParser, Torrent, TorrentMetadata};
