//! Whole-file assembly buffer

use tracing::debug;

use crate::error::TorrentError;

/// Output buffer for a full download.
///
/// Only verified pieces are copied in, at `index * piece_length`.
#[derive(Debug)]
pub struct FileAssembly {
    data: Vec<u8>,
    piece_length: u64,
    committed: Vec<bool>,
}

impl FileAssembly {
    pub fn new(total_length: u64, piece_length: u64, num_pieces: usize) -> Self {
        Self {
            data: vec![0u8; total_length as usize],
            piece_length,
            committed: vec![false; num_pieces],
        }
    }

    /// Copy a verified piece into place
    pub fn commit(&mut self, index: u32, piece: &[u8]) -> Result<(), TorrentError> {
        let start = index as u64 * self.piece_length;
        let end = start + piece.len() as u64;
        if index as usize >= self.committed.len() || end > self.data.len() as u64 {
            return Err(TorrentError::storage_error_full(
                "piece does not fit the output buffer",
                "memory",
                format!("piece {} spans {}..{} of {}", index, start, end, self.data.len()),
            ));
        }

        self.data[start as usize..end as usize].copy_from_slice(piece);
        self.committed[index as usize] = true;
        debug!("Committed piece {} ({} bytes) at offset {}", index, piece.len(), start);
        Ok(())
    }

    pub fn is_committed(&self, index: u32) -> bool {
        self.committed.get(index as usize).copied().unwrap_or(false)
    }

    pub fn committed_count(&self) -> usize {
        self.committed.iter().filter(|&&c| c).count()
    }

    pub fn is_complete(&self) -> bool {
        self.committed.iter().all(|&c| c)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
