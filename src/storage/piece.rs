//! Piece assembly
//!
//! A piece is fetched in 16 KiB blocks. The assembly buffer hands out block
//! requests under the pipelining window, stores arriving blocks at their
//! declared offset and checks the finished piece against its SHA-1.

use sha1::{Digest, Sha1};
use tracing::{debug, trace};

use crate::error::TorrentError;
use crate::protocol::{BLOCK_SIZE, MAX_PIPELINE};

/// One block request: piece index, offset within the piece, length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    pub piece_index: u32,
    pub begin: u32,
    pub length: u32,
}

/// What the coordinator asks a connection to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceJob {
    pub index: u32,
    pub length: u32,
    pub hash: [u8; 20],
}

/// Buffer for one piece attempt
#[derive(Debug)]
pub struct PieceAssembly {
    job: PieceJob,
    data: Vec<u8>,
    received: Vec<bool>,
    requested_blocks: u32,
    received_blocks: u32,
    total_blocks: u32,
}

impl PieceAssembly {
    /// Start an empty assembly buffer sized to the piece
    pub fn new(job: PieceJob) -> Self {
        let total_blocks = job.length.div_ceil(BLOCK_SIZE);
        trace!("New assembly for piece {}: {} bytes, {} blocks", job.index, job.length, total_blocks);
        Self {
            job,
            data: vec![0u8; job.length as usize],
            received: vec![false; total_blocks as usize],
            requested_blocks: 0,
            received_blocks: 0,
            total_blocks,
        }
    }

    pub fn index(&self) -> u32 {
        self.job.index
    }

    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    pub fn requested_blocks(&self) -> u32 {
        self.requested_blocks
    }

    pub fn received_blocks(&self) -> u32 {
        self.received_blocks
    }

    /// Requests sent but not yet answered
    pub fn outstanding(&self) -> u32 {
        self.requested_blocks - self.received_blocks
    }

    fn block_len(&self, block: u32) -> u32 {
        let begin = block * BLOCK_SIZE;
        BLOCK_SIZE.min(self.job.length - begin)
    }

    /// Next request to send, if the window has room and blocks remain
    pub fn next_request(&mut self) -> Option<BlockRequest> {
        if self.requested_blocks >= self.total_blocks || self.outstanding() >= MAX_PIPELINE {
            return None;
        }

        let block = self.requested_blocks;
        self.requested_blocks += 1;
        Some(BlockRequest {
            piece_index: self.job.index,
            begin: block * BLOCK_SIZE,
            length: self.block_len(block),
        })
    }

    /// Store a received block at its declared offset.
    ///
    /// The block must answer one of the requests sent for this piece; writes
    /// past the end of the piece are rejected before touching the buffer.
    pub fn write_block(&mut self, piece_index: u32, begin: u32, block: &[u8]) -> Result<(), TorrentError> {
        if piece_index != self.job.index {
            return Err(TorrentError::protocol_error(format!(
                "block for piece {} while assembling piece {}",
                piece_index, self.job.index
            )));
        }

        let end = begin as u64 + block.len() as u64;
        if end > self.job.length as u64 {
            return Err(TorrentError::protocol_error(format!(
                "block {}..{} out of range for piece {} of {} bytes",
                begin, end, self.job.index, self.job.length
            )));
        }

        let block_index = begin / BLOCK_SIZE;
        if begin % BLOCK_SIZE != 0
            || block_index >= self.requested_blocks
            || block.len() as u32 != self.block_len(block_index)
        {
            return Err(TorrentError::protocol_error(format!(
                "unrequested block at offset {} ({} bytes) for piece {}",
                begin,
                block.len(),
                self.job.index
            )));
        }

        if self.received[block_index as usize] {
            debug!("Duplicate block {} for piece {}, ignoring", block_index, self.job.index);
            return Ok(());
        }

        self.data[begin as usize..end as usize].copy_from_slice(block);
        self.received[block_index as usize] = true;
        self.received_blocks += 1;
        Ok(())
    }

    /// All blocks received
    pub fn is_complete(&self) -> bool {
        self.received_blocks == self.total_blocks
    }

    /// SHA-1 of the assembled bytes matches the expected digest
    pub fn verify(&self) -> bool {
        let mut hasher = Sha1::new();
        hasher.update(&self.data);
        let digest: [u8; 20] = hasher.finalize().into();
        digest == self.job.hash
    }

    /// Hand over the assembled bytes
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
