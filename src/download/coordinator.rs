//! Download coordinator
//!
//! Walks the peer list one connection at a time. A piece cursor survives
//! across attempts: when a peer fails, the next one picks up at the first
//! piece that has not been verified yet.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cli::Config;
use crate::error::TorrentError;
use crate::peer::{PeerAddress, PeerConnection, PeerSession, VerifiedPiece};
use crate::storage::{FileAssembly, PieceJob};
use crate::torrent::TorrentMetadata;

/// Counters for one coordinated download
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Peers contacted
    pub attempts: usize,
    /// Peers abandoned after a recoverable error
    pub failovers: usize,
    pub pieces_verified: usize,
    pub bytes_verified: u64,
}

/// Fetches pieces from an ordered peer list with failover
pub struct DownloadCoordinator {
    peers: Vec<PeerAddress>,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    peer_timeout: Duration,
    verify_handshake: bool,
}

impl DownloadCoordinator {
    pub fn new(peers: Vec<PeerAddress>, info_hash: [u8; 20], peer_id: [u8; 20], config: &Config) -> Self {
        debug!("Coordinator: {} peers, timeout {:?}", peers.len(), config.peer_timeout);
        Self {
            peers,
            info_hash,
            peer_id,
            peer_timeout: config.peer_timeout,
            verify_handshake: config.verify_handshake,
        }
    }

    pub fn peers(&self) -> &[PeerAddress] {
        &self.peers
    }

    /// Download and verify every piece; `on_piece` sees each one as it is
    /// committed to the output buffer
    pub async fn download_all<F>(
        &self,
        metadata: &TorrentMetadata,
        mut on_piece: F,
    ) -> Result<(Vec<u8>, DownloadStats), TorrentError>
    where
        F: FnMut(&VerifiedPiece),
    {
        let jobs: Vec<PieceJob> = (0..metadata.num_pieces()).filter_map(|i| metadata.piece_job(i)).collect();
        let mut file = FileAssembly::new(metadata.length, metadata.piece_length, jobs.len());

        let stats = self
            .fetch(&jobs, |piece| {
                file.commit(piece.index, &piece.data)?;
                on_piece(&piece);
                Ok(())
            })
            .await?;

        if !file.is_complete() {
            return Err(TorrentError::storage_error_full(
                "download finished with pieces missing",
                "memory",
                format!("{} of {} pieces committed", file.committed_count(), jobs.len()),
            ));
        }

        info!(
            "Download complete: {} pieces, {} bytes from {} peer attempts ({} failovers)",
            stats.pieces_verified, stats.bytes_verified, stats.attempts, stats.failovers
        );
        Ok((file.into_bytes(), stats))
    }

    /// Download and verify a single piece
    pub async fn download_piece(&self, metadata: &TorrentMetadata, index: usize) -> Result<Vec<u8>, TorrentError> {
        let job = metadata.piece_job(index).ok_or_else(|| {
            TorrentError::config_error_with_field(
                format!("piece index {} out of range, torrent has {} pieces", index, metadata.num_pieces()),
                "index",
            )
        })?;

        let mut output = None;
        self.fetch(&[job], |piece| {
            output = Some(piece.data);
            Ok(())
        })
        .await?;

        output.ok_or_else(|| TorrentError::exhaustion_error(format!("piece {} was not delivered", index), 0))
    }

    async fn fetch<F>(&self, jobs: &[PieceJob], mut on_piece: F) -> Result<DownloadStats, TorrentError>
    where
        F: FnMut(VerifiedPiece) -> Result<(), TorrentError>,
    {
        let mut stats = DownloadStats::default();
        let mut cursor = 0usize;
        if jobs.is_empty() {
            return Ok(stats);
        }

        for addr in &self.peers {
            let remaining = &jobs[cursor..];
            stats.attempts += 1;
            info!(
                "Trying peer {} ({} of {}) for {} pieces starting at {}",
                addr,
                stats.attempts,
                self.peers.len(),
                remaining.len(),
                remaining[0].index
            );

            let session = PeerSession::new(self.info_hash, self.peer_id, remaining.iter().copied())
                .with_handshake_verification(self.verify_handshake);
            let result = match PeerConnection::connect(*addr, session, self.peer_timeout).await {
                Ok(connection) => {
                    connection
                        .run(|piece| {
                            stats.pieces_verified += 1;
                            stats.bytes_verified += piece.data.len() as u64;
                            on_piece(piece)?;
                            cursor += 1;
                            Ok(())
                        })
                        .await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) if cursor == jobs.len() => return Ok(stats),
                Ok(()) => warn!("Peer {} stopped with {} pieces outstanding", addr, jobs.len() - cursor),
                Err(e) if e.is_recoverable() => {
                    stats.failovers += 1;
                    warn!(
                        "Failing over from peer {}: {} ({} of {} pieces verified)",
                        addr,
                        e,
                        cursor,
                        jobs.len()
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(TorrentError::exhaustion_error(
            format!("peer list exhausted with {} of {} pieces verified", cursor, jobs.len()),
            stats.attempts,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::testing::{closed_port, FakePeer};
    use sha1::{Digest, Sha1};

    const INFO_HASH: [u8; 20] = [0x5a; 20];
    const PIECE_LENGTH: usize = 32 * 1024;

    fn content() -> Vec<u8> {
        (0..100_000u32).map(|i| (i * 7 % 253) as u8).collect()
    }

    fn pieces(content: &[u8]) -> Vec<Vec<u8>> {
        content.chunks(PIECE_LENGTH).map(|c| c.to_vec()).collect()
    }

    fn metadata(content: &[u8]) -> TorrentMetadata {
        TorrentMetadata {
            announce: "http://tracker.invalid/announce".to_string(),
            name: Some("sample.bin".to_string()),
            length: content.len() as u64,
            piece_length: PIECE_LENGTH as u64,
            pieces: pieces(content).iter().map(|p| Sha1::digest(p).into()).collect(),
        }
    }

    fn coordinator(peers: Vec<PeerAddress>) -> DownloadCoordinator {
        let config = Config { peer_timeout: Duration::from_millis(300), ..Config::default() };
        DownloadCoordinator::new(peers, INFO_HASH, [1u8; 20], &config)
    }

    #[tokio::test]
    async fn test_failover_keeps_verified_pieces() {
        let data = content();
        let meta = metadata(&data);
        assert_eq!(meta.num_pieces(), 4);

        let silent = FakePeer::new(INFO_HASH, pieces(&data)).silent();
        let corrupt = FakePeer::new(INFO_HASH, pieces(&data)).corrupt_piece(2);
        let good = FakePeer::new(INFO_HASH, pieces(&data));
        let addrs = vec![
            silent.clone().listen().await,
            corrupt.clone().listen().await,
            good.clone().listen().await,
        ];

        let mut seen = Vec::new();
        let (output, stats) = coordinator(addrs).download_all(&meta, |piece| seen.push(piece.index)).await.unwrap();

        assert_eq!(output, data);
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(
            stats,
            DownloadStats { attempts: 3, failovers: 2, pieces_verified: 4, bytes_verified: data.len() as u64 }
        );
        assert!(silent.requested_pieces().is_empty());
        assert!(corrupt.requested_pieces().contains(&2));
        let retried = good.requested_pieces();
        assert!(!retried.contains(&0) && !retried.contains(&1));
        assert!(retried.contains(&2) && retried.contains(&3));
    }

    #[tokio::test]
    async fn test_refused_peer_is_skipped() {
        let data = content();
        let good = FakePeer::new(INFO_HASH, pieces(&data)).listen().await;
        let (output, stats) = coordinator(vec![closed_port().await, good])
            .download_all(&metadata(&data), |_| {})
            .await
            .unwrap();
        assert_eq!(output, data);
        assert_eq!((stats.attempts, stats.failovers, stats.pieces_verified), (2, 1, 4));
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let data = content();
        let bad = FakePeer::new(INFO_HASH, pieces(&data)).corrupt_piece(0).listen().await;
        let err = coordinator(vec![bad, closed_port().await])
            .download_all(&metadata(&data), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, TorrentError::ExhaustionError { attempts: 2, .. }));
        assert!(!err.is_recoverable());

        let err = coordinator(Vec::new()).download_all(&metadata(&data), |_| {}).await.unwrap_err();
        assert!(matches!(err, TorrentError::ExhaustionError { attempts: 0, .. }));
    }

    #[tokio::test]
    async fn test_download_single_piece_with_failover() {
        let data = content();
        let corrupt = FakePeer::new(INFO_HASH, pieces(&data)).corrupt_piece(3).listen().await;
        let good = FakePeer::new(INFO_HASH, pieces(&data)).listen().await;

        let piece = coordinator(vec![corrupt, good]).download_piece(&metadata(&data), 3).await.unwrap();
        assert_eq!(piece, &data[3 * PIECE_LENGTH..]);
        assert_eq!(piece.len(), 100_000 - 3 * PIECE_LENGTH);
    }

    #[tokio::test]
    async fn test_piece_index_out_of_range() {
        let data = content();
        let err = coordinator(Vec::new()).download_piece(&metadata(&data), 4).await.unwrap_err();
        assert!(matches!(err, TorrentError::ConfigError { .. }));
    }

    #[tokio::test]
    async fn test_empty_content_needs_no_peers() {
        let meta = TorrentMetadata {
            announce: String::new(),
            name: None,
            length: 0,
            piece_length: 16,
            pieces: Vec::new(),
        };
        let (output, stats) = coordinator(Vec::new()).download_all(&meta, |_| {}).await.unwrap();
        assert!(output.is_empty());
        assert_eq!(stats, DownloadStats::default());
    }
}
