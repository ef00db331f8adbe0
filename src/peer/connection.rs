//! Peer connection module
//!
//! Drives a [`PeerSession`] over a socket: writes whatever the session
//! queued, reads with an idle timeout and hands verified pieces to the
//! caller as soon as they complete.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::TorrentError;
use crate::peer::{PeerAddress, PeerSession, SessionState, VerifiedPiece};
use crate::protocol::Handshake;

/// Time a peer may stay silent before the connection is abandoned
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

const READ_CHUNK: usize = 32 * 1024;

/// A session bound to a transport
pub struct PeerConnection<S> {
    addr: PeerAddress,
    stream: S,
    session: PeerSession,
    idle_timeout: Duration,
}

impl PeerConnection<TcpStream> {
    /// Open a TCP connection to the peer, bounded by `idle_timeout`
    pub async fn connect(addr: PeerAddress, session: PeerSession, idle_timeout: Duration) -> Result<Self, TorrentError> {
        info!("Connecting to peer: {}", addr);

        let stream = timeout(idle_timeout, TcpStream::connect(addr.socket_addr()))
            .await
            .map_err(|_| {
                warn!("Connection timeout to {}", addr);
                TorrentError::network_error_with_address("Connection timeout", addr.to_string())
            })?
            .map_err(|e| {
                warn!("Failed to connect to {}: {}", addr, e);
                TorrentError::network_error_full("Failed to connect", addr.to_string(), e.to_string())
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            trace!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }

        debug!("Connected to peer: {}", addr);
        Ok(Self::new(stream, addr, session, idle_timeout))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> PeerConnection<S> {
    /// Wrap an already connected transport; the session's handshake is queued
    pub fn new(stream: S, addr: PeerAddress, mut session: PeerSession, idle_timeout: Duration) -> Self {
        session.start();
        Self { addr, stream, session, idle_timeout }
    }

    pub fn session(&self) -> &PeerSession {
        &self.session
    }

    /// Exchange handshakes only and return the peer's
    pub async fn handshake(mut self) -> Result<Handshake, TorrentError> {
        let addr = self.addr.to_string();
        self.drive(|session| session.remote_handshake().is_some(), &mut |_: VerifiedPiece| Ok(()))
            .await
            .map_err(|e| e.with_peer(addr.clone()))?;

        self.session
            .remote_handshake()
            .cloned()
            .ok_or_else(|| TorrentError::protocol_error_with_peer("handshake not received", addr))
    }

    /// Download every piece assigned to the session.
    ///
    /// `on_piece` runs for each verified piece in completion order, including
    /// pieces that completed before the connection failed.
    pub async fn run<F>(mut self, mut on_piece: F) -> Result<(), TorrentError>
    where
        F: FnMut(VerifiedPiece) -> Result<(), TorrentError>,
    {
        let addr = self.addr.to_string();
        self.drive(|session| session.state() == SessionState::Done, &mut on_piece)
            .await
            .map_err(|e| {
                warn!("Peer {} failed: {}", addr, e);
                e.with_peer(addr.clone())
            })
    }

    async fn drive<F>(&mut self, finished: impl Fn(&PeerSession) -> bool, on_piece: &mut F) -> Result<(), TorrentError>
    where
        F: FnMut(VerifiedPiece) -> Result<(), TorrentError>,
    {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            self.flush().await?;

            if finished(&self.session) {
                if let Err(e) = self.stream.shutdown().await {
                    trace!("Shutdown of {} failed: {}", self.addr, e);
                }
                debug!("Session with {} finished ({})", self.addr, self.session.state());
                return Ok(());
            }

            let n = match timeout(self.idle_timeout, self.stream.read(&mut chunk)).await {
                Ok(read) => read.map_err(|e| {
                    TorrentError::network_error_full("Failed to read from peer", self.addr.to_string(), e.to_string())
                })?,
                Err(_) => {
                    warn!("Peer {} idle for {:?} while {}", self.addr, self.idle_timeout, self.session.state());
                    return Err(TorrentError::network_error_with_address(
                        format!("no data for {:?}", self.idle_timeout),
                        self.addr.to_string(),
                    ));
                }
            };

            if n == 0 {
                return self.session.on_close();
            }

            trace!("Read {} bytes from {}", n, self.addr);
            let result = self.session.on_data(&chunk[..n]);
            while let Some(piece) = self.session.take_verified() {
                on_piece(piece)?;
            }
            result?;
        }
    }

    async fn flush(&mut self) -> Result<(), TorrentError> {
        while let Some(bytes) = self.session.take_outgoing() {
            timeout(self.idle_timeout, self.stream.write_all(&bytes))
                .await
                .map_err(|_| TorrentError::network_error_with_address("Write timeout", self.addr.to_string()))?
                .map_err(|e| {
                    TorrentError::network_error_full("Failed to write to peer", self.addr.to_string(), e.to_string())
                })?;
        }
        Ok(())
    }
}
