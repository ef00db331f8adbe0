//! Peer session state
//!
//! Lifecycle of one download session with one peer.

use std::fmt;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// TCP connect in progress
    #[default]
    Connecting,
    /// Our handshake is queued, waiting for the peer's 68 bytes
    Handshaking,
    /// Handshake done, waiting for the peer's bitfield
    AwaitingBitfield,
    /// `interested` sent, waiting for `unchoke`
    Interested,
    /// Unchoked and requesting blocks
    Downloading,
    /// Every assigned piece verified
    Done,
    /// Unrecoverable for this peer; the connection should be dropped
    Failed,
}

impl SessionState {
    /// Check if the session has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }

    /// Check if framed messages are expected, i.e. the handshake is behind us
    pub fn expects_messages(&self) -> bool {
        matches!(
            self,
            SessionState::AwaitingBitfield | SessionState::Interested | SessionState::Downloading
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Handshaking => "handshaking",
            SessionState::AwaitingBitfield => "awaiting bitfield",
            SessionState::Interested => "interested",
            SessionState::Downloading => "downloading",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}
