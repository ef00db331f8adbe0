//! Peer module
//!
//! Peer addresses, the per-connection session state machine and the socket
//! driver around it.

pub mod address;
pub mod connection;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use address::PeerAddress;
pub use connection::{PeerConnection, DEFAULT_IDLE_TIMEOUT};
pub use session::{PeerSession, VerifiedPiece};
pub use state::SessionState;
