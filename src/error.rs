//! Error types for bitfetch
//!
//! A single error enum covers every stage of a run: decoding metadata,
//! talking to the tracker, driving a peer connection and writing output.
//! Network, protocol and integrity errors are recoverable by moving on to
//! the next peer; everything else ends the current command.

use std::fmt;

/// Error type for all bitfetch operations
#[derive(Debug, Clone)]
pub enum TorrentError {
    /// Malformed bencode data
    ParseError {
        message: String,
        position: Option<usize>,
    },

    /// Well-formed bencode that does not describe a usable torrent
    StructuralError {
        message: String,
        field: Option<String>,
    },

    /// A peer sent something that violates the wire protocol
    ProtocolError {
        message: String,
        peer: Option<String>,
    },

    /// Connection refused, timed out or closed early
    NetworkError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// A downloaded piece did not match its expected SHA-1
    IntegrityError {
        message: String,
        piece_index: u32,
        peer: Option<String>,
    },

    /// Every candidate peer has been tried
    ExhaustionError {
        message: String,
        attempts: usize,
    },

    /// The tracker rejected the announce or replied with garbage
    TrackerError {
        message: String,
        url: Option<String>,
        source: Option<String>,
    },

    /// Writing the output failed
    StorageError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Invalid user supplied configuration
    ConfigError {
        message: String,
        field: Option<String>,
    },
}

impl TorrentError {
    /// Create a new ParseError
    pub fn parse_error(message: impl Into<String>) -> Self {
        TorrentError::ParseError {
            message: message.into(),
            position: None,
        }
    }

    /// Create a new ParseError at a byte offset
    pub fn parse_error_at(message: impl Into<String>, position: usize) -> Self {
        TorrentError::ParseError {
            message: message.into(),
            position: Some(position),
        }
    }

    /// Create a new StructuralError
    pub fn structural_error(message: impl Into<String>) -> Self {
        TorrentError::StructuralError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new StructuralError naming the offending field
    pub fn structural_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::StructuralError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new ProtocolError
    pub fn protocol_error(message: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            peer: None,
        }
    }

    /// Create a new ProtocolError with peer address
    pub fn protocol_error_with_peer(message: impl Into<String>, peer: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            peer: Some(peer.into()),
        }
    }

    /// Create a new NetworkError
    pub fn network_error(message: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new NetworkError with address
    pub fn network_error_with_address(message: impl Into<String>, address: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: None,
        }
    }

    /// Create a new NetworkError with address and source
    pub fn network_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new IntegrityError for a piece
    pub fn integrity_error(message: impl Into<String>, piece_index: u32) -> Self {
        TorrentError::IntegrityError {
            message: message.into(),
            piece_index,
            peer: None,
        }
    }

    /// Create a new ExhaustionError
    pub fn exhaustion_error(message: impl Into<String>, attempts: usize) -> Self {
        TorrentError::ExhaustionError {
            message: message.into(),
            attempts,
        }
    }

    /// Create a new TrackerError
    pub fn tracker_error(message: impl Into<String>) -> Self {
        TorrentError::TrackerError {
            message: message.into(),
            url: None,
            source: None,
        }
    }

    /// Create a new TrackerError with url and source
    pub fn tracker_error_full(message: impl Into<String>, url: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::TrackerError {
            message: message.into(),
            url: Some(url.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new StorageError with path and source
    pub fn storage_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Attach the peer address to errors that can carry one
    pub fn with_peer(mut self, addr: impl Into<String>) -> Self {
        let addr = addr.into();
        match &mut self {
            TorrentError::ProtocolError { peer, .. } | TorrentError::IntegrityError { peer, .. } => {
                if peer.is_none() {
                    *peer = Some(addr);
                }
            }
            TorrentError::NetworkError { address, .. } => {
                if address.is_none() {
                    *address = Some(addr);
                }
            }
            _ => {}
        }
        self
    }

    /// Whether the download can continue by trying another peer
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TorrentError::NetworkError { .. }
                | TorrentError::ProtocolError { .. }
                | TorrentError::IntegrityError { .. }
        )
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentError::ParseError { message, position } => match position {
                Some(p) => write!(f, "Parse error: {} (at byte {})", message, p),
                None => write!(f, "Parse error: {}", message),
            },
            TorrentError::StructuralError { message, field } => match field {
                Some(k) => write!(f, "Structural error: {} (field: {})", message, k),
                None => write!(f, "Structural error: {}", message),
            },
            TorrentError::ProtocolError { message, peer } => match peer {
                Some(p) => write!(f, "Protocol error: {} (peer: {})", message, p),
                None => write!(f, "Protocol error: {}", message),
            },
            TorrentError::NetworkError { message, address, source } => match (address, source) {
                (Some(a), Some(s)) => write!(f, "Network error: {} (address: {}, source: {})", message, a, s),
                (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                (None, None) => write!(f, "Network error: {}", message),
            },
            TorrentError::IntegrityError { message, piece_index, peer } => match peer {
                Some(p) => write!(f, "Integrity error: {} (piece: {}, peer: {})", message, piece_index, p),
                None => write!(f, "Integrity error: {} (piece: {})", message, piece_index),
            },
            TorrentError::ExhaustionError { message, attempts } => {
                write!(f, "Exhaustion error: {} (after {} attempts)", message, attempts)
            }
            TorrentError::TrackerError { message, url, source } => match (url, source) {
                (Some(u), Some(s)) => write!(f, "Tracker error: {} (url: {}, source: {})", message, u, s),
                (Some(u), None) => write!(f, "Tracker error: {} (url: {})", message, u),
                (None, Some(s)) => write!(f, "Tracker error: {} (source: {})", message, s),
                (None, None) => write!(f, "Tracker error: {}", message),
            },
            TorrentError::StorageError { message, path, source } => match (path, source) {
                (Some(p), Some(s)) => write!(f, "Storage error: {} (path: {}, source: {})", message, p, s),
                (Some(p), None) => write!(f, "Storage error: {} (path: {})", message, p),
                (None, Some(s)) => write!(f, "Storage error: {} (source: {})", message, s),
                (None, None) => write!(f, "Storage error: {}", message),
            },
            TorrentError::ConfigError { message, field } => match field {
                Some(k) => write!(f, "Config error: {} (field: {})", message, k),
                None => write!(f, "Config error: {}", message),
            },
        }
    }
}

impl std::error::Error for TorrentError {}

impl From<std::io::Error> for TorrentError {
    fn from(err: std::io::Error) -> Self {
        TorrentError::NetworkError {
            message: "I/O failure".to_string(),
            address: None,
            source: Some(format!("{} ({})", err, err.kind())),
        }
    }
}

impl From<std::net::AddrParseError> for TorrentError {
    fn from(err: std::net::AddrParseError) -> Self {
        TorrentError::config_error_with_field(format!("Failed to parse address: {}", err), "peer")
    }
}

impl From<tokio::time::error::Elapsed> for TorrentError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TorrentError::network_error("Operation timed out")
    }
}

impl From<reqwest::Error> for TorrentError {
    fn from(err: reqwest::Error) -> Self {
        TorrentError::TrackerError {
            message: "HTTP request failed".to_string(),
            url: err.url().map(|u| u.to_string()),
            source: Some(err.to_string()),
        }
    }
}

impl From<url::ParseError> for TorrentError {
    fn from(err: url::ParseError) -> Self {
        TorrentError::TrackerError {
            message: "Invalid announce URL".to_string(),
            url: None,
            source: Some(err.to_string()),
        }
    }
}
