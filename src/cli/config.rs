//! CLI configuration module
//!
//! Runtime settings derived from the command line.

use std::time::Duration;

use crate::cli::args::CliArgs;
use crate::error::TorrentError;
use crate::peer::DEFAULT_IDLE_TIMEOUT;
use crate::tracker::DEFAULT_PORT;

/// Configuration for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Idle timeout per peer connection
    pub peer_timeout: Duration,
    /// Port reported to the tracker
    pub listen_port: u16,
    /// Fail over on a handshake for another torrent
    pub verify_handshake: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            peer_timeout: DEFAULT_IDLE_TIMEOUT,
            listen_port: DEFAULT_PORT,
            verify_handshake: false,
            verbose: false,
            quiet: false,
        }
    }
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            peer_timeout: Duration::from_secs(args.timeout_secs),
            listen_port: args.port,
            verify_handshake: args.verify_handshake,
            verbose: args.verbose,
            quiet: args.quiet,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), TorrentError> {
        if self.peer_timeout.is_zero() {
            return Err(TorrentError::config_error_with_field("peer timeout must be at least one second", "timeout_secs"));
        }

        if self.listen_port == 0 {
            return Err(TorrentError::config_error_with_field("port cannot be 0", "port"));
        }

        Ok(())
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
