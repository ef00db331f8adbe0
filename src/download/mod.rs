//! Download module
//!
//! Sequential, failover-driven piece download across a peer list.

pub mod coordinator;

pub use coordinator::{DownloadCoordinator, DownloadStats};
