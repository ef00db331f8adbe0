//! Output destinations
//!
//! Finished downloads are handed to an [`OutputWriter`] once every required
//! piece has been verified. The CLI writes to a file.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::TorrentError;

/// Destination for verified content
#[async_trait]
pub trait OutputWriter: Send + Sync {
    /// Persist the complete output in one go
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TorrentError>;

    /// Human readable name of the destination
    fn describe(&self) -> String;
}

/// Writes output to a path on the local filesystem
#[derive(Debug, Clone)]
pub struct FileOutput {
    path: PathBuf,
}

impl FileOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl OutputWriter for FileOutput {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TorrentError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TorrentError::storage_error_full("Failed to create output directory", parent.display().to_string(), e.to_string())
            })?;
        }

        tokio::fs::write(&self.path, data).await.map_err(|e| {
            error!("Failed to write output '{}': {}", self.path.display(), e);
            TorrentError::storage_error_full("Failed to write output", self.path.display().to_string(), e.to_string())
        })?;

        info!("Wrote {} bytes to {}", data.len(), self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
