//! Progress display module
//!
//! Per-piece progress lines on stderr, so stdout only carries results.

use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Format bytes to human readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration to human readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;

    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:01}s", seconds, duration.subsec_millis() / 100)
    }
}

/// Progress reporting for a download
pub struct ProgressDisplay<W: Write = io::Stderr> {
    out: W,
    start_time: Instant,
    total_pieces: usize,
    verified: usize,
    bytes: u64,
    quiet: bool,
}

impl ProgressDisplay {
    /// Report to stderr
    pub fn new(total_pieces: usize, quiet: bool) -> Self {
        Self::with_writer(io::stderr(), total_pieces, quiet)
    }
}

impl<W: Write> ProgressDisplay<W> {
    pub fn with_writer(out: W, total_pieces: usize, quiet: bool) -> Self {
        Self {
            out,
            start_time: Instant::now(),
            total_pieces,
            verified: 0,
            bytes: 0,
            quiet,
        }
    }

    /// Record one verified piece and print `Piece i/N verified`
    pub fn piece_verified(&mut self, index: u32, len: usize) {
        self.verified += 1;
        self.bytes += len as u64;
        if self.quiet {
            return;
        }
        let _ = writeln!(
            self.out,
            "Piece {}/{} verified (index {}, {})",
            self.verified,
            self.total_pieces,
            index,
            format_bytes(len as u64)
        );
    }

    pub fn verified(&self) -> usize {
        self.verified
    }

    /// Print the summary line
    pub fn finish(&mut self) {
        if self.quiet {
            return;
        }
        let _ = writeln!(
            self.out,
            "Fetched {} in {} pieces ({})",
            format_bytes(self.bytes),
            self.verified,
            format_duration(self.start_time.elapsed())
        );
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn test_piece_lines() {
        let mut progress = ProgressDisplay::with_writer(Vec::new(), 2, false);
        progress.piece_verified(0, 1024);
        progress.piece_verified(1, 10);
        assert_eq!(progress.verified(), 2);
        let text = String::from_utf8(progress.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Piece 1/2 verified (index 0, 1.00 KB)");
        assert_eq!(lines[1], "Piece 2/2 verified (index 1, 10.00 B)");
    }

    #[test]
    fn test_quiet_prints_nothing() {
        let mut progress = ProgressDisplay::with_writer(Vec::new(), 1, true);
        progress.piece_verified(0, 5);
        progress.finish();
        assert_eq!(progress.verified(), 1);
        assert!(progress.into_inner().is_empty());
    }
}
