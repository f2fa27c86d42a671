//! Byte-level progress accounting over remote upload state.

use crate::remote::RemoteFileState;

/// Running byte totals for a set of remote files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressTally {
    /// Bytes the set accounts for
    pub total_bytes: u64,

    /// Bytes the network already holds (size x progress)
    pub uploaded_bytes: f64,
}

impl ProgressTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a file towards both totals.
    pub fn add(&mut self, file: &RemoteFileState) {
        self.total_bytes += file.size;
        self.uploaded_bytes += file.uploaded_bytes();
    }

    /// Percentage uploaded; an empty set is complete.
    pub fn percent(&self) -> f64 {
        percent_of(self.uploaded_bytes, self.total_bytes)
    }
}

/// `done / total` in percent, capped at 100. Nothing to transfer is 100%.
pub fn percent_of(done: f64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done / total as f64 * 100.0).min(100.0)
    }
}

/// Format bytes as human-readable string
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

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(size: u64, progress: f64) -> RemoteFileState {
        RemoteFileState {
            name: "x.1.dat".into(),
            size,
            progress,
            available: progress >= 100.0,
        }
    }

    #[test]
    fn test_tally_percent() {
        let mut tally = ProgressTally::new();
        tally.add(&file(100, 100.0));
        tally.add(&file(50, 40.0));
        assert_eq!(tally.total_bytes, 150);
        assert!((tally.uploaded_bytes - 120.0).abs() < 1e-9);
        assert!((tally.percent() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_tally_is_complete() {
        assert_eq!(ProgressTally::new().percent(), 100.0);
        assert_eq!(percent_of(0.0, 0), 100.0);
    }

    #[test]
    fn test_percent_is_capped() {
        assert_eq!(percent_of(200.0, 100), 100.0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(300), "5m 0s");
        assert_eq!(format_duration(3665), "1h 1m");
    }
}
