//! Progress tracking and human-readable formatting for run output.

/// Progress of one parallel phase (digesting or copying)
#[derive(Debug, Clone)]
pub struct PhaseProgress {
    /// Number of tasks settled so far
    pub files_processed: usize,

    /// Total number of tasks in the phase
    pub total_files: usize,

    /// Report every N settled tasks (and always on the last one)
    pub report_every: usize,
}

impl PhaseProgress {
    pub fn new(total_files: usize, report_every: usize) -> Self {
        Self {
            files_processed: 0,
            total_files,
            report_every: report_every.max(1),
        }
    }

    /// Record settled tasks; returns true when a progress line is due
    pub fn update(&mut self, files_processed: usize) -> bool {
        self.files_processed = files_processed;
        self.files_processed % self.report_every == 0 || self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.files_processed >= self.total_files
    }

    pub fn percent_complete(&self) -> f64 {
        if self.total_files > 0 {
            (self.files_processed as f64 / self.total_files as f64) * 100.0
        } else {
            100.0
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

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

    #[test]
    fn test_phase_progress_reporting_cadence() {
        let mut progress = PhaseProgress::new(25, 10);
        assert!(!progress.update(1));
        assert!(progress.update(10));
        assert!(!progress.update(11));
        assert!(progress.update(20));
        assert!(progress.update(25));
        assert!(progress.is_complete());
    }

    #[test]
    fn test_phase_progress_percent() {
        let mut progress = PhaseProgress::new(4, 1);
        progress.update(1);
        assert!((progress.percent_complete() - 25.0).abs() < 0.01);

        let empty = PhaseProgress::new(0, 1);
        assert!((empty.percent_complete() - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(5010), "4.89 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m");
    }
}
