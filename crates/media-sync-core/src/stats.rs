use crate::engine::{FileOutcome, RunState};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::time::Duration;

const MB: f64 = 1024.0 * 1024.0;

/// Counters for one run. Created at start, returned at the end; never shared
/// between runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatistics {
    pub total_files: usize,
    pub processed_files: usize,
    pub successful_files: usize,
    pub skipped_files: usize,
    pub error_files: usize,
    pub duplicates_found: usize,
    pub bytes_processed: u64,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub duration: Duration,
    pub status: RunState,
    pub error_message: Option<String>,
    /// Run-level problems that did not fail the run, such as a failed save of
    /// the fingerprint index.
    pub warnings: Vec<String>,
}

impl Default for SyncStatistics {
    fn default() -> Self {
        Self {
            total_files: 0,
            processed_files: 0,
            successful_files: 0,
            skipped_files: 0,
            error_files: 0,
            duplicates_found: 0,
            bytes_processed: 0,
            start_time: None,
            end_time: None,
            duration: Duration::ZERO,
            status: RunState::Idle,
            error_message: None,
            warnings: Vec::new(),
        }
    }
}

impl SyncStatistics {
    pub fn started() -> Self {
        Self {
            start_time: Some(Local::now()),
            status: RunState::Running,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &FileOutcome, size: u64) {
        self.processed_files += 1;
        match outcome {
            FileOutcome::Moved { .. } => {
                self.successful_files += 1;
                self.bytes_processed += size;
            }
            FileOutcome::Duplicate { .. } => {
                self.skipped_files += 1;
                self.duplicates_found += 1;
            }
            FileOutcome::Failed { .. } => self.error_files += 1,
        }
    }

    pub fn finish(&mut self, status: RunState) {
        let end = Local::now();
        if let Some(start) = self.start_time {
            self.duration = (end - start).to_std().unwrap_or_default();
        }
        self.end_time = Some(end);
        self.status = status;
    }

    pub fn elapsed(&self) -> Duration {
        if self.end_time.is_some() {
            return self.duration;
        }
        self.start_time
            .and_then(|start| (Local::now() - start).to_std().ok())
            .unwrap_or_default()
    }

    pub fn mb_processed(&self) -> f64 {
        self.bytes_processed as f64 / MB
    }

    pub fn mb_per_second(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.mb_processed() / secs
        } else {
            0.0
        }
    }

    pub fn files_per_minute(&self) -> f64 {
        let minutes = self.elapsed().as_secs_f64() / 60.0;
        if minutes > 0.0 {
            self.processed_files as f64 / minutes
        } else {
            0.0
        }
    }

    /// Append this run as one CSV row, writing headers when the file is new.
    pub fn write_csv(&self, path: &Path) -> io::Result<()> {
        let is_new = !path.exists() || path.metadata().map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer
            .serialize(StatsRow::from(self))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        writer.flush()
    }
}

#[derive(Debug, Serialize)]
struct StatsRow {
    start_time: String,
    end_time: String,
    status: String,
    total_files: usize,
    processed_files: usize,
    successful_files: usize,
    skipped_files: usize,
    error_files: usize,
    duplicates_found: usize,
    bytes_processed: u64,
    duration_secs: f64,
    mb_per_second: f64,
}

impl From<&SyncStatistics> for StatsRow {
    fn from(stats: &SyncStatistics) -> Self {
        let fmt_time = |t: Option<DateTime<Local>>| {
            t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default()
        };
        StatsRow {
            start_time: fmt_time(stats.start_time),
            end_time: fmt_time(stats.end_time),
            status: stats.status.to_string(),
            total_files: stats.total_files,
            processed_files: stats.processed_files,
            successful_files: stats.successful_files,
            skipped_files: stats.skipped_files,
            error_files: stats.error_files,
            duplicates_found: stats.duplicates_found,
            bytes_processed: stats.bytes_processed,
            duration_secs: stats.elapsed().as_secs_f64(),
            mb_per_second: stats.mb_per_second(),
        }
    }
}

impl fmt::Display for SyncStatistics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Status:      {}", self.status)?;
        writeln!(
            f,
            "Files:       {} processed of {}",
            self.processed_files, self.total_files
        )?;
        writeln!(f, "Moved:       {}", self.successful_files)?;
        writeln!(f, "Duplicates:  {}", self.duplicates_found)?;
        writeln!(f, "Skipped:     {}", self.skipped_files)?;
        writeln!(f, "Errors:      {}", self.error_files)?;
        writeln!(
            f,
            "Data:        {:.2} MB at {:.2} MB/s ({:.1} files/min)",
            self.mb_processed(),
            self.mb_per_second(),
            self.files_per_minute()
        )?;
        write!(f, "Elapsed:     {}", format_hms(self.elapsed()))?;
        if let Some(message) = &self.error_message {
            write!(f, "\nError:       {}", message)?;
        }
        for warning in &self.warnings {
            write!(f, "\nWarning:     {}", warning)?;
        }
        Ok(())
    }
}

pub fn format_hms(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_record_counts_each_outcome() {
        let mut stats = SyncStatistics::started();
        stats.record(
            &FileOutcome::Moved {
                destination: PathBuf::from("/d/a.jpg"),
            },
            2048,
        );
        stats.record(
            &FileOutcome::Duplicate {
                reject: PathBuf::from("/r/b.jpg"),
            },
            2048,
        );
        stats.record(
            &FileOutcome::Failed {
                error: "boom".to_string(),
            },
            0,
        );

        assert_eq!(stats.processed_files, 3);
        assert_eq!(stats.successful_files, 1);
        assert_eq!(stats.duplicates_found, 1);
        assert_eq!(stats.skipped_files, 1);
        assert_eq!(stats.error_files, 1);
        assert_eq!(stats.bytes_processed, 2048);
    }

    #[test]
    fn test_finish_sets_status_and_end() {
        let mut stats = SyncStatistics::started();
        stats.finish(RunState::Completed);
        assert_eq!(stats.status, RunState::Completed);
        assert!(stats.end_time.is_some());
        assert_eq!(stats.elapsed(), stats.duration);
    }

    #[test]
    fn test_csv_appends_rows_with_single_header() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("stats.csv");
        let mut stats = SyncStatistics::started();
        stats.finish(RunState::Completed);

        stats.write_csv(&path).unwrap();
        stats.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("start_time,"));
        assert!(lines[1].contains(",Completed,"));
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(Duration::from_secs(3_725)), "01:02:05");
    }
}
