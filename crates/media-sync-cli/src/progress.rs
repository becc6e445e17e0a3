use indicatif::{ProgressBar, ProgressStyle};
use media_sync_core::{FileOutcome, FileReport, ProgressReporter, RunState, SyncProgress, SyncStatistics};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Renders a sync run as an indicatif bar. Failed files are printed above it.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.guard();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.guard().take() {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_sync_start(&self, total_files: usize) {
        let pb = ProgressBar::new(total_files as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} Syncing [{bar:30.cyan/dim}] {pos}/{len} {msg} ({eta} remaining)",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─")
            .tick_chars(TICK_CHARS),
        );
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_file_processed(&self, report: &FileReport) {
        if let FileOutcome::Failed { error } = &report.outcome {
            if let Some(pb) = self.guard().as_ref() {
                pb.println(format!(
                    "  \x1b[31m✗\x1b[0m {}: {}",
                    report.path.display(),
                    error
                ));
            }
        }
    }

    fn on_progress(&self, progress: &SyncProgress) {
        if let Some(pb) = self.guard().as_ref() {
            pb.set_position(progress.processed as u64);
            pb.set_message(format!(
                "{} ({:.1} MB/s)",
                progress.current_file,
                progress.mb_per_second()
            ));
        }
    }

    fn on_state_change(&self, state: RunState) {
        if state == RunState::Cancelled {
            if let Some(pb) = self.guard().as_ref() {
                pb.println("  \x1b[33m!\x1b[0m Sync cancelled, in-flight files finished");
            }
        }
    }

    fn on_sync_complete(&self, stats: &SyncStatistics) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Sync {}: {} files in {:.2}s",
            stats.status,
            stats.processed_files,
            stats.elapsed().as_secs_f64()
        );
    }
}
