use crate::engine::{FileReport, RunState};
use crate::stats::SyncStatistics;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_EMIT_INTERVAL: Duration = Duration::from_millis(100);

/// Read-only view of a run in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncProgress {
    pub current_file: String,
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
    pub bytes_processed: u64,
    pub duplicates: usize,
    pub errors: usize,
}

impl SyncProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.processed as f64 * 100.0 / self.total as f64
    }

    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }

    pub fn mb_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_processed as f64 / (1024.0 * 1024.0) / secs
        } else {
            0.0
        }
    }

    /// Remaining time at the current file rate. `None` until a rate exists.
    pub fn eta(&self) -> Option<Duration> {
        let rate = self.files_per_second();
        if rate <= 0.0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.processed) as f64;
        Some(Duration::from_secs_f64(remaining / rate))
    }
}

/// Receives run events. The CLI renders them with indicatif; embedders can
/// forward them anywhere. All methods default to no-ops and are called from
/// worker threads.
pub trait ProgressReporter: Send + Sync {
    fn on_sync_start(&self, _total_files: usize) {}
    fn on_file_processed(&self, _report: &FileReport) {}
    fn on_progress(&self, _progress: &SyncProgress) {}
    fn on_state_change(&self, _state: RunState) {}
    fn on_sync_complete(&self, _stats: &SyncStatistics) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Lets a progress update through every `batch` files or once `interval` has
/// passed, whichever comes first.
#[derive(Debug)]
pub struct ProgressThrottle {
    batch: usize,
    interval: Duration,
    state: Mutex<ThrottleState>,
}

#[derive(Debug)]
struct ThrottleState {
    pending: usize,
    last_emit: Instant,
}

impl ProgressThrottle {
    pub fn new(batch: usize) -> Self {
        Self::with_interval(batch, DEFAULT_EMIT_INTERVAL)
    }

    pub fn with_interval(batch: usize, interval: Duration) -> Self {
        Self {
            batch: batch.max(1),
            interval,
            state: Mutex::new(ThrottleState {
                pending: 0,
                last_emit: Instant::now(),
            }),
        }
    }

    /// Count one processed file and report whether an update is due.
    pub fn tick(&self) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.pending += 1;
        if state.pending >= self.batch || state.last_emit.elapsed() >= self.interval {
            state.pending = 0;
            state.last_emit = Instant::now();
            true
        } else {
            false
        }
    }
}
