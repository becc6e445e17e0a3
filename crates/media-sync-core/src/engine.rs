use crate::capture::capture_timestamp;
use crate::classify::naming_label;
use crate::config::{validate_directory_path, AppConfig, SyncOptions};
use crate::error::{Error, FileError};
use crate::hasher::{FingerprintEngine, MetadataCache};
use crate::index::DuplicateIndex;
use crate::parallel::{available_processors, ParallelCoordinator};
use crate::planner::{place_reject, PathPlanner};
use crate::progress::{ProgressReporter, ProgressThrottle, SyncProgress};
use crate::scanner::{enumerate_files, Candidate};
use crate::stats::SyncStatistics;
use crate::storage::{keys, FingerprintStore, SettingsStore};
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_active(self) -> bool {
        matches!(self, RunState::Running | RunState::Paused | RunState::Cancelling)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RunState::Idle => "Idle",
            RunState::Running => "Running",
            RunState::Paused => "Paused",
            RunState::Cancelling => "Cancelling",
            RunState::Completed => "Completed",
            RunState::Failed => "Failed",
            RunState::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Shared control surface for a run. Clone the `Arc` into whatever thread
/// issues pause, resume and cancel commands.
///
/// Workers call [`SyncHandle::wait_if_paused`] between files, so a pause or
/// cancel never interrupts a fingerprint or a move in progress.
#[derive(Debug)]
pub struct SyncHandle {
    state: Mutex<RunState>,
    changed: Condvar,
}

impl Default for SyncHandle {
    fn default() -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
            changed: Condvar::new(),
        }
    }
}

impl SyncHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        *self.lock()
    }

    pub fn pause(&self) -> Result<(), Error> {
        self.transition(&[RunState::Running], RunState::Paused)
    }

    pub fn resume(&self) -> Result<(), Error> {
        self.transition(&[RunState::Paused], RunState::Running)
    }

    pub fn cancel(&self) -> Result<(), Error> {
        self.transition(&[RunState::Running, RunState::Paused], RunState::Cancelling)
    }

    pub fn is_cancelling(&self) -> bool {
        self.state() == RunState::Cancelling
    }

    /// Block while paused. Returns `false` once the run is being cancelled,
    /// meaning no further file should start.
    pub fn wait_if_paused(&self) -> bool {
        let mut state = self.lock();
        loop {
            match *state {
                RunState::Paused => {
                    state = self
                        .changed
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
                RunState::Cancelling => return false,
                _ => return true,
            }
        }
    }

    fn begin(&self) -> Result<(), Error> {
        let mut state = self.lock();
        if state.is_active() {
            return Err(Error::InvalidState(format!(
                "cannot start a run while {}",
                *state
            )));
        }
        *state = RunState::Running;
        self.changed.notify_all();
        Ok(())
    }

    fn finish(&self, terminal: RunState) {
        *self.lock() = terminal;
        self.changed.notify_all();
    }

    fn transition(&self, from: &[RunState], to: RunState) -> Result<(), Error> {
        let mut state = self.lock();
        if !from.contains(&*state) {
            return Err(Error::InvalidState(format!("cannot go from {} to {}", *state, to)));
        }
        debug!("Run state {} -> {}", *state, to);
        *state = to;
        self.changed.notify_all();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Moved { destination: PathBuf },
    Duplicate { reject: PathBuf },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub sequence: usize,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub statistics: SyncStatistics,
    /// Size of the fingerprint index after the run.
    pub known_fingerprints: usize,
    /// Worker threads used; 1 when the run was sequential.
    pub workers: usize,
}

/// Drives the walk, fingerprint, dedup, plan and move pipeline.
pub struct SyncEngine {
    config: AppConfig,
    settings: Arc<dyn SettingsStore>,
    handle: Arc<SyncHandle>,
    cache: Arc<MetadataCache>,
}

impl SyncEngine {
    pub fn new(config: AppConfig, settings: Arc<dyn SettingsStore>) -> Self {
        let cache = Arc::new(MetadataCache::new(config.cache_capacity));
        Self {
            config,
            settings,
            handle: Arc::new(SyncHandle::new()),
            cache,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn handle(&self) -> Arc<SyncHandle> {
        Arc::clone(&self.handle)
    }

    pub fn state(&self) -> RunState {
        self.handle.state()
    }

    pub fn coordinator(&self) -> ParallelCoordinator {
        ParallelCoordinator::new(self.config.parallel_threshold).with_max_degree(
            self.config
                .max_workers
                .unwrap_or_else(available_processors),
        )
    }

    /// Run with the source, destination and options from the configuration.
    pub fn run_configured(&self, reporter: &dyn ProgressReporter) -> Result<SyncReport, Error> {
        let missing = |what: &str| Error::InvalidPath {
            path: PathBuf::new(),
            reason: format!("no {} folder configured", what),
        };
        let source = self.config.source.clone().ok_or_else(|| missing("source"))?;
        let destination = self
            .config
            .destination
            .clone()
            .ok_or_else(|| missing("destination"))?;
        let options = self.config.options.clone();
        self.run(&source, &destination, &options, reporter)
    }

    /// One complete run. Pre-flight failures end the run as `Failed` and are
    /// returned as errors; per-file failures are counted and never abort.
    pub fn run(
        &self,
        source: &Path,
        destination: &Path,
        options: &SyncOptions,
        reporter: &dyn ProgressReporter,
    ) -> Result<SyncReport, Error> {
        self.handle.begin()?;
        reporter.on_state_change(RunState::Running);
        let mut stats = SyncStatistics::started();

        let reject_dir = self.config.reject_dir(destination);
        if let Err(e) = self.preflight(source, destination) {
            error!("Sync aborted: {}", e);
            stats.error_message = Some(e.to_string());
            stats.finish(RunState::Failed);
            self.handle.finish(RunState::Failed);
            reporter.on_state_change(RunState::Failed);
            reporter.on_sync_complete(&stats);
            return Err(e);
        }
        self.remember_folders(source, destination, &reject_dir);

        let options = self.effective_options(options);
        let store = FingerprintStore::new(Arc::clone(&self.settings));
        let index = store.load();

        info!("Scanning {}...", source.display());
        let scan_start = Instant::now();
        let prune = [destination.to_path_buf(), reject_dir.clone()];
        let scan = enumerate_files(source, &options, &prune);
        debug!(
            "Scan completed in {:.2}s: {} eligible files",
            scan_start.elapsed().as_secs_f64(),
            scan.candidates.len()
        );

        let total = scan.candidates.len();
        stats.total_files = total;
        reporter.on_sync_start(total);

        let coordinator = self.coordinator();
        let context = RunContext {
            handle: &self.handle,
            fingerprints: FingerprintEngine::new(Arc::clone(&self.cache)),
            index: &index,
            planner: PathPlanner::new(destination, total),
            reject_dir,
            source_root: source,
            inclusions: &options.naming_inclusions,
            stats: Mutex::new(stats),
            throttle: ProgressThrottle::new(self.config.progress_batch),
            reporter,
            started: Instant::now(),
        };

        let workers = context.process_all(&scan.candidates, &coordinator);

        let final_state = if self.handle.is_cancelling() {
            RunState::Cancelled
        } else {
            RunState::Completed
        };

        let mut stats = context.into_statistics();
        if scan.skipped_dirs > 0 {
            stats.warnings.push(format!(
                "{} unreadable folders were skipped",
                scan.skipped_dirs
            ));
        }
        if let Some(warning) = self.persist(&store, &index) {
            stats.warnings.push(warning);
        }

        stats.finish(final_state);
        self.handle.finish(final_state);
        reporter.on_progress(&progress_of(&stats, String::new()));
        reporter.on_state_change(final_state);
        reporter.on_sync_complete(&stats);
        info!(
            "Sync {}: {} moved, {} duplicates, {} errors in {:.2}s",
            final_state,
            stats.successful_files,
            stats.duplicates_found,
            stats.error_files,
            stats.duration.as_secs_f64()
        );

        Ok(SyncReport {
            statistics: stats,
            known_fingerprints: index.len(),
            workers,
        })
    }

    fn preflight(&self, source: &Path, destination: &Path) -> Result<(), Error> {
        if !source.is_dir() {
            return Err(Error::SourceNotFound(source.to_path_buf()));
        }
        validate_directory_path(source)?;
        validate_directory_path(destination)?;
        fs::create_dir_all(destination)?;
        Ok(())
    }

    /// Merge the host's stored naming lists into the run's options.
    fn effective_options(&self, options: &SyncOptions) -> SyncOptions {
        let mut merged = options.clone();
        for (key, list) in [
            (keys::NAMING_LIST, &mut merged.naming_exclusions),
            (keys::NAMING_INCLUDE, &mut merged.naming_inclusions),
        ] {
            match self.settings.read_list(key) {
                Ok(stored) => {
                    for word in stored {
                        if !list.iter().any(|w| w.eq_ignore_ascii_case(&word)) {
                            list.push(word);
                        }
                    }
                }
                Err(e) => warn!("Could not read {}: {}", key, e),
            }
        }
        merged
    }

    fn remember_folders(&self, source: &Path, destination: &Path, reject: &Path) {
        for (key, path) in [
            (keys::SOURCE_FOLDER, source),
            (keys::DESTINATION_FOLDER, destination),
            (keys::REJECT_FOLDER, reject),
        ] {
            if let Err(e) = self.settings.write_setting(key, &path.to_string_lossy()) {
                warn!("Could not remember {}: {}", key, e);
            }
        }
    }

    /// Save the index once. A failed save is downgraded to a warning and the
    /// snapshot is parked next to the settings file.
    fn persist(&self, store: &FingerprintStore, index: &DuplicateIndex) -> Option<String> {
        let err = match store.save(index) {
            Ok(()) => return None,
            Err(e) => e,
        };
        warn!("{}", err);
        let emergency = self.config.settings_path.with_extension("emergency");
        match store.save_emergency(index, &emergency) {
            Ok(()) => Some(format!(
                "{}; snapshot saved to {}",
                err,
                emergency.display()
            )),
            Err(e2) => {
                error!("Emergency snapshot failed too: {}", e2);
                Some(format!("{}; emergency snapshot failed: {}", err, e2))
            }
        }
    }
}

struct RunContext<'a> {
    handle: &'a SyncHandle,
    fingerprints: FingerprintEngine,
    index: &'a DuplicateIndex,
    planner: PathPlanner,
    reject_dir: PathBuf,
    source_root: &'a Path,
    inclusions: &'a [String],
    stats: Mutex<SyncStatistics>,
    throttle: ProgressThrottle,
    reporter: &'a dyn ProgressReporter,
    started: Instant,
}

impl RunContext<'_> {
    /// Returns the number of workers used.
    fn process_all(&self, candidates: &[Candidate], coordinator: &ParallelCoordinator) -> usize {
        if coordinator.should_parallelize(candidates.len()) {
            match coordinator.build_pool() {
                Ok(pool) => {
                    info!(
                        "Processing {} files on {} workers",
                        candidates.len(),
                        pool.current_num_threads()
                    );
                    pool.install(|| {
                        candidates
                            .par_iter()
                            .enumerate()
                            .for_each(|(i, candidate)| {
                                if self.handle.wait_if_paused() {
                                    self.process(i + 1, candidate);
                                }
                            })
                    });
                    return pool.current_num_threads();
                }
                Err(e) => warn!("Could not build worker pool, running sequentially: {}", e),
            }
        }

        info!("Processing {} files sequentially", candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            if !self.handle.wait_if_paused() {
                info!("Cancelled after {} files", i);
                break;
            }
            self.process(i + 1, candidate);
        }
        1
    }

    fn process(&self, sequence: usize, candidate: &Candidate) {
        let (outcome, size) = match self.sync_file(sequence, candidate) {
            Ok(done) => done,
            Err(e) => {
                error!("Failed to sync {}: {}", candidate.path.display(), e);
                // The file stays behind; the next run must see it afresh.
                self.fingerprints.cache().refresh(&candidate.path);
                (FileOutcome::Failed { error: e.to_string() }, 0)
            }
        };

        let current_file = candidate
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let progress = {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.record(&outcome, size);
            let mut progress = progress_of(&stats, current_file);
            progress.elapsed = self.started.elapsed();
            progress
        };

        self.reporter.on_file_processed(&FileReport {
            path: candidate.path.clone(),
            sequence,
            outcome,
        });
        if self.throttle.tick() {
            self.reporter.on_progress(&progress);
        }
    }

    fn sync_file(&self, sequence: usize, candidate: &Candidate) -> Result<(FileOutcome, u64), FileError> {
        let path = &candidate.path;
        let metadata = self.fingerprints.cache().get_or_compute(path)?;
        let fingerprint = self.fingerprints.compute_fingerprint(path)?;

        // A worker holding this content until our move fails sends its copy to Rejects.
        if !self.index.claim(fingerprint) {
            let reject = place_reject(path, &self.reject_dir)?;
            self.fingerprints.cache().refresh(path);
            debug!("Duplicate {} -> {}", path.display(), reject.display());
            return Ok((FileOutcome::Duplicate { reject }, metadata.length));
        }

        let timestamp = capture_timestamp(path, candidate.category, metadata.last_write_time);
        let label = self.label_for(path);
        let planned = self.planner.plan_labeled(
            candidate.category,
            &timestamp,
            sequence,
            &metadata.extension,
            label.as_deref(),
        );

        let placed = self
            .planner
            .ensure_folders(&timestamp)
            .map_err(|e| FileError::Move {
                from: path.clone(),
                to: planned.clone(),
                source: e,
            })
            .and_then(|()| self.planner.place(path, &planned, &timestamp));

        match placed {
            Ok(destination) => {
                self.fingerprints.cache().refresh(path);
                debug!("Moved {} -> {}", path.display(), destination.display());
                Ok((FileOutcome::Moved { destination }, metadata.length))
            }
            Err(e) => {
                self.index.release(&fingerprint);
                Err(e)
            }
        }
    }

    fn label_for(&self, path: &Path) -> Option<String> {
        if self.inclusions.is_empty() {
            return None;
        }
        let relative = path.strip_prefix(self.source_root).unwrap_or(path);
        naming_label(&relative.to_string_lossy(), self.inclusions)
    }

    fn into_statistics(self) -> SyncStatistics {
        self.stats.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

fn progress_of(stats: &SyncStatistics, current_file: String) -> SyncProgress {
    SyncProgress {
        current_file,
        processed: stats.processed_files,
        total: stats.total_files,
        elapsed: stats.elapsed(),
        bytes_processed: stats.bytes_processed,
        duplicates: stats.duplicates_found,
        errors: stats.error_files,
    }
}
