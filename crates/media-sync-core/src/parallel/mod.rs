pub mod benchmark;

use crate::config::DEFAULT_PARALLEL_THRESHOLD;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt;
use std::thread;

pub fn available_processors() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Decides whether a batch runs on one thread or fans out, and how wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelCoordinator {
    threshold: usize,
    max_degree: usize,
}

impl Default for ParallelCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLEL_THRESHOLD)
    }
}

impl ParallelCoordinator {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            max_degree: available_processors(),
        }
    }

    /// Cap the worker count; 1 forces sequential processing.
    pub fn with_max_degree(mut self, max_degree: usize) -> Self {
        self.max_degree = max_degree.max(1);
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn should_parallelize(&self, file_count: usize) -> bool {
        self.max_degree > 1 && file_count >= self.threshold
    }

    pub fn degree_of_parallelism(&self) -> usize {
        self.max_degree
    }

    pub fn build_pool(&self) -> Result<ThreadPool, rayon::ThreadPoolBuildError> {
        ThreadPoolBuilder::new()
            .num_threads(self.max_degree)
            .thread_name(|i| format!("media-sync-worker-{}", i))
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemProfile {
    pub processor_count: usize,
    pub is_64bit: bool,
    pub recommended_threshold: usize,
}

impl SystemProfile {
    pub fn detect() -> Self {
        let processor_count = available_processors();
        Self {
            processor_count,
            is_64bit: cfg!(target_pointer_width = "64"),
            recommended_threshold: estimate_threshold(processor_count),
        }
    }
}

impl fmt::Display for SystemProfile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "CPU Cores: {}, 64-bit: {}, Recommended Threshold: {} files",
            self.processor_count, self.is_64bit, self.recommended_threshold
        )
    }
}

/// Core-count heuristic used when no benchmark has been run.
pub fn estimate_threshold(cores: usize) -> usize {
    match cores {
        c if c >= 8 => 5_000,
        c if c >= 4 => 10_000,
        c if c >= 2 => 15_000,
        _ => 20_000,
    }
}
