//! Samples real fingerprinting throughput to pick a parallel threshold.

use super::ParallelCoordinator;
use crate::config::DEFAULT_PARALLEL_THRESHOLD;
use crate::hasher::{FingerprintEngine, MetadataCache};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use walkdir::WalkDir;

pub const DEFAULT_SAMPLE_SIZE: usize = 100;
/// Parallel must beat sequential by more than this factor to count.
pub const SPEEDUP_MARGIN: f64 = 1.2;
const MIN_SAMPLE_FILES: usize = 10;
const BATCH_SIZES: [usize; 5] = [100, 500, 1_000, 5_000, 10_000];

#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub file_count: usize,
    pub degree_of_parallelism: usize,
    pub sequential: Duration,
    pub parallel: Duration,
    pub speedup: f64,
    pub recommended_threshold: usize,
}

impl BenchmarkResult {
    pub fn parallel_is_faster(&self) -> bool {
        self.parallel < self.sequential
    }

    pub fn beats_margin(&self) -> bool {
        self.parallel_is_faster() && self.speedup > SPEEDUP_MARGIN
    }
}

/// Time hashing `files` once on this thread and once across `degree` workers.
pub fn benchmark_files(files: &[PathBuf], degree: usize) -> BenchmarkResult {
    let engine = FingerprintEngine::new(Arc::new(MetadataCache::new(files.len().max(1))));

    let start = Instant::now();
    for file in files {
        // Unreadable files still cost an open; ignore the outcome.
        let _ = engine.compute_fingerprint(file);
    }
    let sequential = start.elapsed();

    let coordinator = ParallelCoordinator::new(1).with_max_degree(degree);
    let start = Instant::now();
    match coordinator.build_pool() {
        Ok(pool) => pool.install(|| {
            files.par_iter().for_each(|file| {
                let _ = engine.compute_fingerprint(file);
            })
        }),
        Err(e) => {
            debug!("Could not build benchmark pool, using global pool: {}", e);
            files.par_iter().for_each(|file| {
                let _ = engine.compute_fingerprint(file);
            });
        }
    }
    let parallel = start.elapsed();

    let speedup = sequential.as_secs_f64() / parallel.as_secs_f64().max(0.001);
    BenchmarkResult {
        file_count: files.len(),
        degree_of_parallelism: coordinator.degree_of_parallelism(),
        sequential,
        parallel,
        speedup,
        recommended_threshold: recommended_threshold(files.len(), speedup),
    }
}

pub fn recommended_threshold(file_count: usize, speedup: f64) -> usize {
    if speedup < SPEEDUP_MARGIN {
        file_count * 2
    } else if speedup >= 1.5 {
        (file_count / 2).max(1_000)
    } else {
        file_count
    }
}

/// Benchmark growing batches from up to `sample_size` files under `dir` and
/// return the first batch size where parallel clears the margin. Falls back to
/// the default threshold when there is too little data or no batch wins.
pub fn auto_tune_threshold(dir: &Path, sample_size: usize) -> usize {
    let (threshold, _) = auto_tune(dir, sample_size, super::available_processors());
    threshold
}

pub fn auto_tune(dir: &Path, sample_size: usize, degree: usize) -> (usize, Vec<BenchmarkResult>) {
    if !dir.is_dir() {
        return (DEFAULT_PARALLEL_THRESHOLD, Vec::new());
    }

    let files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .take(sample_size)
        .map(|entry| entry.into_path())
        .collect();

    if files.len() < MIN_SAMPLE_FILES {
        debug!(
            "Only {} sample files under {}, keeping default threshold",
            files.len(),
            dir.display()
        );
        return (DEFAULT_PARALLEL_THRESHOLD, Vec::new());
    }

    let mut results = Vec::new();
    for batch in BATCH_SIZES.iter().copied().filter(|&b| b <= files.len()) {
        let result = benchmark_files(&files[..batch], degree);
        debug!(
            "Batch {}: sequential {:?}, parallel {:?}, speedup {:.2}",
            batch, result.sequential, result.parallel, result.speedup
        );
        let wins = result.beats_margin();
        results.push(result);
        if wins {
            info!("Parallel threshold tuned to {} files", batch);
            return (batch, results);
        }
    }

    (DEFAULT_PARALLEL_THRESHOLD, results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_recommended_threshold() {
        assert_eq!(recommended_threshold(500, 1.0), 1_000);
        assert_eq!(recommended_threshold(500, 1.3), 500);
        assert_eq!(recommended_threshold(5_000, 2.0), 2_500);
        assert_eq!(recommended_threshold(500, 2.0), 1_000);
    }

    #[test]
    fn test_too_few_files_keeps_default() {
        let tmp = tempdir().unwrap();
        for i in 0..3 {
            fs::write(tmp.path().join(format!("{i}.jpg")), "x").unwrap();
        }
        assert_eq!(auto_tune_threshold(tmp.path(), 100), DEFAULT_PARALLEL_THRESHOLD);
        assert_eq!(
            auto_tune_threshold(&tmp.path().join("missing"), 100),
            DEFAULT_PARALLEL_THRESHOLD
        );
    }

    #[test]
    fn test_benchmark_reports_batch() {
        let tmp = tempdir().unwrap();
        let files: Vec<PathBuf> = (0..12)
            .map(|i| {
                let p = tmp.path().join(format!("{i}.bin"));
                fs::write(&p, vec![i as u8; 2048]).unwrap();
                p
            })
            .collect();

        let result = benchmark_files(&files, 2);
        assert_eq!(result.file_count, 12);
        assert_eq!(result.degree_of_parallelism, 2);
        assert!(result.speedup > 0.0);
    }
}
