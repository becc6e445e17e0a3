pub mod capture;
pub mod classify;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod index;
pub mod parallel;
pub mod planner;
pub mod progress;
pub mod scanner;
pub mod stats;
pub mod storage;

pub use config::{AppConfig, SyncOptions};
pub use engine::{FileOutcome, FileReport, RunState, SyncEngine, SyncHandle, SyncReport};
pub use error::{Error, FileError};
pub use progress::{ProgressReporter, SilentReporter, SyncProgress};
pub use stats::SyncStatistics;
