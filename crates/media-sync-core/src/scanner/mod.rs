pub mod walk;

pub use walk::{eligible_category, enumerate_files, Candidate, ScanOutcome};
