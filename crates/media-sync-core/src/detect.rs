//! Perceptual duplicate detection through an external helper process.
//!
//! The helper receives one JSON request as its last argument and prints one
//! JSON response on stdout. The engine never depends on how it groups images.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::{debug, warn};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    #[default]
    Phash,
    Dhash,
    Whash,
    Cnn,
}

impl FromStr for DetectionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "phash" => Ok(DetectionMethod::Phash),
            "dhash" => Ok(DetectionMethod::Dhash),
            "whash" => Ok(DetectionMethod::Whash),
            "cnn" => Ok(DetectionMethod::Cnn),
            other => Err(Error::Detection(format!("unknown method '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRequest {
    pub images: Vec<PathBuf>,
    pub method: DetectionMethod,
    pub threshold: f64,
    pub use_gpu: bool,
}

impl DetectionRequest {
    pub fn new(images: Vec<PathBuf>, method: DetectionMethod) -> Self {
        Self {
            images,
            method,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            use_gpu: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectionStatistics {
    pub total_files: usize,
    pub valid_files: usize,
    pub duplicate_groups: usize,
    pub total_duplicates: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectionResponse {
    pub success: bool,
    pub method: Option<DetectionMethod>,
    pub gpu_used: bool,
    /// Original image path to the images judged similar to it.
    pub duplicates: HashMap<String, Vec<String>>,
    pub statistics: DetectionStatistics,
    pub error: Option<String>,
}

/// Alternate source of duplicate groups.
pub trait AdvancedDetector: Send + Sync {
    fn find_duplicates(&self, request: &DetectionRequest) -> Result<DetectionResponse, Error>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Runs `program [args..] <request-json>` and parses its stdout.
#[derive(Debug, Clone)]
pub struct ProcessDetector {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessDetector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Leading arguments, such as the script a Python interpreter should run.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl AdvancedDetector for ProcessDetector {
    fn find_duplicates(&self, request: &DetectionRequest) -> Result<DetectionResponse, Error> {
        if request.images.len() < 2 {
            return Ok(DetectionResponse {
                success: true,
                method: Some(request.method),
                ..DetectionResponse::default()
            });
        }

        let payload =
            serde_json::to_string(request).map_err(|e| Error::Detection(e.to_string()))?;
        debug!(
            "Running {} on {} images",
            self.program.display(),
            request.images.len()
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&payload)
            .output()
            .map_err(|e| {
                Error::Detection(format!("could not start {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            warn!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let response = parse_response(&String::from_utf8_lossy(&output.stdout))?;
        if !response.success {
            return Err(Error::Detection(
                response
                    .error
                    .unwrap_or_else(|| "detector reported failure".to_string()),
            ));
        }
        Ok(response)
    }

    fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

pub fn parse_response(stdout: &str) -> Result<DetectionResponse, Error> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(Error::Detection("detector produced no output".to_string()));
    }
    serde_json::from_str(trimmed).map_err(|e| Error::Detection(format!("bad response: {}", e)))
}
