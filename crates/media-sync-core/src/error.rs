use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Source folder not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Invalid path '{}': {reason}", .path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Failed to persist fingerprint index: {0}")]
    Persistence(String),

    #[error("Advanced detection failed: {0}")]
    Detection(String),

    #[error("Invalid state transition: {0}")]
    InvalidState(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Settings(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Settings(err.to_string())
    }
}

/// Failure of a single file unit. Never aborts a run; the file is counted as
/// an error and left where it was.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Error reading {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Destination already taken after disambiguation: {}", .0.display())]
    MoveCollision(PathBuf),

    #[error("Error moving {} to {}: {source}", .from.display(), .to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

impl FileError {
    pub fn read(path: &std::path::Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            FileError::NotFound(path.to_path_buf())
        } else {
            FileError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}
