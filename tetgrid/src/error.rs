// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for record I/O, grid reconstruction, and run linking.
//!
//! Every failure is deterministic (a missing file, a malformed line, a shape
//! that cannot be a square grid), so nothing here is retried. Callers halt the
//! current sweep or run instead of substituting defaults: a substituted value
//! would shift every later cell of the row-major grid.

use std::fmt;
use std::path::{Path, PathBuf};

/// Errors arising from reading, reconstructing, or linking sweep results.
#[derive(Debug)]
pub enum SweepError {
    /// An expected file is absent from a run or sweep directory.
    MissingFile(PathBuf),

    /// Flat data length is not a perfect square, or disagrees with the axes.
    Shape(String),

    /// A path points at the wrong kind of filesystem object.
    TypeMismatch(String),

    /// Reduction over an empty series, or a sample that cannot be ordered.
    InvalidInput(String),

    /// A record line could not be parsed.
    Parse {
        /// File being read.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What went wrong on that line.
        msg: String,
    },

    /// Any other I/O failure (permissions, full disk, ...).
    Io(String),

    /// Configuration file is unreadable or fails validation.
    Config(String),

    /// Destination directory exists and the overwrite policy is `Fail`.
    DirectoryExists(PathBuf),
}

impl SweepError {
    /// Map an I/O error on `path`, turning `NotFound` into [`SweepError::MissingFile`].
    pub fn from_io(path: &Path, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::MissingFile(path.to_path_buf())
        } else {
            Self::Io(format!("{}: {err}", path.display()))
        }
    }

    pub(crate) fn parse(path: &Path, line: usize, msg: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            line,
            msg: msg.into(),
        }
    }
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFile(path) => write!(f, "Missing file: {}", path.display()),
            Self::Shape(msg) => write!(f, "Shape error: {msg}"),
            Self::TypeMismatch(msg) => write!(f, "Type mismatch: {msg}"),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            Self::Parse { path, line, msg } => {
                write!(f, "Parse error at {}:{line}: {msg}", path.display())
            }
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::DirectoryExists(path) => {
                write!(f, "Directory already exists: {}", path.display())
            }
        }
    }
}

impl std::error::Error for SweepError {}

impl From<std::io::Error> for SweepError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SweepError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SweepError>;
