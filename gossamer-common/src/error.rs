//! Error taxonomy shared by every component of the assembly engine.

use std::path::PathBuf;
use thiserror::Error;

/// The error type returned by fallible operations across the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A persisted artifact's version word differs from the version the
    /// reading code expects.
    #[error("version mismatch reading {path}: expected {expected}, found {found}")]
    VersionMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    /// A file is missing, unreadable, or truncated.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A mandatory option is missing, a value is invalid, or two
    /// mutually-exclusive options were combined.
    #[error("usage error: {0}")]
    Usage(String),

    /// An internal contract was broken (out-of-order builder input, a
    /// rank out of range). Always a programming error, never recoverable.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Input contained a non-base character where one was required, or a
    /// read shorter than k+1 bases.
    #[error("sequence error: {0}")]
    Sequence(String),

    /// `k` exceeds `MAX_K`, or a count overflowed and the spill table also
    /// rejected it.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn version_mismatch(path: impl Into<PathBuf>, expected: u64, found: u64) -> Self {
        Error::VersionMismatch {
            path: path.into(),
            expected,
            found,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
