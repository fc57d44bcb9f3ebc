//! Error types for the extraction pipeline.
//!
//! Failures fall into three tiers that callers are expected to treat
//! differently:
//! - [`ReadError`] is the transport tier: the raw sectors could not be read.
//! - [`ExtractError`] is the content tier: the sectors were read, but they do
//!   not hold a recognizable dataset. This is recoverable by picking another
//!   source.
//! - [`SaveError`] covers persisting an extracted dataset.
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading raw sectors from a [`crate::source::BlockSource`].
#[derive(Debug, Error)]
pub enum ReadError {
    /// The caller lacks the privilege to open the source for reading.
    #[error("Permission denied while opening {}", source_path.display())]
    AccessDenied {
        source_path: PathBuf,
        #[source]
        cause: io::Error,
    },

    /// The path does not resolve to a readable device or file.
    #[error("Source not found: {}", source_path.display())]
    SourceNotFound {
        source_path: PathBuf,
        #[source]
        cause: io::Error,
    },

    /// Any other fault while opening or reading the source.
    #[error("I/O failure while reading {}: {cause}", source_path.display())]
    IoFailure {
        source_path: PathBuf,
        #[source]
        cause: io::Error,
    },
}

impl ReadError {
    /// Classifies an I/O error raised while accessing `source_path`.
    pub fn from_io(source_path: impl Into<PathBuf>, cause: io::Error) -> Self {
        let source_path = source_path.into();
        match cause.kind() {
            io::ErrorKind::PermissionDenied => ReadError::AccessDenied { source_path, cause },
            io::ErrorKind::NotFound => ReadError::SourceNotFound { source_path, cause },
            _ => ReadError::IoFailure { source_path, cause },
        }
    }

    /// The path or label of the source that failed.
    pub fn source_path(&self) -> &PathBuf {
        match self {
            ReadError::AccessDenied { source_path, .. }
            | ReadError::SourceNotFound { source_path, .. }
            | ReadError::IoFailure { source_path, .. } => source_path,
        }
    }

    /// A short remediation hint suitable for showing to the operator.
    pub fn hint(&self) -> &'static str {
        match self {
            ReadError::AccessDenied { .. } => {
                if cfg!(windows) {
                    "Run this program as Administrator to read raw disk sectors."
                } else {
                    "Raw devices need root access. Re-run with sudo."
                }
            }
            ReadError::SourceNotFound { .. } => {
                "Double-check the device path, or run `tigr list` to see attached cards."
            }
            ReadError::IoFailure { .. } => {
                "The card could not be read. Reseat it, or try another card reader."
            }
        }
    }
}

/// Errors raised while recovering records from a raw block.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// The anchor `Muon#,Band` does not occur anywhere in the decoded block.
    #[error("No TIGR data found. The card may be empty or corrupted.")]
    NoDataFound,

    /// Strict decoding only: a retained record lost one or more non-ASCII bytes.
    #[error("Record {line} contained non-ASCII bytes and would be altered by decoding")]
    AlteredRecord {
        /// 1-based line number within the dataset region.
        line: usize,
    },
}

impl ExtractError {
    pub fn hint(&self) -> &'static str {
        match self {
            ExtractError::NoDataFound => {
                "Make sure the detector finished a run on this card, or pick a different device."
            }
            ExtractError::AlteredRecord { .. } => {
                "Re-run without --strict to keep the readable part of the record."
            }
        }
    }
}

/// Errors raised while writing an extracted dataset to disk.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Could not write {}: {cause}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },

    #[error("Verification failed for {}: hash mismatch", path.display())]
    VerificationFailed { path: PathBuf },
}

/// Which part of the pipeline an [`enum@Error`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Transport,
    Content,
    Output,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Transport => "transport",
            Tier::Content => "content",
            Tier::Output => "output",
        };
        f.write_str(name)
    }
}

/// Any failure of a full extraction run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Save(#[from] SaveError),
}

impl Error {
    pub fn tier(&self) -> Tier {
        match self {
            Error::Read(_) => Tier::Transport,
            Error::Extract(_) => Tier::Content,
            Error::Save(_) => Tier::Output,
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            Error::Read(e) => e.hint(),
            Error::Extract(e) => e.hint(),
            Error::Save(SaveError::Io { .. }) => "Check that the output directory exists and is writable.",
            Error::Save(SaveError::VerificationFailed { .. }) => {
                "The output disk may be failing. Save to another location."
            }
        }
    }

    /// `true` when the operator can fix the problem by choosing another source.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Extract(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
