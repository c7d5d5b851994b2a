//! Error taxonomy shared by the session, history and analysis layers.
//!
//! Nothing in here is process-fatal: every variant is recovered by a new user
//! action (reselect an image, retry the analysis, dismiss a warning).

use thiserror::Error;

/// Largest image payload accepted for analysis (10 MiB).
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Bad file type or size. Rejected locally, never sent to the analyzer.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The analysis collaborator was unreachable, timed out or answered with
    /// something we could not use.
    #[error("analysis unavailable: {cause}")]
    AnalysisUnavailable { cause: String },

    /// The store primitive rejected a write (quota, I/O, closed connection).
    #[error("failed to persist record: {0}")]
    StoreWrite(String),

    /// The store primitive could not be read at all.
    #[error("failed to read store: {0}")]
    StoreRead(String),

    /// A single stored value failed to parse.
    #[error("corrupted entry {key}: {reason}")]
    StoreReadCorruption { key: String, reason: String },

    #[error("no image selected")]
    NoImageSelected,

    /// Another analysis or file read is still in flight.
    #[error("session is busy")]
    Busy,

    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// A record with this id is already stored; nothing was written.
    #[error("record already exists: {0}")]
    DuplicateRecord(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl Error {
    pub fn unavailable(cause: impl Into<String>) -> Self {
        Error::AnalysisUnavailable {
            cause: cause.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidInput(reason.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
