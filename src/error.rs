//! Error types for leasehold.
//!
//! Contention is never represented here: a lost lock race or an empty queue is
//! a plain `Ok(false)` / `Ok(None)`. Everything in [`LeaseholdError`] is either
//! caller misuse or a store failure, and is returned to the caller unchanged.

use crate::exit_codes;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for leasehold operations.
#[derive(Error, Debug)]
pub enum LeaseholdError {
    /// Invalid arguments or configuration.
    #[error("{0}")]
    UserError(String),

    /// The store rejected or could not perform an operation.
    #[error("store error: {0}")]
    Store(String),

    /// Filesystem failure inside a file-backed store.
    #[error("{context} '{}': {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted document could not be decoded.
    #[error("corrupt document in '{collection}': {message}")]
    Corrupt { collection: String, message: String },

    /// An insert collided with an existing `_id`.
    #[error("duplicate key '{id}' in collection '{collection}'")]
    DuplicateKey { collection: String, id: String },

    /// The call-plane bound expired before the store answered.
    #[error("store operation on '{collection}' timed out after {waited_ms}ms")]
    Timeout { collection: String, waited_ms: u64 },

    /// A nearest-point selection was requested on a field with no 2d index.
    #[error("no 2d index on field '{field}' in collection '{collection}'")]
    MissingIndex { collection: String, field: String },
}

impl LeaseholdError {
    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LeaseholdError::UserError(_) => exit_codes::USER_ERROR,
            LeaseholdError::DuplicateKey { .. } => exit_codes::DUPLICATE_KEY,
            LeaseholdError::Store(_)
            | LeaseholdError::Io { .. }
            | LeaseholdError::Corrupt { .. }
            | LeaseholdError::Timeout { .. }
            | LeaseholdError::MissingIndex { .. } => exit_codes::STORE_FAILURE,
        }
    }

    /// True when this is the store's uniqueness violation.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, LeaseholdError::DuplicateKey { .. })
    }

    pub(crate) fn io(
        context: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        LeaseholdError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for leasehold operations.
pub type Result<T> = std::result::Result<T, LeaseholdError>;
