//! Error types shared by the store, the evaluation engine and the HTTP layer.
//!
//! Every fallible domain operation returns [`Result`]. The server maps each
//! variant onto an HTTP status in `server::error_response`.

use serde::Serialize;
use thiserror::Error;

use crate::blob::BlobError;

/// Machine-readable codes carried by structured validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// A weight is zero (when disallowed), out of range or off-step.
    InvalidWeight,
    /// A weight exceeds the absolute sanity cap.
    WeightTooLarge,
    /// Rubric weights do not add up to 1.
    InvalidWeightSum,
    /// The same criterion appears twice in one rubric.
    DuplicateCriteria,
    /// A rubric references criteria that do not exist.
    InvalidCriteria,
    /// A name failed the length or character checks.
    InvalidName,
    /// A free-text field failed its length check.
    InvalidField,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidWeight => "INVALID_WEIGHT",
            Self::WeightTooLarge => "WEIGHT_TOO_LARGE",
            Self::InvalidWeightSum => "INVALID_WEIGHT_SUM",
            Self::DuplicateCriteria => "DUPLICATE_CRITERIA",
            Self::InvalidCriteria => "INVALID_CRITERIA",
            Self::InvalidName => "INVALID_NAME",
            Self::InvalidField => "INVALID_FIELD",
        }
    }
}

impl std::fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain error.
#[derive(Debug, Error)]
pub enum Error {
    /// The addressed entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request collides with current state (duplicate name, published
    /// rubric, non-open decision kit).
    #[error("{0}")]
    Conflict(String),

    /// Structured validation failure.
    #[error("{code}: {message}")]
    Validation {
        code: ValidationCode,
        message: String,
    },

    /// A referenced entity is invalid (unknown rubric or candidate ids).
    #[error("{0}")]
    Unprocessable(String),

    /// Malformed request that is not covered by a structured code.
    #[error("{0}")]
    BadRequest(String),

    /// SQLite failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON column encode/decode failure.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Material blob storage failure.
    #[error("Blob storage error: {0}")]
    Blob(#[from] BlobError),

    /// Anything else (joined task panicked, invariant broken).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(code: ValidationCode, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{} not found", what))
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
