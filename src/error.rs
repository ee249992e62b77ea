// 🚦 Error taxonomy for everything a caller can observe
//
// Row-level problems (bad lines, unparseable amounts/dates) never show up here:
// the parser drops them and the normalizer defaults them. What remains are
// upload rejections, storage lookups, and job failures.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConvertError>;

#[derive(Debug, Error)]
pub enum ConvertError {
    // ========================================================================
    // UPLOAD VALIDATION (rejected before any job exists)
    // ========================================================================
    #[error("Unsupported file type: {0}")]
    UnsupportedMediaType(String),

    #[error("File {name} is {size} bytes, limit is {limit} bytes")]
    FileTooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    #[error("No files were uploaded")]
    NoFiles,

    #[error("Too many files: {count} (limit {limit})")]
    TooManyFiles { count: usize, limit: usize },

    #[error("Unknown processing type: {0}")]
    UnknownProcessingType(String),

    #[error("Unknown output format: {0}")]
    UnknownFormat(String),

    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    // ========================================================================
    // LOOKUPS
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    /// The job exists but has not produced its artifact yet
    #[error("Output not ready yet: {0}")]
    NotReady(String),

    // ========================================================================
    // JOB LIFECYCLE
    // ========================================================================
    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("Pipeline error: {0:#}")]
    Pipeline(anyhow::Error),
}

impl ConvertError {
    /// Rejections raised while validating an upload
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ConvertError::UnsupportedMediaType(_)
                | ConvertError::FileTooLarge { .. }
                | ConvertError::NoFiles
                | ConvertError::TooManyFiles { .. }
                | ConvertError::UnknownProcessingType(_)
                | ConvertError::UnknownFormat(_)
                | ConvertError::MalformedUpload(_)
        )
    }

    /// Whether a polling client should simply try again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConvertError::NotReady(_) | ConvertError::Storage(_))
    }
}
