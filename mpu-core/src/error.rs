//! Error types for mpu

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by an object store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No such upload: {0}")]
    NoSuchUpload(String),

    #[error("Invalid part {part_number}: {reason}")]
    InvalidPart { part_number: u32, reason: String },

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true if repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Io(_))
    }
}

/// Errors raised by the upload coordinator
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid part size: {0}")]
    InvalidPartSize(u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Refusing to upload empty file: {}", path.display())]
    EmptyFile { path: PathBuf },

    #[error("Not a regular file: {}", path.display())]
    NotAFile { path: PathBuf },

    #[error("Failed to open upload session for {bucket}/{key}: {cause}")]
    Session {
        bucket: String,
        key: String,
        #[source]
        cause: StoreError,
    },

    #[error("Part {part_number} failed: {cause}")]
    PartUpload {
        part_number: u32,
        #[source]
        cause: StoreError,
    },

    #[error(
        "Incomplete upload: expected {expected} receipts, got {received} (missing {missing:?}, unexpected {unexpected:?})"
    )]
    IncompleteUpload {
        expected: u32,
        received: usize,
        missing: Vec<u32>,
        /// Duplicated or out-of-range part numbers
        unexpected: Vec<u32>,
    },

    #[error("Commit rejected: {0}")]
    Commit(#[source] StoreError),

    #[error("Abort failed: {0}")]
    Abort(#[source] StoreError),

    #[error("Cannot {operation} a session that is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an upload failure, carried in `UploadResult`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    EmptyFile,
    Session,
    PartUpload,
    IncompleteUpload,
    Commit,
    Abort,
    InvalidState,
    Io,
    Internal,
}

/// The protocol phase an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Validation and local I/O before or outside the store protocol
    Local,
    Open,
    Part(u32),
    Commit,
    Abort,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Local => write!(f, "local"),
            Phase::Open => write!(f, "open"),
            Phase::Part(n) => write!(f, "part {}", n),
            Phase::Commit => write!(f, "commit"),
            Phase::Abort => write!(f, "abort"),
        }
    }
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::InvalidBucketName(_)
            | UploadError::InvalidKey(_)
            | UploadError::InvalidPartSize(_)
            | UploadError::InvalidConfig(_)
            | UploadError::NotAFile { .. } => ErrorKind::InvalidInput,
            UploadError::EmptyFile { .. } => ErrorKind::EmptyFile,
            UploadError::Session { .. } => ErrorKind::Session,
            UploadError::PartUpload { .. } => ErrorKind::PartUpload,
            UploadError::IncompleteUpload { .. } => ErrorKind::IncompleteUpload,
            UploadError::Commit(_) => ErrorKind::Commit,
            UploadError::Abort(_) => ErrorKind::Abort,
            UploadError::InvalidState { .. } => ErrorKind::InvalidState,
            UploadError::Io(_) => ErrorKind::Io,
            UploadError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            UploadError::Session { .. } => Phase::Open,
            UploadError::PartUpload { part_number, .. } => Phase::Part(*part_number),
            UploadError::IncompleteUpload { .. } | UploadError::Commit(_) => Phase::Commit,
            UploadError::Abort(_) => Phase::Abort,
            _ => Phase::Local,
        }
    }

    /// Whether the coordinator may repeat the failed part
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::PartUpload { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }
}
