//! Core data model and store contract for mpu

pub mod error;
pub mod partition;
pub mod store;
pub mod types;

pub use error::*;
pub use partition::*;
pub use store::*;
pub use types::*;

/// Result type alias for upload operations
pub type Result<T> = std::result::Result<T, UploadError>;
