//! Multipart upload coordinator for chunked-upload object stores

pub mod client;
pub mod config;
pub mod multipart;
pub mod streaming;

pub use client::{Coordinator, Progress};
pub use config::UploadConfig;
pub use multipart::{MultipartUpload, SessionState};
pub use streaming::RangeReader;

pub use mpu_core::{Result, UploadError};
