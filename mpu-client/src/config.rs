//! Upload tuning knobs

use std::time::Duration;
use mpu_core::{Result, UploadError};

/// Default part size (50 MiB)
pub const DEFAULT_PART_SIZE: u64 = 50 * 1024 * 1024;

/// Default number of parts in flight
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default extra attempts per part after a retryable failure
pub const DEFAULT_PART_RETRIES: u32 = 2;

/// Default pause between attempts of the same part
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Configuration threaded into a [`Coordinator`](crate::Coordinator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Size of every part except possibly the last
    pub part_size: u64,
    /// Maximum parts uploading at once
    pub concurrency: usize,
    /// Whole-part retries after a retryable store error
    pub part_retries: u32,
    pub retry_delay: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            part_retries: DEFAULT_PART_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl UploadConfig {
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_part_retries(mut self, part_retries: u32) -> Self {
        self.part_retries = part_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.part_size == 0 {
            return Err(UploadError::InvalidPartSize(self.part_size));
        }
        if self.concurrency == 0 {
            return Err(UploadError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = UploadConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.part_size, 50 * 1024 * 1024);
        assert_eq!(config.concurrency, 4);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            UploadConfig::default().with_part_size(0).validate(),
            Err(UploadError::InvalidPartSize(0))
        ));
        assert!(matches!(
            UploadConfig::default().with_concurrency(0).validate(),
            Err(UploadError::InvalidConfig(_))
        ));
    }
}
