//! Multipart upload coordinator

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use mpu_core::*;
use crate::{MultipartUpload, UploadConfig};

/// Snapshot reported after every finished part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub part_number: u32,
    pub completed_parts: u32,
    pub total_parts: u32,
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "completed {}/{}", self.completed_parts, self.total_parts)
    }
}

type ProgressFn = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Drives files through initiate, part upload and commit against an
/// [`ObjectStore`]
pub struct Coordinator {
    store: Arc<dyn ObjectStore>,
    config: UploadConfig,
    on_progress: Option<ProgressFn>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn ObjectStore>, config: UploadConfig) -> Result<Self> {
        config.validate()?;
        Ok(Coordinator {
            store,
            config,
            on_progress: None,
        })
    }

    /// Observe progress after every successful part
    pub fn with_progress(mut self, on_progress: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Open a session for a `file_size`-byte object.
    ///
    /// The layout is validated before the store is contacted, so an empty
    /// file never opens a session.
    pub async fn open_session(&self, bucket: &BucketId, key: &Key, file_size: u64) -> Result<MultipartUpload> {
        let partition = Partition::new(file_size, self.config.part_size)?;

        let session_token = self
            .store
            .initiate(bucket, key)
            .await
            .map_err(|cause| UploadError::Session {
                bucket: bucket.to_string(),
                key: key.to_string(),
                cause,
            })?;

        info!(
            "Opened upload {} for {}/{}: {} bytes in {} parts of {}",
            session_token,
            bucket,
            key,
            file_size,
            partition.total_parts(),
            partition.part_size()
        );

        Ok(MultipartUpload::new(
            self.store.clone(),
            UploadSession {
                bucket: bucket.clone(),
                object_key: key.clone(),
                session_token,
                part_size: partition.part_size(),
                total_parts: partition.total_parts(),
                file_size,
            },
            partition,
        ))
    }

    /// Upload a local file as `bucket/key`.
    ///
    /// Either the object is committed in full or the session is aborted
    /// before the error is returned.
    pub async fn upload_file(&self, bucket: &BucketId, key: &Key, path: impl AsRef<Path>) -> Result<UploadResult> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(UploadError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        let file_size = metadata.len();
        if file_size == 0 {
            return Err(UploadError::EmptyFile {
                path: path.to_path_buf(),
            });
        }

        let upload = self.open_session(bucket, key, file_size).await?;

        let receipts = match self.upload_parts(&upload, path).await {
            Ok(receipts) => receipts,
            Err(e) => {
                error!("Upload of {}/{} failed during {}: {}", bucket, key, e.phase(), e);
                upload.abort().await;
                return Err(e);
            }
        };

        match upload.complete(receipts).await {
            Ok(result) => Ok(result),
            Err(e) => {
                error!("Commit of {}/{} failed: {}", bucket, key, e);
                upload.abort().await;
                Err(e)
            }
        }
    }

    /// Upload every part through a pool of at most `concurrency` tasks.
    ///
    /// The first permanent failure cancels the in-flight tasks and stops
    /// dispatching; the returned receipts are unordered.
    pub async fn upload_parts(&self, upload: &MultipartUpload, path: &Path) -> Result<Vec<PartReceipt>> {
        let partition = *upload.partition();
        let total_parts = partition.total_parts();

        let mut pending = partition.iter();
        let mut tasks = JoinSet::new();
        for descriptor in pending.by_ref().take(self.config.concurrency) {
            self.dispatch(&mut tasks, upload, path, descriptor);
        }

        let mut receipts = Vec::with_capacity(total_parts as usize);
        let mut bytes_uploaded = 0u64;

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| UploadError::Internal(format!("part task failed: {}", e)))
                .and_then(|result| result);

            let receipt = match outcome {
                Ok(receipt) => receipt,
                Err(e) => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(e);
                }
            };

            bytes_uploaded += partition
                .get(receipt.part_number)
                .map(|d| d.byte_length)
                .unwrap_or(0);
            let progress = Progress {
                part_number: receipt.part_number,
                completed_parts: receipts.len() as u32 + 1,
                total_parts,
                bytes_uploaded,
                total_bytes: partition.file_size(),
            };
            debug!("Part {} done, {}", receipt.part_number, progress);
            if let Some(on_progress) = &self.on_progress {
                on_progress(&progress);
            }
            receipts.push(receipt);

            if let Some(descriptor) = pending.next() {
                self.dispatch(&mut tasks, upload, path, descriptor);
            }
        }

        Ok(receipts)
    }

    fn dispatch(
        &self,
        tasks: &mut JoinSet<Result<PartReceipt>>,
        upload: &MultipartUpload,
        path: &Path,
        descriptor: PartDescriptor,
    ) {
        debug!(
            "Dispatching part {} ({} bytes at {})",
            descriptor.part_number, descriptor.byte_length, descriptor.byte_offset
        );
        tasks.spawn(upload_with_retry(
            upload.clone(),
            path.to_path_buf(),
            descriptor,
            self.config.part_retries,
            self.config.retry_delay,
        ));
    }
}

/// Upload one part, repeating the whole part on retryable failures
async fn upload_with_retry(
    upload: MultipartUpload,
    path: PathBuf,
    descriptor: PartDescriptor,
    retries: u32,
    delay: Duration,
) -> Result<PartReceipt> {
    let mut attempt = 0;
    loop {
        match upload.upload_part_from_file(&path, &descriptor).await {
            Ok(receipt) => return Ok(receipt),
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                warn!(
                    "Part {} attempt {}/{} failed, retrying: {}",
                    descriptor.part_number,
                    attempt,
                    retries + 1,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(
                    "Part {} failed after {} attempt(s): {}",
                    descriptor.part_number,
                    attempt + 1,
                    e
                );
                return Err(e);
            }
        }
    }
}
