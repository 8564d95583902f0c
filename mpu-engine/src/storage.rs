//! High-level store operations and the `ObjectStore` implementation

use async_trait::async_trait;
use futures::StreamExt;
use mpu_core::*;
use std::io::Write;
use tracing::{debug, info};
use crate::StorageEngine;

/// Local multipart object store
#[derive(Clone)]
pub struct Storage {
    engine: StorageEngine,
}

impl Storage {
    pub fn new(engine: StorageEngine) -> Self {
        Storage { engine }
    }

    /// Read a whole object into memory
    pub fn get_object(&self, bucket_id: &BucketId, key: &Key) -> StoreResult<Option<Vec<u8>>> {
        let mut data = Vec::new();
        Ok(self
            .engine
            .bucket(bucket_id)
            .write_object(key, &mut data)?
            .map(|_| data))
    }

    /// Copy an object into `out` chunk by chunk
    pub fn write_object<W: Write>(
        &self,
        bucket_id: &BucketId,
        key: &Key,
        out: &mut W,
    ) -> StoreResult<Option<ObjectMetadata>> {
        self.engine.bucket(bucket_id).write_object(key, out)
    }

    pub fn get_metadata(&self, bucket_id: &BucketId, key: &Key) -> StoreResult<Option<ObjectMetadata>> {
        self.engine.bucket(bucket_id).get_metadata(key)
    }

    pub fn delete_object(&self, bucket_id: &BucketId, key: &Key) -> StoreResult<bool> {
        let removed = self.engine.bucket(bucket_id).delete(key)?;
        self.engine.persist()?;
        Ok(removed)
    }

    pub fn list_objects(&self, bucket_id: &BucketId, prefix: &str, limit: Option<usize>) -> StoreResult<Vec<Key>> {
        self.engine.bucket(bucket_id).scan_prefix(prefix, limit)
    }

    pub fn list_uploads(&self) -> StoreResult<Vec<MultipartUploadState>> {
        self.engine.uploads().list()
    }

    fn open_session(&self, token: &SessionToken) -> StoreResult<MultipartUploadState> {
        self.engine
            .uploads()
            .session(token)?
            .ok_or_else(|| StoreError::NoSuchUpload(token.to_string()))
    }
}

#[async_trait]
impl ObjectStore for Storage {
    async fn initiate(&self, bucket: &BucketId, key: &Key) -> StoreResult<SessionToken> {
        let token = self.engine.uploads().create(bucket, key)?;
        self.engine.persist()?;
        info!("Initiated upload {} for {}/{}", token, bucket, key);
        Ok(token)
    }

    async fn upload_part(
        &self,
        token: &SessionToken,
        part_number: u32,
        byte_length: u64,
        mut body: ByteStream,
    ) -> StoreResult<String> {
        self.open_session(token)?;
        if part_number == 0 {
            return Err(StoreError::InvalidPart {
                part_number,
                reason: "part numbers start at 1".to_string(),
            });
        }

        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk?);
            if data.len() as u64 > byte_length {
                return Err(StoreError::InvalidPart {
                    part_number,
                    reason: format!("body exceeds declared {} bytes", byte_length),
                });
            }
        }

        if data.len() as u64 != byte_length {
            return Err(StoreError::InvalidPart {
                part_number,
                reason: format!("expected {} bytes, received {}", byte_length, data.len()),
            });
        }

        let info = self.engine.uploads().stage_part(token, part_number, &data)?;
        self.engine.persist()?;

        debug!("Staged part {} of {} ({} bytes)", part_number, token, info.size);
        Ok(info.content_hash.to_hex())
    }

    async fn complete(&self, token: &SessionToken, parts: &[(u32, String)]) -> StoreResult<ObjectMetadata> {
        let state = self.open_session(token)?;
        let ledger = self.engine.uploads();

        if parts.is_empty() {
            return Err(StoreError::Rejected("no parts listed".to_string()));
        }
        if parts.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(StoreError::Rejected(
                "parts must be listed in ascending order without duplicates".to_string(),
            ));
        }

        let mut staged = Vec::with_capacity(parts.len());
        for (part_number, tag) in parts {
            let info = ledger
                .part_info(token, *part_number)?
                .ok_or_else(|| StoreError::InvalidPart {
                    part_number: *part_number,
                    reason: "part was never uploaded".to_string(),
                })?;
            if info.content_hash.to_hex() != *tag {
                return Err(StoreError::InvalidPart {
                    part_number: *part_number,
                    reason: "tag mismatch".to_string(),
                });
            }
            staged.push(info);
        }

        let bucket = self.engine.bucket(&state.bucket);
        for info in &staged {
            let data = ledger.part_data(token, info.part_number)?.ok_or_else(|| {
                StoreError::Storage(format!("staged data missing for part {}", info.part_number))
            })?;
            bucket.put_chunk(&info.content_hash, &data)?;
        }

        let chunk_size = staged[0].size;
        let total_size: u64 = staged.iter().map(|p| p.size).sum();
        let chunks: Vec<ContentHash> = staged.into_iter().map(|p| p.content_hash).collect();
        let metadata = bucket.put_manifest(&state.key, ChunkManifest::new(chunks, chunk_size, total_size))?;

        ledger.remove(token)?;
        self.engine.persist()?;

        info!(
            "Completed upload {} as {}/{} ({} bytes, {} parts)",
            token,
            state.bucket,
            state.key,
            metadata.size,
            metadata.chunk_manifest.chunk_count()
        );
        Ok(metadata)
    }

    async fn abort(&self, token: &SessionToken) -> StoreResult<()> {
        self.open_session(token)?;
        self.engine.uploads().remove(token)?;
        self.engine.persist()?;
        info!("Aborted upload {}", token);
        Ok(())
    }
}
