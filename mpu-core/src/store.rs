//! Contract of a chunked-upload object store

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::{BucketId, Key, ObjectMetadata, SessionToken, StoreError};

/// Boxed stream carrying the bytes of one part
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The four multipart operations the coordinator consumes.
///
/// Transport-level retries and per-request deadlines are the implementor's
/// concern.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a server-side upload session for `bucket/key`
    async fn initiate(&self, bucket: &BucketId, key: &Key) -> StoreResult<SessionToken>;

    /// Store one part; returns the tag that must be presented on completion
    async fn upload_part(
        &self,
        token: &SessionToken,
        part_number: u32,
        byte_length: u64,
        body: ByteStream,
    ) -> StoreResult<String>;

    /// Assemble the listed parts, strictly ascending by part number
    async fn complete(
        &self,
        token: &SessionToken,
        parts: &[(u32, String)],
    ) -> StoreResult<ObjectMetadata>;

    /// Release staged parts of an unfinished session
    async fn abort(&self, token: &SessionToken) -> StoreResult<()>;
}
