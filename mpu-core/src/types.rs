//! Core data types for mpu

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::{ErrorKind, UploadError};

/// Bucket name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketId(String);

impl BucketId {
    /// Create a new bucket ID with validation
    pub fn new(name: &str) -> crate::Result<Self> {
        if name.is_empty() {
            return Err(UploadError::InvalidBucketName("empty name".to_string()));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(UploadError::InvalidBucketName(format!(
                "invalid characters in '{}'",
                name
            )));
        }

        Ok(BucketId(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BucketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Object key within a bucket
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(String);

impl Key {
    /// Create a new key with validation
    pub fn new(key: &str) -> crate::Result<Self> {
        if key.is_empty() {
            return Err(UploadError::InvalidKey("empty key".to_string()));
        }

        if key.chars().any(|c| c.is_control()) {
            return Err(UploadError::InvalidKey(
                "control characters not allowed".to_string(),
            ));
        }

        Ok(Key(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token identifying a server-side upload session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        SessionToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version identifier using ULID for time-ordering
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(ulid::Ulid);

impl Version {
    /// Generate a new version with current timestamp
    pub fn new() -> Self {
        Version(ulid::Ulid::new())
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// BLAKE3 content hash, used as part tag and chunk address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create hash from data using BLAKE3
    pub fn new(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        ContentHash(hash.into())
    }

    /// Hash of the concatenated part hashes, identifying a committed object
    pub fn of_parts<'a>(parts: impl IntoIterator<Item = &'a ContentHash>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(&part.0);
        }
        ContentHash(hasher.finalize().into())
    }

    /// Get hash as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Ordered chunk list of a committed multipart object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub chunks: Vec<ContentHash>,
    pub chunk_size: u64,
    pub total_size: u64,
}

impl ChunkManifest {
    pub fn new(chunks: Vec<ContentHash>, chunk_size: u64, total_size: u64) -> Self {
        ChunkManifest {
            chunks,
            chunk_size,
            total_size,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Metadata of a committed object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub size: u64,
    pub version: Version,
    pub content_hash: ContentHash,
    pub created_at: SystemTime,
    pub chunk_manifest: ChunkManifest,
}

impl ObjectMetadata {
    /// Create metadata for an object assembled from parts
    pub fn from_manifest(chunk_manifest: ChunkManifest) -> Self {
        ObjectMetadata {
            size: chunk_manifest.total_size,
            version: Version::new(),
            content_hash: ContentHash::of_parts(&chunk_manifest.chunks),
            created_at: SystemTime::now(),
            chunk_manifest,
        }
    }

    /// Multipart-style entity tag: combined hash plus part count
    pub fn etag(&self) -> String {
        format!(
            "{}-{}",
            self.content_hash.to_hex(),
            self.chunk_manifest.chunk_count()
        )
    }
}

/// A multipart upload session bound to one (bucket, key) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub bucket: BucketId,
    pub object_key: Key,
    pub session_token: SessionToken,
    pub part_size: u64,
    pub total_parts: u32,
    pub file_size: u64,
}

/// A contiguous byte range of the source file uploaded as one part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartDescriptor {
    /// 1-based part number
    pub part_number: u32,
    pub byte_offset: u64,
    pub byte_length: u64,
}

impl PartDescriptor {
    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.byte_offset.saturating_add(self.byte_length)
    }
}

/// Store acknowledgement of one uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartReceipt {
    pub part_number: u32,
    pub tag: String,
}

/// Outcome of a whole upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    pub object_key: Key,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub size: Option<u64>,
    pub etag: Option<String>,
}

impl UploadResult {
    pub fn committed(object_key: Key, metadata: &ObjectMetadata) -> Self {
        UploadResult {
            object_key,
            success: true,
            error_kind: None,
            size: Some(metadata.size),
            etag: Some(metadata.etag()),
        }
    }

    pub fn failed(object_key: Key, error: &UploadError) -> Self {
        UploadResult {
            object_key,
            success: false,
            error_kind: Some(error.kind()),
            size: None,
            etag: None,
        }
    }
}

/// Server-side record of an open multipart upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartUploadState {
    pub session_token: SessionToken,
    pub bucket: BucketId,
    pub key: Key,
    pub created_at: SystemTime,
}

impl MultipartUploadState {
    pub fn new(session_token: SessionToken, bucket: BucketId, key: Key) -> Self {
        MultipartUploadState {
            session_token,
            bucket,
            key,
            created_at: SystemTime::now(),
        }
    }
}

/// Information about a staged part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartInfo {
    pub part_number: u32,
    pub size: u64,
    pub content_hash: ContentHash,
}

mod hex {
    use std::fmt::Write;

    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut output, b| {
            let _ = write!(output, "{:02x}", b);
            output
        })
    }
}
