//! Local chunked-upload object store built on fjall

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use mpu_core::*;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub mod bucket;
pub mod storage;
pub mod uploads;

pub use bucket::*;
pub use storage::*;
pub use uploads::*;

/// Storage engine wrapping a fjall keyspace
#[derive(Clone)]
pub struct StorageEngine {
    keyspace: Arc<Keyspace>,
    objects: PartitionHandle,
    chunks: PartitionHandle,
    uploads: PartitionHandle,
    staged_data: PartitionHandle,
    staged_info: PartitionHandle,
    chunk_lock: Arc<Mutex<()>>,
    session_lock: Arc<Mutex<()>>,
}

impl StorageEngine {
    /// Open or create a storage engine at the given path
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let keyspace = Config::new(path).open().map_err(storage_error)?;

        let open = |name: &str| {
            keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .map_err(storage_error)
        };

        let objects = open("objects")?;
        let chunks = open("chunks")?;
        let uploads = open("uploads")?;
        let staged_data = open("staged_data")?;
        let staged_info = open("staged_info")?;

        Ok(StorageEngine {
            keyspace: Arc::new(keyspace),
            objects,
            chunks,
            uploads,
            staged_data,
            staged_info,
            chunk_lock: Arc::new(Mutex::new(())),
            session_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Create temporary storage engine for testing
    #[cfg(any(test, feature = "test-utils"))]
    pub fn temp() -> StoreResult<(Self, tempfile::TempDir)> {
        let temp_dir = tempfile::tempdir()?;
        let engine = Self::new(temp_dir.path())?;
        Ok((engine, temp_dir))
    }

    /// Scoped view over one bucket's objects
    pub fn bucket(&self, bucket_id: &BucketId) -> Bucket {
        Bucket::new(self.clone(), bucket_id.clone())
    }

    /// Ledger of open multipart sessions and their staged parts
    pub fn uploads(&self) -> UploadLedger {
        UploadLedger::new(self.clone())
    }

    /// Persist all changes to disk
    pub fn persist(&self) -> StoreResult<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(storage_error)
    }

    /// Serializes chunk reference-count updates
    pub(crate) fn lock_chunks(&self) -> MutexGuard<'_, ()> {
        self.chunk_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serializes staging against session removal
    pub(crate) fn lock_sessions(&self) -> MutexGuard<'_, ()> {
        self.session_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn objects(&self) -> &PartitionHandle {
        &self.objects
    }

    pub(crate) fn chunks(&self) -> &PartitionHandle {
        &self.chunks
    }

    pub(crate) fn upload_sessions(&self) -> &PartitionHandle {
        &self.uploads
    }

    pub(crate) fn staged_data(&self) -> &PartitionHandle {
        &self.staged_data
    }

    pub(crate) fn staged_info(&self) -> &PartitionHandle {
        &self.staged_info
    }
}

pub(crate) fn storage_error(e: fjall::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}
