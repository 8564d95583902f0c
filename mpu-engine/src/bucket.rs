//! Bucket view over committed objects and their content-addressed chunks

use mpu_core::*;
use std::io::Write;
use crate::{storage_error, StorageEngine};

/// Objects of one bucket. Chunks are shared across buckets and
/// reference counted, so identical parts are stored once.
pub struct Bucket {
    id: BucketId,
    engine: StorageEngine,
}

impl Bucket {
    pub(crate) fn new(engine: StorageEngine, id: BucketId) -> Self {
        Bucket { id, engine }
    }

    pub fn id(&self) -> &BucketId {
        &self.id
    }

    /// Store a chunk under its content hash, or take another reference to it
    pub fn put_chunk(&self, hash: &ContentHash, data: &[u8]) -> StoreResult<()> {
        let _guard = self.engine.lock_chunks();
        let chunks = self.engine.chunks();
        let ref_key = chunk_ref_key(hash);

        let ref_count = match chunks.get(&ref_key).map_err(storage_error)? {
            Some(ref_data) => decode_ref_count(&ref_data)?,
            None => {
                chunks
                    .insert(chunk_key(hash), data)
                    .map_err(storage_error)?;
                0
            }
        };

        chunks
            .insert(ref_key, &(ref_count + 1).to_le_bytes()[..])
            .map_err(storage_error)
    }

    /// Publish an object, replacing any previous version of `key`
    pub fn put_manifest(&self, key: &Key, manifest: ChunkManifest) -> StoreResult<ObjectMetadata> {
        self.delete(key)?;

        let metadata = ObjectMetadata::from_manifest(manifest);
        let metadata_json = serde_json::to_vec(&metadata)?;

        self.engine
            .objects()
            .insert(self.metadata_key(key), metadata_json)
            .map_err(storage_error)?;

        Ok(metadata)
    }

    pub fn get_metadata(&self, key: &Key) -> StoreResult<Option<ObjectMetadata>> {
        match self
            .engine
            .objects()
            .get(self.metadata_key(key))
            .map_err(storage_error)?
        {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    pub fn get_chunk(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .engine
            .chunks()
            .get(chunk_key(hash))
            .map_err(storage_error)?
            .map(|data| data.to_vec()))
    }

    /// Stream an object's chunks into `out`, in manifest order
    pub fn write_object<W: Write>(&self, key: &Key, out: &mut W) -> StoreResult<Option<ObjectMetadata>> {
        let Some(metadata) = self.get_metadata(key)? else {
            return Ok(None);
        };

        for hash in &metadata.chunk_manifest.chunks {
            let chunk = self.get_chunk(hash)?.ok_or_else(|| {
                StoreError::Storage(format!("Missing chunk: {}", hash.to_hex()))
            })?;
            out.write_all(&chunk)?;
        }

        Ok(Some(metadata))
    }

    /// Remove an object and release its chunk references
    pub fn delete(&self, key: &Key) -> StoreResult<bool> {
        let Some(metadata) = self.get_metadata(key)? else {
            return Ok(false);
        };

        self.engine
            .objects()
            .remove(self.metadata_key(key))
            .map_err(storage_error)?;

        let _guard = self.engine.lock_chunks();
        let chunks = self.engine.chunks();
        for hash in metadata.chunk_manifest.chunks {
            let ref_key = chunk_ref_key(&hash);
            let Some(ref_data) = chunks.get(&ref_key).map_err(storage_error)? else {
                continue;
            };

            let ref_count = decode_ref_count(&ref_data)?;
            if ref_count > 1 {
                chunks
                    .insert(ref_key, &(ref_count - 1).to_le_bytes()[..])
                    .map_err(storage_error)?;
            } else {
                chunks.remove(chunk_key(&hash)).map_err(storage_error)?;
                chunks.remove(ref_key).map_err(storage_error)?;
            }
        }

        Ok(true)
    }

    /// Keys starting with `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &str, limit: Option<usize>) -> StoreResult<Vec<Key>> {
        let scan_prefix = format!("{}/{}", self.id, prefix);
        let bucket_prefix = format!("{}/", self.id);
        let mut keys = Vec::new();

        for item in self.engine.objects().prefix(scan_prefix.as_bytes()) {
            let (key_bytes, _) = item.map_err(storage_error)?;
            let Ok(key_str) = std::str::from_utf8(&key_bytes) else {
                continue;
            };
            if let Some(key) = key_str.strip_prefix(&bucket_prefix) {
                keys.push(Key::new(key).map_err(|e| StoreError::Storage(e.to_string()))?);
                if limit.is_some_and(|max| keys.len() >= max) {
                    break;
                }
            }
        }

        Ok(keys)
    }

    fn metadata_key(&self, key: &Key) -> Vec<u8> {
        format!("{}/{}", self.id, key).into_bytes()
    }
}

fn chunk_key(hash: &ContentHash) -> Vec<u8> {
    format!("chunk:{}", hash.to_hex()).into_bytes()
}

fn chunk_ref_key(hash: &ContentHash) -> Vec<u8> {
    format!("chunkref:{}", hash.to_hex()).into_bytes()
}

fn decode_ref_count(data: &[u8]) -> StoreResult<u32> {
    let bytes: [u8; 4] = data
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| StoreError::Storage("corrupt chunk reference count".to_string()))?;
    Ok(u32::from_le_bytes(bytes))
}
