//! Open multipart sessions and their staged parts

use mpu_core::*;
use crate::{storage_error, StorageEngine};

/// Session records and staged parts, keyed by session token.
///
/// Each part is staged under its own key, so concurrent part uploads for one
/// session never contend on a shared record.
pub struct UploadLedger {
    engine: StorageEngine,
}

impl UploadLedger {
    pub(crate) fn new(engine: StorageEngine) -> Self {
        UploadLedger { engine }
    }

    /// Register a new session and return its token
    pub fn create(&self, bucket: &BucketId, key: &Key) -> StoreResult<SessionToken> {
        let token = SessionToken::new(ulid::Ulid::new().to_string());
        let state = MultipartUploadState::new(token.clone(), bucket.clone(), key.clone());

        self.engine
            .upload_sessions()
            .insert(token.as_str(), serde_json::to_vec(&state)?)
            .map_err(storage_error)?;

        Ok(token)
    }

    pub fn session(&self, token: &SessionToken) -> StoreResult<Option<MultipartUploadState>> {
        match self
            .engine
            .upload_sessions()
            .get(token.as_str())
            .map_err(storage_error)?
        {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// All open sessions, oldest first
    pub fn list(&self) -> StoreResult<Vec<MultipartUploadState>> {
        let mut sessions = Vec::new();
        for item in self.engine.upload_sessions().iter() {
            let (_, value) = item.map_err(storage_error)?;
            sessions.push(serde_json::from_slice::<MultipartUploadState>(&value)?);
        }
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    /// Stage a part, replacing any earlier upload of the same part number.
    ///
    /// Fails with `NoSuchUpload` if the session was removed meanwhile.
    pub fn stage_part(&self, token: &SessionToken, part_number: u32, data: &[u8]) -> StoreResult<PartInfo> {
        let _guard = self.engine.lock_sessions();
        if self
            .engine
            .upload_sessions()
            .get(token.as_str())
            .map_err(storage_error)?
            .is_none()
        {
            return Err(StoreError::NoSuchUpload(token.to_string()));
        }

        let info = PartInfo {
            part_number,
            size: data.len() as u64,
            content_hash: ContentHash::new(data),
        };
        let key = part_key(token, part_number);

        self.engine
            .staged_data()
            .insert(key.as_str(), data)
            .map_err(storage_error)?;
        self.engine
            .staged_info()
            .insert(key.as_str(), serde_json::to_vec(&info)?)
            .map_err(storage_error)?;

        Ok(info)
    }

    pub fn part_info(&self, token: &SessionToken, part_number: u32) -> StoreResult<Option<PartInfo>> {
        match self
            .engine
            .staged_info()
            .get(part_key(token, part_number))
            .map_err(storage_error)?
        {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    pub fn part_data(&self, token: &SessionToken, part_number: u32) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .engine
            .staged_data()
            .get(part_key(token, part_number))
            .map_err(storage_error)?
            .map(|data| data.to_vec()))
    }

    /// Staged parts of a session, ordered by part number
    pub fn parts(&self, token: &SessionToken) -> StoreResult<Vec<PartInfo>> {
        let mut parts = Vec::new();
        for item in self.engine.staged_info().prefix(session_prefix(token)) {
            let (_, value) = item.map_err(storage_error)?;
            parts.push(serde_json::from_slice::<PartInfo>(&value)?);
        }
        Ok(parts)
    }

    /// Drop the session record and every staged part
    pub fn remove(&self, token: &SessionToken) -> StoreResult<()> {
        let _guard = self.engine.lock_sessions();
        let prefix = session_prefix(token);

        for partition in [self.engine.staged_data(), self.engine.staged_info()] {
            let mut keys = Vec::new();
            for item in partition.prefix(&prefix) {
                let (key, _) = item.map_err(storage_error)?;
                keys.push(key);
            }
            for key in keys {
                partition.remove(key).map_err(storage_error)?;
            }
        }

        self.engine
            .upload_sessions()
            .remove(token.as_str())
            .map_err(storage_error)
    }
}

fn session_prefix(token: &SessionToken) -> String {
    format!("{}/", token)
}

// Zero padded so prefix scans return parts in numeric order
fn part_key(token: &SessionToken, part_number: u32) -> String {
    format!("{}/{:010}", token, part_number)
}
