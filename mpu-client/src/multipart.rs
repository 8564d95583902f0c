//! Multipart upload session handle

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use mpu_core::*;
use crate::streaming::RangeReader;

const OPEN: u8 = 0;
const COMPLETED: u8 = 1;
const ABORTED: u8 = 2;

/// Lifecycle of a session: `Open -> {Completed | Aborted}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Completed,
    Aborted,
}

impl SessionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            OPEN => SessionState::Open,
            COMPLETED => SessionState::Completed,
            _ => SessionState::Aborted,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
        }
    }
}

/// Handle to an open multipart upload session.
///
/// Clones share the session and its state, so part uploads can run on
/// separate tasks.
#[derive(Clone)]
pub struct MultipartUpload {
    store: Arc<dyn ObjectStore>,
    session: Arc<UploadSession>,
    partition: Partition,
    state: Arc<AtomicU8>,
}

impl fmt::Debug for MultipartUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartUpload")
            .field("session", &self.session)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl MultipartUpload {
    pub(crate) fn new(store: Arc<dyn ObjectStore>, session: UploadSession, partition: Partition) -> Self {
        MultipartUpload {
            store,
            session: Arc::new(session),
            partition,
            state: Arc::new(AtomicU8::new(OPEN)),
        }
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    /// Part layout the session was opened with
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Upload one part from an already opened byte stream.
    ///
    /// The descriptor must be the session's own layout for that part number.
    pub async fn upload_part(&self, descriptor: &PartDescriptor, body: ByteStream) -> Result<PartReceipt> {
        self.ensure_open("upload a part to")?;

        let part_number = descriptor.part_number;
        match self.partition.get(part_number) {
            Some(expected) if expected == *descriptor => {}
            Some(expected) => {
                return Err(UploadError::Internal(format!(
                    "part {} covers {}..{}, not {}..{}",
                    part_number,
                    expected.byte_offset,
                    expected.end(),
                    descriptor.byte_offset,
                    descriptor.end()
                )));
            }
            None => {
                return Err(UploadError::Internal(format!(
                    "part {} outside 1..={}",
                    part_number, self.session.total_parts
                )));
            }
        }

        let tag = self
            .store
            .upload_part(
                &self.session.session_token,
                part_number,
                descriptor.byte_length,
                body,
            )
            .await
            .map_err(|cause| UploadError::PartUpload { part_number, cause })?;

        debug!("Part {}/{} uploaded, tag={}", part_number, self.session.total_parts, tag);
        Ok(PartReceipt { part_number, tag })
    }

    /// Upload one part read from its own range of `path`
    pub async fn upload_part_from_file(&self, path: &Path, descriptor: &PartDescriptor) -> Result<PartReceipt> {
        let reader = RangeReader::open(path, descriptor).await?;
        self.upload_part(descriptor, reader.into_stream()).await
    }

    /// Commit the session.
    ///
    /// Receipts may arrive in any order. A receipt set that does not cover
    /// `1..=total_parts` exactly once fails before the store is contacted.
    pub async fn complete(&self, receipts: Vec<PartReceipt>) -> Result<UploadResult> {
        self.ensure_open("complete")?;

        let ordered = order_receipts(receipts, self.session.total_parts)?;
        let parts: Vec<(u32, String)> = ordered
            .into_iter()
            .map(|r| (r.part_number, r.tag))
            .collect();

        let metadata = self
            .store
            .complete(&self.session.session_token, &parts)
            .await
            .map_err(UploadError::Commit)?;

        let _ = self
            .state
            .compare_exchange(OPEN, COMPLETED, Ordering::AcqRel, Ordering::Acquire);

        info!(
            "Committed {}/{} ({} bytes in {} parts)",
            self.session.bucket, self.session.object_key, metadata.size, self.session.total_parts
        );
        Ok(UploadResult::committed(self.session.object_key.clone(), &metadata))
    }

    /// Release the session's server-side resources.
    ///
    /// Only the first call reaches the store; store failures come back as
    /// `UploadError::Abort`.
    pub async fn try_abort(&self) -> Result<()> {
        match self
            .state
            .compare_exchange(OPEN, ABORTED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.store
                    .abort(&self.session.session_token)
                    .await
                    .map_err(UploadError::Abort)?;
                info!(
                    "Aborted upload of {}/{}",
                    self.session.bucket, self.session.object_key
                );
                Ok(())
            }
            Err(ABORTED) => {
                debug!("Upload {} already aborted", self.session.session_token);
                Ok(())
            }
            Err(_) => Err(UploadError::InvalidState {
                operation: "abort",
                state: SessionState::Completed.as_str(),
            }),
        }
    }

    /// Best-effort [`try_abort`](Self::try_abort): failures are logged
    pub async fn abort(&self) {
        if let Err(e) = self.try_abort().await {
            warn!(
                "Abort of upload {} did not complete cleanly: {}",
                self.session.session_token, e
            );
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        match self.state() {
            SessionState::Open => Ok(()),
            state => Err(UploadError::InvalidState {
                operation,
                state: state.as_str(),
            }),
        }
    }
}

/// Sort receipts by part number and check they cover `1..=total_parts` once
pub fn order_receipts(mut receipts: Vec<PartReceipt>, total_parts: u32) -> Result<Vec<PartReceipt>> {
    receipts.sort_by_key(|r| r.part_number);

    let received = receipts.len();
    let mut ordered: Vec<PartReceipt> = Vec::with_capacity(received);
    let mut missing = Vec::new();
    let mut unexpected = Vec::new();
    let mut next = 1u32;

    for receipt in receipts {
        let n = receipt.part_number;
        let duplicate = ordered.last().is_some_and(|last| last.part_number == n);
        if n == 0 || n > total_parts || duplicate {
            unexpected.push(n);
            continue;
        }
        missing.extend(next..n);
        next = n + 1;
        ordered.push(receipt);
    }
    if next <= total_parts {
        missing.extend(next..=total_parts);
    }

    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(UploadError::IncompleteUpload {
            expected: total_parts,
            received,
            missing,
            unexpected,
        });
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(n: u32) -> PartReceipt {
        PartReceipt {
            part_number: n,
            tag: format!("tag-{}", n),
        }
    }

    #[test]
    fn test_orders_shuffled_receipts() {
        let receipts = vec![receipt(3), receipt(1), receipt(4), receipt(2)];
        let ordered = order_receipts(receipts, 4).unwrap();
        let numbers: Vec<u32> = ordered.iter().map(|r| r.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_reports_gap() {
        let receipts = vec![receipt(1), receipt(2), receipt(4), receipt(5)];
        match order_receipts(receipts, 5) {
            Err(UploadError::IncompleteUpload { expected, received, missing, unexpected }) => {
                assert_eq!(expected, 5);
                assert_eq!(received, 4);
                assert_eq!(missing, vec![3]);
                assert!(unexpected.is_empty());
            }
            other => panic!("expected IncompleteUpload, got {:?}", other),
        }
    }

    #[test]
    fn test_reports_duplicates_and_out_of_range() {
        let receipts = vec![receipt(1), receipt(2), receipt(2), receipt(0), receipt(9)];
        match order_receipts(receipts, 2) {
            Err(UploadError::IncompleteUpload { missing, unexpected, .. }) => {
                assert!(missing.is_empty());
                assert_eq!(unexpected, vec![0, 2, 9]);
            }
            other => panic!("expected IncompleteUpload, got {:?}", other),
        }
    }

    #[test]
    fn test_reports_missing_tail() {
        let err = order_receipts(vec![receipt(1)], 3).unwrap_err();
        assert!(matches!(
            err,
            UploadError::IncompleteUpload { ref missing, .. } if missing == &vec![2, 3]
        ));
    }
}
