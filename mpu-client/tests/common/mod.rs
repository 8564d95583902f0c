//! Shared fixtures: a fault-injecting store over the fjall engine

#![allow(dead_code)]

use async_trait::async_trait;
use mpu_core::*;
use mpu_engine::{Storage, StorageEngine};
use rand::RngCore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failure behaviour for one part number
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Fail with a retryable error this many times, then succeed
    Transient(usize),
    /// Fail with a retryable error on every attempt
    AlwaysTransient,
    /// Fail with a non-retryable error
    Rejected,
    /// Never finish
    Hang,
}

enum Action {
    Fail(StoreError),
    Hang,
}

/// Wraps the local engine, counting calls and injecting faults
pub struct TestStore {
    inner: Storage,
    _temp: tempfile::TempDir,
    faults: Mutex<HashMap<u32, Fault>>,
    attempts: Mutex<HashMap<u32, usize>>,
    part_delay: Mutex<Duration>,
    reject_initiate: AtomicBool,
    reject_complete: AtomicBool,
    reject_abort: AtomicBool,
    pub initiate_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
    pub abort_calls: AtomicUsize,
    pub cancelled: AtomicUsize,
    hanging: AtomicUsize,
    hold_failures: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl TestStore {
    pub fn new() -> Arc<Self> {
        let (engine, temp) = StorageEngine::temp().unwrap();
        Arc::new(TestStore {
            inner: Storage::new(engine),
            _temp: temp,
            faults: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            part_delay: Mutex::new(Duration::ZERO),
            reject_initiate: AtomicBool::new(false),
            reject_complete: AtomicBool::new(false),
            reject_abort: AtomicBool::new(false),
            initiate_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
            abort_calls: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            hanging: AtomicUsize::new(0),
            hold_failures: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.inner
    }

    pub fn inject(&self, part_number: u32, fault: Fault) {
        self.faults.lock().unwrap().insert(part_number, fault);
    }

    pub fn set_part_delay(&self, delay: Duration) {
        *self.part_delay.lock().unwrap() = delay;
    }

    pub fn reject_initiate(&self) {
        self.reject_initiate.store(true, Ordering::SeqCst);
    }

    pub fn reject_complete(&self) {
        self.reject_complete.store(true, Ordering::SeqCst);
    }

    pub fn reject_abort(&self) {
        self.reject_abort.store(true, Ordering::SeqCst);
    }

    /// Delay injected failures until `hanging` parts are parked
    pub fn hold_failures_until_hanging(&self, hanging: usize) {
        self.hold_failures.store(hanging, Ordering::SeqCst);
    }

    pub fn attempts(&self, part_number: u32) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(&part_number)
            .copied()
            .unwrap_or(0)
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn next_action(&self, part_number: u32) -> Option<Action> {
        *self.attempts.lock().unwrap().entry(part_number).or_default() += 1;

        let mut faults = self.faults.lock().unwrap();
        match faults.get_mut(&part_number) {
            Some(Fault::Transient(times)) if *times > 0 => {
                *times -= 1;
                Some(Action::Fail(StoreError::Transient("connection reset".into())))
            }
            Some(Fault::AlwaysTransient) => {
                Some(Action::Fail(StoreError::Transient("connection reset".into())))
            }
            Some(Fault::Rejected) => Some(Action::Fail(StoreError::Rejected("access denied".into()))),
            Some(Fault::Hang) => Some(Action::Hang),
            _ => None,
        }
    }
}

struct CancelGuard<'a>(&'a AtomicUsize);

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct FlightGuard<'a>(&'a AtomicUsize);

impl<'a> FlightGuard<'a> {
    fn enter(in_flight: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        FlightGuard(in_flight)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for TestStore {
    async fn initiate(&self, bucket: &BucketId, key: &Key) -> StoreResult<SessionToken> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_initiate.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("no such bucket".into()));
        }
        self.inner.initiate(bucket, key).await
    }

    async fn upload_part(
        &self,
        token: &SessionToken,
        part_number: u32,
        byte_length: u64,
        body: ByteStream,
    ) -> StoreResult<String> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let _flight = FlightGuard::enter(&self.in_flight, &self.max_in_flight);

        match self.next_action(part_number) {
            Some(Action::Fail(err)) => {
                while self.hanging.load(Ordering::SeqCst) < self.hold_failures.load(Ordering::SeqCst) {
                    tokio::task::yield_now().await;
                }
                return Err(err);
            }
            Some(Action::Hang) => {
                self.hanging.fetch_add(1, Ordering::SeqCst);
                let _guard = CancelGuard(&self.cancelled);
                std::future::pending::<()>().await;
            }
            None => {}
        }

        let delay = *self.part_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.upload_part(token, part_number, byte_length, body).await
    }

    async fn complete(&self, token: &SessionToken, parts: &[(u32, String)]) -> StoreResult<ObjectMetadata> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_complete.load(Ordering::SeqCst) {
            return Err(StoreError::InvalidPart {
                part_number: parts.first().map(|p| p.0).unwrap_or(1),
                reason: "tag mismatch".into(),
            });
        }
        self.inner.complete(token, parts).await
    }

    async fn abort(&self, token: &SessionToken) -> StoreResult<()> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_abort.load(Ordering::SeqCst) {
            return Err(StoreError::Transient("endpoint unavailable".into()));
        }
        self.inner.abort(token).await
    }
}

/// Write `len` random bytes to a file under `dir`
pub fn write_fixture(dir: &Path, len: usize) -> (PathBuf, Vec<u8>) {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    let path = dir.join("source.bin");
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

pub fn ids() -> (BucketId, Key) {
    (
        BucketId::new("uploads").unwrap(),
        Key::new("backups/source.bin").unwrap(),
    )
}
