use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::{DaggerwalkError, Result};

/// Destination for snapshots. A write either replaces the whole slot or
/// leaves the previous contents in place.
pub trait Storage: Send + Sync + 'static {
    fn write(&self, payload: &[u8]) -> Result<()>;
}

/// Single file overwritten through a uniquely named sibling temp file and a
/// rename, so concurrent writes never share a scratch file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl Storage for FileStorage {
    fn write(&self, payload: &[u8]) -> Result<()> {
        // Dropping the temp file on any error below removes it.
        let mut temp = NamedTempFile::new_in(self.directory())?;
        temp.write_all(payload)?;
        temp.flush()?;
        temp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

/// Counters describing what the writer has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    pub writes: u64,
    pub failures: u64,
    /// Pending payloads replaced before they were written.
    pub coalesced: u64,
}

#[derive(Debug)]
struct Job {
    seq: u64,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct WriterState {
    next_seq: u64,
    last_written: Option<Vec<u8>>,
    last_written_seq: u64,
    pending: Option<Job>,
    in_flight: bool,
    stats: WriterStats,
}

impl WriterState {
    fn record_success(&mut self, job: Job) {
        self.stats.writes += 1;
        if self.last_written.is_none() || job.seq >= self.last_written_seq {
            self.last_written_seq = job.seq;
            self.last_written = Some(job.payload);
        }
    }

    fn matches_last_written(&self, payload: &[u8]) -> bool {
        self.last_written.as_deref() == Some(payload)
    }
}

struct Shared<S> {
    storage: S,
    state: Mutex<WriterState>,
    idle: Condvar,
}

impl<S: Storage> Shared<S> {
    fn state(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Worker body: write `job`, then keep draining the pending slot until it
    /// is empty or a write fails.
    fn drain(&self, mut job: Job) {
        loop {
            let result = self.storage.write(&job.payload);
            let mut state = self.state();

            match result {
                Ok(()) => {
                    debug!(bytes = job.payload.len(), seq = job.seq, "snapshot written");
                    let superseded =
                        state.last_written.is_some() && job.seq < state.last_written_seq;
                    state.record_success(job);
                    if superseded {
                        // A newer payload was flushed while this one was stalled
                        // and this write landed on top of it.
                        if let Some(newer) = state.last_written.clone() {
                            warn!(
                                seq = state.last_written_seq,
                                "stale snapshot landed late, rewriting newer one"
                            );
                            job = Job {
                                seq: state.last_written_seq,
                                payload: newer,
                            };
                            continue;
                        }
                    }
                    match state.pending.take() {
                        Some(next) if !state.matches_last_written(&next.payload) => {
                            job = next;
                            continue;
                        }
                        _ => {}
                    }
                }
                Err(err) => {
                    error!(%err, seq = job.seq, "failed to persist snapshot");
                    state.stats.failures += 1;
                }
            }

            state.in_flight = false;
            self.idle.notify_all();
            return;
        }
    }
}

/// Persists the latest submitted payload with at most one write in flight.
///
/// Submissions never block on I/O. While a write is running, new payloads
/// collect in a single pending slot where the newest one wins; when the write
/// finishes the worker picks the slot up. A payload equal to the last one
/// written is dropped unless it replaces something already pending. Failed
/// writes are logged and not retried; the next submission tries again.
pub struct DebouncedWriter<S: Storage> {
    shared: Arc<Shared<S>>,
    flush_timeout: Duration,
}

impl<S: Storage> DebouncedWriter<S> {
    pub fn new(storage: S) -> Self {
        Self::with_flush_timeout(storage, Duration::from_secs(2))
    }

    pub fn with_flush_timeout(storage: S, flush_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                storage,
                state: Mutex::new(WriterState::default()),
                idle: Condvar::new(),
            }),
            flush_timeout,
        }
    }

    pub fn storage(&self) -> &S {
        &self.shared.storage
    }

    pub fn submit(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        let payload = payload.into();
        let mut state = self.lock()?;
        let seq = state.next_seq;
        state.next_seq += 1;
        let job = Job { seq, payload };

        if state.in_flight && state.pending.is_some() {
            state.pending = Some(job);
            state.stats.coalesced += 1;
            return Ok(());
        }

        if state.matches_last_written(&job.payload) {
            if !state.in_flight {
                // Anything still pending is older than this and already superseded.
                state.pending = None;
            }
            return Ok(());
        }

        if state.in_flight {
            state.pending = Some(job);
            return Ok(());
        }

        state.pending = None;
        state.in_flight = true;
        drop(state);
        self.spawn(job)
    }

    /// Serializes `value` as indented JSON and submits it.
    pub fn submit_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let payload = serde_json::to_vec_pretty(value)?;
        self.submit(payload)
    }

    /// Best-effort shutdown path: waits up to the flush timeout for the
    /// running write, then writes whatever is still pending on the calling
    /// thread. Errors are logged, never returned.
    pub fn flush(&self) {
        let mut state = match self.lock() {
            Ok(state) => state,
            Err(err) => {
                error!(%err, "cannot flush snapshot writer");
                return;
            }
        };

        let deadline = Instant::now() + self.flush_timeout;
        while state.in_flight {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("snapshot write still in flight at flush timeout, writing anyway");
                break;
            }
            state = self
                .shared
                .idle
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        let Some(job) = state.pending.take() else {
            return;
        };
        if state.matches_last_written(&job.payload) {
            return;
        }

        match self.shared.storage.write(&job.payload) {
            Ok(()) => {
                debug!(bytes = job.payload.len(), seq = job.seq, "snapshot flushed");
                state.record_success(job);
            }
            Err(err) => {
                error!(%err, seq = job.seq, "failed to flush snapshot");
                state.stats.failures += 1;
                state.pending = Some(job);
            }
        }
    }

    /// Blocks until no write is in flight or `timeout` passes. Returns whether
    /// the writer went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let Ok(state) = self.lock() else {
            return false;
        };
        let (state, _) = self
            .shared
            .idle
            .wait_timeout_while(state, timeout, |state| state.in_flight)
            .unwrap_or_else(PoisonError::into_inner);
        !state.in_flight
    }

    pub fn is_writing(&self) -> bool {
        self.shared.state().in_flight
    }

    pub fn has_pending(&self) -> bool {
        self.shared.state().pending.is_some()
    }

    pub fn last_written(&self) -> Option<Vec<u8>> {
        self.shared.state().last_written.clone()
    }

    pub fn stats(&self) -> WriterStats {
        self.shared.state().stats
    }

    fn spawn(&self, job: Job) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("snapshot-writer".to_string())
            .spawn(move || shared.drain(job));

        if let Err(err) = spawned {
            error!(%err, "could not start snapshot writer thread");
            let mut state = self.shared.state();
            state.in_flight = false;
            self.shared.idle.notify_all();
            return Err(err.into());
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, WriterState>> {
        self.shared
            .state
            .lock()
            .map_err(|_| DaggerwalkError::msg("snapshot writer state has been poisoned"))
    }
}

impl<S: Storage> std::fmt::Debug for DebouncedWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("DebouncedWriter")
            .field("in_flight", &state.in_flight)
            .field("pending", &state.pending.is_some())
            .field("stats", &state.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        sync::atomic::{AtomicBool, Ordering},
    };

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    /// Storage that records every payload and can hold writes until released.
    #[derive(Clone, Default)]
    struct RecordingStorage {
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        gate: Arc<(Mutex<bool>, Condvar)>,
        fail: Arc<AtomicBool>,
    }

    impl RecordingStorage {
        fn open() -> Self {
            let storage = Self::default();
            storage.release();
            storage
        }

        fn release(&self) {
            let (open, cv) = &*self.gate;
            *open.lock().unwrap() = true;
            cv.notify_all();
        }

        fn hold(&self) {
            *self.gate.0.lock().unwrap() = false;
        }

        fn writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl Storage for RecordingStorage {
        fn write(&self, payload: &[u8]) -> Result<()> {
            let (open, cv) = &*self.gate;
            let guard = open.lock().unwrap();
            let _guard = cv.wait_timeout_while(guard, WAIT, |open| !*open).unwrap();

            if self.fail.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
            }
            self.writes.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    }

    #[test]
    fn burst_during_write_keeps_only_latest() {
        let storage = RecordingStorage::default();
        let writer = DebouncedWriter::new(storage.clone());

        writer.submit("P1").unwrap();
        assert!(writer.is_writing());
        writer.submit("P2").unwrap();
        writer.submit("P3").unwrap();
        assert!(writer.has_pending());

        storage.release();
        assert!(writer.wait_idle(WAIT));

        assert_eq!(storage.writes(), vec![b"P1".to_vec(), b"P3".to_vec()]);
        assert_eq!(writer.last_written(), Some(b"P3".to_vec()));
        let stats = writer.stats();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.coalesced, 1);
    }

    #[test]
    fn identical_payload_is_not_rewritten() {
        let storage = RecordingStorage::open();
        let writer = DebouncedWriter::new(storage.clone());

        writer.submit("same").unwrap();
        assert!(writer.wait_idle(WAIT));
        writer.submit("same").unwrap();
        assert!(!writer.is_writing());
        assert!(writer.wait_idle(WAIT));

        assert_eq!(storage.writes().len(), 1);
    }

    #[test]
    fn pending_equal_to_just_written_is_dropped() {
        let storage = RecordingStorage::default();
        let writer = DebouncedWriter::new(storage.clone());

        writer.submit("A").unwrap();
        writer.submit("A").unwrap();
        storage.release();
        assert!(writer.wait_idle(WAIT));

        assert_eq!(storage.writes(), vec![b"A".to_vec()]);
        assert!(!writer.has_pending());
    }

    #[test]
    fn resubmitting_last_written_during_a_write_is_a_no_op() {
        let storage = RecordingStorage::open();
        let writer = DebouncedWriter::new(storage.clone());

        writer.submit("P1").unwrap();
        assert!(writer.wait_idle(WAIT));

        storage.hold();
        writer.submit("P2").unwrap();
        assert!(writer.is_writing());
        writer.submit("P1").unwrap();
        assert!(!writer.has_pending());

        storage.release();
        assert!(writer.wait_idle(WAIT));
        assert_eq!(storage.writes(), vec![b"P1".to_vec(), b"P2".to_vec()]);
        assert_eq!(writer.last_written(), Some(b"P2".to_vec()));
    }

    #[test]
    fn last_written_payload_may_still_replace_a_pending_one() {
        let storage = RecordingStorage::open();
        let writer = DebouncedWriter::new(storage.clone());

        writer.submit("P1").unwrap();
        assert!(writer.wait_idle(WAIT));

        storage.hold();
        writer.submit("P2").unwrap();
        writer.submit("P3").unwrap();
        writer.submit("P1").unwrap();

        storage.release();
        assert!(writer.wait_idle(WAIT));
        assert_eq!(
            storage.writes(),
            vec![b"P1".to_vec(), b"P2".to_vec(), b"P1".to_vec()]
        );
        assert_eq!(writer.stats().coalesced, 1);
    }

    #[test]
    fn late_worker_write_cannot_leave_stale_data_after_flush() {
        let storage = RecordingStorage::open();
        let writer =
            DebouncedWriter::with_flush_timeout(storage.clone(), Duration::from_millis(50));

        writer.submit("P0").unwrap();
        assert!(writer.wait_idle(WAIT));

        storage.hold();
        writer.submit("OLD").unwrap();
        writer.submit("NEW").unwrap();

        let releaser = {
            let storage = storage.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                storage.release();
            })
        };
        writer.flush();
        releaser.join().unwrap();
        assert!(writer.wait_idle(WAIT));

        assert_eq!(storage.writes().last(), Some(&b"NEW".to_vec()));
        assert_eq!(writer.last_written(), Some(b"NEW".to_vec()));
    }

    #[test]
    fn failure_clears_in_flight_without_retry() {
        let storage = RecordingStorage::open();
        storage.fail.store(true, Ordering::SeqCst);
        let writer = DebouncedWriter::new(storage.clone());

        writer.submit("A").unwrap();
        assert!(writer.wait_idle(WAIT));
        assert_eq!(writer.stats().failures, 1);
        assert_eq!(writer.last_written(), None);
        assert!(storage.writes().is_empty());

        storage.fail.store(false, Ordering::SeqCst);
        writer.submit("A").unwrap();
        assert!(writer.wait_idle(WAIT));
        assert_eq!(writer.last_written(), Some(b"A".to_vec()));
    }

    #[test]
    fn flush_persists_payload_left_by_failed_write() {
        let storage = RecordingStorage::default();
        storage.fail.store(true, Ordering::SeqCst);
        let writer = DebouncedWriter::new(storage.clone());

        writer.submit("P1").unwrap();
        writer.submit("P2").unwrap();
        storage.release();
        assert!(writer.wait_idle(WAIT));
        assert!(writer.has_pending());

        storage.fail.store(false, Ordering::SeqCst);
        writer.flush();

        assert_eq!(writer.last_written(), Some(b"P2".to_vec()));
        assert_eq!(storage.writes(), vec![b"P2".to_vec()]);
        assert!(!writer.has_pending());
    }

    #[test]
    fn flush_after_burst_ends_on_latest_payload() {
        let storage = RecordingStorage::default();
        let writer = DebouncedWriter::with_flush_timeout(storage.clone(), WAIT);

        for index in 0..10 {
            writer.submit(format!("snapshot {index}")).unwrap();
        }

        let releaser = {
            let storage = storage.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                storage.release();
            })
        };
        writer.flush();
        releaser.join().unwrap();

        assert_eq!(writer.last_written(), Some(b"snapshot 9".to_vec()));
        assert!(storage.writes().len() <= 2);
    }

    #[test]
    fn submits_pretty_json() {
        let storage = RecordingStorage::open();
        let writer = DebouncedWriter::new(storage.clone());

        writer.submit_json(&serde_json::json!({ "region": "Daggerfall" })).unwrap();
        assert!(writer.wait_idle(WAIT));

        let written = String::from_utf8(storage.writes().remove(0)).unwrap();
        assert!(written.contains("\n  \"region\": \"Daggerfall\""));
    }

    #[test]
    fn file_storage_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("MapData.json");
        let storage = FileStorage::new(&target);

        storage.write(b"first").unwrap();
        storage.write(b"second").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"second");
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("MapData.json")]);
    }

    #[test]
    fn concurrent_file_writes_do_not_share_a_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("MapData.json"));

        let handles: Vec<_> = (0..8)
            .map(|index| {
                let storage = storage.clone();
                thread::spawn(move || storage.write(format!("payload {index}").as_bytes()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let contents = String::from_utf8(fs::read(storage.path()).unwrap()).unwrap();
        assert!(contents.starts_with("payload "));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn file_storage_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("missing").join("MapData.json"));
        assert!(matches!(storage.write(b"data"), Err(DaggerwalkError::Io(_))));
    }
}
