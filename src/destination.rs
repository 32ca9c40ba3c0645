//! One output path: a backend plus per-destination policy and counters.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::backend::{Backend, BackendKind};
use crate::errors::{OmniError, Result};

const STATE_ACTIVE: u8 = 0;
const STATE_DRAINING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle state of a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationState {
    Active,
    Draining,
    Closed,
}

/// A named output path. Identity is the URI; the backend is guarded by this
/// destination's own mutex, serialising the dispatcher against management
/// calls (flush, sync, close, rotation included).
pub struct Destination {
    uri: String,
    kind: BackendKind,
    enabled: AtomicBool,
    state: AtomicU8,
    backend: Mutex<Box<dyn Backend>>,
    /// Set for file backends; the cleanup ticker walks these.
    file_path: Option<PathBuf>,
    writes: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
    total_write_ns: AtomicU64,
    max_write_ns: AtomicU64,
    last_write_unix_ns: AtomicU64,
}

impl Destination {
    pub(crate) fn new(
        uri: String,
        kind: BackendKind,
        backend: Box<dyn Backend>,
        file_path: Option<PathBuf>,
    ) -> Destination {
        Destination {
            uri,
            kind,
            enabled: AtomicBool::new(true),
            state: AtomicU8::new(STATE_ACTIVE),
            backend: Mutex::new(backend),
            file_path,
            writes: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_write_ns: AtomicU64::new(0),
            max_write_ns: AtomicU64::new(0),
            last_write_unix_ns: AtomicU64::new(0),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub(crate) fn file_path(&self) -> Option<&PathBuf> {
        self.file_path.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn state(&self) -> DestinationState {
        match self.state.load(Ordering::Acquire) {
            STATE_ACTIVE => DestinationState::Active,
            STATE_DRAINING => DestinationState::Draining,
            _ => DestinationState::Closed,
        }
    }

    pub(crate) fn begin_drain(&self) {
        let _ = self.state.compare_exchange(
            STATE_ACTIVE,
            STATE_DRAINING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Write one serialised record through the backend, tracking latency and
    /// byte counters. Draining destinations still accept writes (the
    /// dispatcher is flushing what was queued for them); closed ones do not.
    pub(crate) fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if self.state.load(Ordering::Acquire) == STATE_CLOSED {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "destination closed",
            ));
        }
        let started = Instant::now();
        let mut backend = self.backend.lock();
        let result = backend.write(buf);
        match result {
            Ok(n) => {
                let _ = backend.after_write();
                drop(backend);
                let elapsed_ns = started.elapsed().as_nanos() as u64;
                self.writes.fetch_add(1, Ordering::Relaxed);
                self.bytes.fetch_add(n as u64, Ordering::Relaxed);
                self.total_write_ns.fetch_add(elapsed_ns, Ordering::Relaxed);
                self.max_write_ns.fetch_max(elapsed_ns, Ordering::Relaxed);
                self.last_write_unix_ns.store(
                    Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64,
                    Ordering::Relaxed,
                );
                Ok(n)
            }
            Err(e) => {
                drop(backend);
                self.errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Force a rotation on file backends; used by disk-full recovery.
    pub(crate) fn force_rotate(&self) -> io::Result<bool> {
        self.backend.lock().force_rotate()
    }

    pub fn flush(&self) -> Result<()> {
        self.backend
            .lock()
            .flush()
            .map_err(|e| OmniError::BackendWrite(format!("{}: {}", self.uri, e)))
    }

    /// Flush plus reach durable storage (fsync for files).
    pub fn sync(&self) -> Result<()> {
        self.backend
            .lock()
            .sync()
            .map_err(|e| OmniError::BackendWrite(format!("{}: {}", self.uri, e)))
    }

    /// Idempotent: the first call closes the backend, later calls succeed
    /// without effect.
    pub fn close(&self) -> Result<()> {
        let previous = self.state.swap(STATE_CLOSED, Ordering::AcqRel);
        if previous == STATE_CLOSED {
            return Ok(());
        }
        self.backend
            .lock()
            .close()
            .map_err(|e| OmniError::BackendWrite(format!("{}: {}", self.uri, e)))
    }

    pub fn stats(&self) -> DestinationStats {
        let last_ns = self.last_write_unix_ns.load(Ordering::Relaxed);
        DestinationStats {
            writes: self.writes.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            total_write: Duration::from_nanos(self.total_write_ns.load(Ordering::Relaxed)),
            max_write: Duration::from_nanos(self.max_write_ns.load(Ordering::Relaxed)),
            last_write: if last_ns == 0 {
                None
            } else {
                Some(Utc.timestamp_nanos(last_ns as i64))
            },
        }
    }
}

/// Point-in-time per-destination counters.
#[derive(Debug, Clone)]
pub struct DestinationStats {
    pub writes: u64,
    pub bytes: u64,
    pub errors: u64,
    pub total_write: Duration,
    pub max_write: Duration,
    pub last_write: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendStats;

    struct StubBackend {
        written: Vec<u8>,
        fail: bool,
        closed: bool,
    }

    impl Backend for StubBackend {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "nope"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            self.closed = true;
            Ok(())
        }

        fn supports_atomic(&self) -> bool {
            false
        }

        fn kind(&self) -> BackendKind {
            BackendKind::Plugin
        }

        fn stats(&self) -> BackendStats {
            BackendStats::default()
        }
    }

    fn dest(fail: bool) -> Destination {
        Destination::new(
            "memory://x".into(),
            BackendKind::Plugin,
            Box::new(StubBackend {
                written: Vec::new(),
                fail,
                closed: false,
            }),
            None,
        )
    }

    #[test]
    fn test_write_updates_stats() {
        let d = dest(false);
        d.write(b"hello\n").unwrap();
        d.write(b"again\n").unwrap();
        let stats = d.stats();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.bytes, 12);
        assert_eq!(stats.errors, 0);
        assert!(stats.last_write.is_some());
        assert!(stats.total_write >= stats.max_write);
    }

    #[test]
    fn test_error_counted() {
        let d = dest(true);
        assert!(d.write(b"x").is_err());
        assert_eq!(d.stats().errors, 1);
        assert_eq!(d.stats().writes, 0);
    }

    #[test]
    fn test_state_machine() {
        let d = dest(false);
        assert_eq!(d.state(), DestinationState::Active);
        d.begin_drain();
        assert_eq!(d.state(), DestinationState::Draining);
        // Draining still accepts pending writes.
        assert!(d.write(b"pending\n").is_ok());
        d.close().unwrap();
        assert_eq!(d.state(), DestinationState::Closed);
        assert!(d.write(b"late\n").is_err());
        // close is idempotent
        d.close().unwrap();
    }

    #[test]
    fn test_enabled_toggle() {
        let d = dest(false);
        assert!(d.is_enabled());
        d.set_enabled(false);
        assert!(!d.is_enabled());
        d.set_enabled(true);
        assert!(d.is_enabled());
    }
}
