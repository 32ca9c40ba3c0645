//! Queued compression of rotated files on a bounded worker pool.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ahash::AHashSet;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use flate2::Compression as GzLevel;
use flate2::write::GzEncoder;
use parking_lot::Mutex;

/// Suffix appended to compressed artefacts.
pub(crate) const COMPRESSED_SUFFIX: &str = ".gz";

/// Invoked from a worker after each attempt: the source path and either the
/// compressed artefact size or the failure.
pub(crate) type CompressionCallback = Arc<dyn Fn(&Path, io::Result<u64>) + Send + Sync>;

/// Owns the bounded queue and worker pool. Files queued here are protected
/// from retention until the worker is done with them.
pub(crate) struct CompressionManager {
    tx: Option<Sender<PathBuf>>,
    stop_tx: Sender<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<Mutex<AHashSet<PathBuf>>>,
}

impl CompressionManager {
    /// Start `worker_count` workers. `min_age` defers compression of files
    /// younger than it (the cleanup ticker re-offers them later).
    pub(crate) fn start(
        worker_count: usize,
        queue_capacity: usize,
        min_age: Duration,
        on_done: CompressionCallback,
    ) -> CompressionManager {
        let (tx, rx) = bounded::<PathBuf>(queue_capacity);
        let (stop_tx, stop_rx) = bounded::<()>(worker_count);
        let in_flight: Arc<Mutex<AHashSet<PathBuf>>> = Arc::new(Mutex::new(AHashSet::new()));

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let rx = rx.clone();
            let stop_rx = stop_rx.clone();
            let in_flight = in_flight.clone();
            let on_done = on_done.clone();
            let handle = thread::Builder::new()
                .name(format!("omni-compress-{i}"))
                .spawn(move || worker_loop(rx, stop_rx, in_flight, min_age, on_done))
                .expect("failed to spawn compression worker");
            workers.push(handle);
        }

        CompressionManager {
            tx: Some(tx),
            stop_tx,
            workers: Mutex::new(workers),
            in_flight,
        }
    }

    /// A manager that accepts nothing; used when compression is off.
    pub(crate) fn disabled() -> CompressionManager {
        let (stop_tx, _stop_rx) = bounded(1);
        CompressionManager {
            tx: None,
            stop_tx,
            workers: Mutex::new(Vec::new()),
            in_flight: Arc::new(Mutex::new(AHashSet::new())),
        }
    }

    /// Offer a rotated file for compression. Returns false when the manager
    /// is disabled, the queue is full, or the path is already queued.
    pub(crate) fn enqueue(&self, path: PathBuf) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(path.clone()) {
                return false;
            }
        }
        if tx.try_send(path.clone()).is_err() {
            self.in_flight.lock().remove(&path);
            return false;
        }
        true
    }

    /// Whether retention must leave this file alone.
    pub(crate) fn is_in_flight(&self, path: &Path) -> bool {
        self.in_flight.lock().contains(path)
    }

    /// Stop the pool. Workers finish the item they are on, then exit;
    /// whatever is still queued is abandoned (the queue is volatile).
    pub(crate) fn shutdown(&self) {
        let mut workers = self.workers.lock();
        for _ in workers.iter() {
            let _ = self.stop_tx.try_send(());
        }
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    rx: Receiver<PathBuf>,
    stop_rx: Receiver<()>,
    in_flight: Arc<Mutex<AHashSet<PathBuf>>>,
    min_age: Duration,
    on_done: CompressionCallback,
) {
    loop {
        if stop_rx.try_recv().is_ok() {
            break;
        }
        select! {
            recv(stop_rx) -> _ => break,
            recv(rx) -> msg => {
                let Ok(path) = msg else { break };
                if !min_age.is_zero() && !old_enough(&path, min_age) {
                    // Too fresh; the cleanup ticker re-offers it later.
                    in_flight.lock().remove(&path);
                    continue;
                }
                let result = compress_file(&path);
                in_flight.lock().remove(&path);
                on_done(&path, result);
            }
        }
    }
}

fn old_enough(path: &Path, min_age: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| mtime.elapsed().ok())
        .map(|age| age >= min_age)
        .unwrap_or(true)
}

/// Gzip `path` into `<path>.gz`, fsync the artefact, remove the original.
/// Returns the compressed size.
pub(crate) fn compress_file(path: &Path) -> io::Result<u64> {
    let target = compressed_path(path);
    let source = File::open(path)?;
    let mut reader = BufReader::new(source);

    let out = File::create(&target)?;
    let mut encoder = GzEncoder::new(BufWriter::new(out), GzLevel::default());
    io::copy(&mut reader, &mut encoder)?;
    let writer = encoder.finish()?;
    let out = writer
        .into_inner()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    out.sync_all()?;

    let size = fs::metadata(&target)?.len();
    fs::remove_file(path)?;
    Ok(size)
}

pub(crate) fn compressed_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}{}", path.display(), COMPRESSED_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::{Read, Write};
    use std::time::Instant;

    #[test]
    fn test_compress_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log.20260301-100000.000");
        let payload = "line one\nline two\n".repeat(100);
        File::create(&path)
            .unwrap()
            .write_all(payload.as_bytes())
            .unwrap();

        let size = compress_file(&path).unwrap();
        assert!(size > 0);
        assert!(!path.exists(), "original removed after compression");

        let gz = compressed_path(&path);
        assert!(gz.exists());
        let mut decoder = GzDecoder::new(File::open(&gz).unwrap());
        let mut restored = String::new();
        decoder.read_to_string(&mut restored).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn test_manager_compresses_queued_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log.20260301-100001.000");
        File::create(&path).unwrap().write_all(b"data\n").unwrap();

        let manager = CompressionManager::start(
            2,
            16,
            Duration::ZERO,
            {
                let cb: CompressionCallback = Arc::new(|_path, result| {
                    assert!(result.is_ok());
                });
                cb
            },
        );
        assert!(manager.enqueue(path.clone()));

        let deadline = Instant::now() + Duration::from_secs(5);
        while path.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!path.exists());
        assert!(compressed_path(&path).exists());
        manager.shutdown();
    }

    #[test]
    fn test_enqueue_deduplicates() {
        let noop: CompressionCallback = Arc::new(|_, _| {});
        let manager = CompressionManager::start(1, 4, Duration::from_secs(3600), noop);
        let path = PathBuf::from("/nonexistent/whatever.log.20260301-100000.000");
        assert!(manager.enqueue(path.clone()));
        assert!(!manager.enqueue(path.clone()), "already in flight");
        manager.shutdown();
    }

    #[test]
    fn test_disabled_manager_refuses() {
        let manager = CompressionManager::disabled();
        assert!(!manager.enqueue(PathBuf::from("/tmp/x.log")));
        assert!(!manager.is_in_flight(Path::new("/tmp/x.log")));
        manager.shutdown();
    }

    #[test]
    fn test_min_age_defers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.log.20260301-100000.000");
        File::create(&path).unwrap().write_all(b"x\n").unwrap();

        let manager = CompressionManager::start(
            1,
            4,
            Duration::from_secs(3600),
            {
                let cb: CompressionCallback = Arc::new(|_, _| panic!("fresh file must not be compressed"));
                cb
            },
        );
        assert!(manager.enqueue(path.clone()));

        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.is_in_flight(&path) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(path.exists(), "file deferred, not compressed");
        assert!(!compressed_path(&path).exists());
        manager.shutdown();
    }
}
