//! Write-error categorisation and bounded retry.

use std::io;
use std::thread;
use std::time::Duration;

use crate::backend::BackendKind;
use crate::destination::Destination;

/// What a failed write means for the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorClass {
    /// Worth retrying with backoff.
    Transient,
    /// ENOSPC or equivalent; rotation may free space.
    DiskFull,
    /// Retrying will not help.
    Permanent,
}

pub(crate) fn classify(err: &io::Error) -> ErrorClass {
    if err.kind() == io::ErrorKind::StorageFull || err.raw_os_error() == Some(28) {
        return ErrorClass::DiskFull;
    }
    match err.kind() {
        io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

/// Retry budget for transient failures. Runs on the dispatcher thread, so
/// backoff sleeps stall the pipeline deliberately rather than dropping.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecoveryPolicy {
    pub(crate) max_retries: u32,
    pub(crate) backoff: Duration,
}

impl RecoveryPolicy {
    /// Try to complete a write that just failed. Returns the final outcome
    /// and the class the original error was given.
    pub(crate) fn recover(
        &self,
        dest: &Destination,
        buf: &[u8],
        err: io::Error,
    ) -> (io::Result<usize>, ErrorClass) {
        let class = classify(&err);
        match class {
            ErrorClass::Transient => {
                let mut last = err;
                for attempt in 0..self.max_retries {
                    thread::sleep(self.backoff * 2u32.pow(attempt));
                    match dest.write(buf) {
                        Ok(n) => return (Ok(n), class),
                        Err(e) => last = e,
                    }
                }
                (Err(last), class)
            }
            ErrorClass::DiskFull => {
                // Rotation applies retention, which may free space.
                if dest.kind() == BackendKind::File {
                    let _ = dest.force_rotate();
                }
                (dest.write(buf), class)
            }
            ErrorClass::Permanent => (Err(err), class),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, BackendStats};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_classify() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "x");
        assert_eq!(classify(&reset), ErrorClass::Transient);

        let enospc = io::Error::from_raw_os_error(28);
        assert_eq!(classify(&enospc), ErrorClass::DiskFull);

        let bad_fd = io::Error::new(io::ErrorKind::InvalidInput, "x");
        assert_eq!(classify(&bad_fd), ErrorClass::Permanent);
    }

    struct FlakyBackend {
        failures_left: Arc<AtomicU32>,
        writes: Arc<AtomicU32>,
    }

    impl Backend for FlakyBackend {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "flaky"));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn supports_atomic(&self) -> bool {
            false
        }

        fn kind(&self) -> crate::backend::BackendKind {
            crate::backend::BackendKind::Plugin
        }

        fn stats(&self) -> BackendStats {
            BackendStats::default()
        }
    }

    fn flaky_destination(failures: u32) -> (Destination, Arc<AtomicU32>) {
        let writes = Arc::new(AtomicU32::new(0));
        let dest = Destination::new(
            "memory://flaky".into(),
            crate::backend::BackendKind::Plugin,
            Box::new(FlakyBackend {
                failures_left: Arc::new(AtomicU32::new(failures)),
                writes: writes.clone(),
            }),
            None,
        );
        (dest, writes)
    }

    #[test]
    fn test_transient_recovers_within_budget() {
        let policy = RecoveryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(1),
        };
        let (dest, writes) = flaky_destination(2);
        let err = dest.write(b"x").unwrap_err();
        let (result, class) = policy.recover(&dest, b"x", err);
        assert!(result.is_ok());
        assert_eq!(class, ErrorClass::Transient);
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_exhausts_budget() {
        let policy = RecoveryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(1),
        };
        let (dest, writes) = flaky_destination(10);
        let err = dest.write(b"x").unwrap_err();
        let (result, class) = policy.recover(&dest, b"x", err);
        assert!(result.is_err());
        assert_eq!(class, ErrorClass::Transient);
        assert_eq!(writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_permanent_not_retried() {
        let policy = RecoveryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(1),
        };
        let (dest, writes) = flaky_destination(0);
        let err = io::Error::new(io::ErrorKind::InvalidInput, "bad fd");
        let (result, class) = policy.recover(&dest, b"x", err);
        assert!(result.is_err());
        assert_eq!(class, ErrorClass::Permanent);
        assert_eq!(writes.load(Ordering::SeqCst), 0);
    }
}
