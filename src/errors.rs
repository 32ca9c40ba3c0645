//! Error taxonomy and the asynchronous error reporter.
//!
//! Synchronous failures (validation, `add_destination`, context-aware
//! timeouts) are returned to the caller as [`OmniError`]. Everything the
//! dispatcher side encounters is published as a [`LogError`] on a bounded
//! channel and handed to the configured handler, falling back to a one-line
//! stderr diagnostic when no handler is set.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Serialize;

use crate::metrics::Metrics;

/// Capacity of the bounded error channel; overflow drops the report.
const ERROR_CHANNEL_CAPACITY: usize = 100;

/// Errors surfaced synchronously by the public API.
#[derive(Debug)]
pub enum OmniError {
    /// The bounded message channel refused a message.
    QueueFull,
    /// A backend returned an I/O error.
    BackendWrite(String),
    /// ENOSPC or equivalent.
    DiskFull(String),
    /// Rotation rename/copy failed.
    RotationFailed(String),
    /// A compression worker failed to produce the artefact.
    CompressionFailed(String),
    /// Rejected at validation time.
    ConfigInvalid(String),
    /// Operation on a destination (or logger) already closed.
    DestinationClosed(String),
    /// `add_destination` with a URI that is already registered.
    DuplicateDestination(String),
    /// Propagated from a plugin backend.
    Plugin(String),
    /// Context-aware sync deadline exceeded.
    SyncTimeout,
    /// Context-aware close deadline exceeded; close continues in background.
    CloseTimeout,
    /// The caller's cancellation token fired.
    Cancelled,
}

impl fmt::Display for OmniError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OmniError::QueueFull => write!(f, "message channel is full"),
            OmniError::BackendWrite(details) => write!(f, "backend write failed: {}", details),
            OmniError::DiskFull(details) => write!(f, "disk full: {}", details),
            OmniError::RotationFailed(details) => write!(f, "rotation failed: {}", details),
            OmniError::CompressionFailed(details) => {
                write!(f, "compression failed: {}", details)
            }
            OmniError::ConfigInvalid(details) => write!(f, "invalid configuration: {}", details),
            OmniError::DestinationClosed(uri) => write!(f, "destination closed: {}", uri),
            OmniError::DuplicateDestination(uri) => {
                write!(f, "destination already registered: {}", uri)
            }
            OmniError::Plugin(details) => write!(f, "plugin error: {}", details),
            OmniError::SyncTimeout => write!(f, "sync deadline exceeded"),
            OmniError::CloseTimeout => write!(f, "close deadline exceeded"),
            OmniError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for OmniError {}

/// Convenient Result alias for Omni operations.
pub type Result<T> = std::result::Result<T, OmniError>;

/// How bad a reported failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Warn,
    High,
}

impl ErrorSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Warn => "warn",
            ErrorSeverity::High => "high",
        }
    }
}

/// A non-fatal failure published on the error channel. Serialisable so
/// consumers can ship error records as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct LogError {
    pub timestamp: DateTime<Utc>,
    /// Operation tag, e.g. "dispatch", "write", "rotate", "compress".
    pub operation: &'static str,
    /// Destination URI, or empty when not tied to one.
    pub destination: String,
    pub message: String,
    /// Description of the underlying error, if any.
    pub source: String,
    pub severity: ErrorSeverity,
    pub context: Option<BTreeMap<String, String>>,
}

impl LogError {
    pub(crate) fn new(
        operation: &'static str,
        destination: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<String>,
        severity: ErrorSeverity,
    ) -> Self {
        LogError {
            timestamp: Utc::now(),
            operation,
            destination: destination.into(),
            message: message.into(),
            source: source.into(),
            severity,
            context: None,
        }
    }
}

/// User callback invoked synchronously for every reported error.
pub type ErrorHandler = Arc<dyn Fn(&LogError) + Send + Sync>;

/// Publishes non-fatal failures to a bounded channel and the handler.
pub(crate) struct ErrorReporter {
    tx: Sender<LogError>,
    rx: Receiver<LogError>,
    handler: Option<ErrorHandler>,
    metrics: Arc<Metrics>,
}

impl ErrorReporter {
    pub(crate) fn new(handler: Option<ErrorHandler>, metrics: Arc<Metrics>) -> Self {
        let (tx, rx) = bounded(ERROR_CHANNEL_CAPACITY);
        ErrorReporter {
            tx,
            rx,
            handler,
            metrics,
        }
    }

    /// Consumer handle for the error channel.
    pub(crate) fn subscribe(&self) -> Receiver<LogError> {
        self.rx.clone()
    }

    /// Record and publish one failure. Never blocks: a full channel drops the
    /// report (the counter still moves).
    pub(crate) fn report(&self, err: LogError) {
        self.metrics.inc_error(err.operation);
        match &self.handler {
            Some(handler) => handler(&err),
            None => {
                eprintln!(
                    "omni: [{}] {} ({}): {} {}",
                    err.severity.as_str(),
                    err.operation,
                    if err.destination.is_empty() {
                        "-"
                    } else {
                        err.destination.as_str()
                    },
                    err.message,
                    err.source,
                );
            }
        }
        let _ = self.tx.try_send(err);
    }
}
