//! # Omni: high-throughput structured logging
//!
//! Omni is an embedded logging pipeline for long-running server processes:
//! many concurrent producers enqueue records on a bounded channel without
//! ever blocking on I/O, and a single dispatcher thread fans each record out
//! to every enabled destination (files, syslog, or pluggable sinks), applying
//! rotation, compression, redaction, filtering and sampling policy along the
//! way.
//!
//! ## Architecture
//!
//! The crate is organized into focused modules:
//! - `logger`: producer entry points, destination lifecycle, shutdown
//! - `dispatch`: the single channel consumer and per-destination fan-out
//! - `backend`: file, syslog and plugin byte sinks
//! - `rotation` / `compression`: file turnover and the gzip worker pool
//! - `policy`: redaction, filter chain, sampling
//! - `format`: text and JSON line serialisation
//! - `metrics` / `errors`: atomic counters and the bounded error channel
//!
//! ## Delivery contract
//!
//! At-most-once per message with explicit drop accounting: every record is
//! either written to each enabled destination exactly once or counted in
//! `messages_dropped` with its reason. The in-memory queue is volatile.
//!
//! ## Example
//!
//! ```no_run
//! use omni::{Config, Logger};
//!
//! let logger = Logger::new(Config::new().with_path("/var/log/app.log"))?;
//! logger.info("service started");
//! logger.sync()?;
//! logger.close()?;
//! # Ok::<(), omni::OmniError>(())
//! ```

mod backend;
mod compression;
mod config;
mod destination;
mod dispatch;
mod entry;
mod errors;
mod format;
mod levels;
mod logger;
mod message;
mod metrics;
mod policy;
mod recovery;
mod rotation;
mod uri;

#[cfg(test)]
mod tests;

pub use backend::plugin::{Plugin, PluginFactory, PluginRegistry, global_registry};
pub use backend::syslog::{DEFAULT_PRIORITY, DEFAULT_TAG, MAX_PRIORITY, SyslogBackend};
pub use backend::{Backend, BackendKind, BackendStats};
pub use config::{Compression, Config, parse_size};
pub use destination::{Destination, DestinationState, DestinationStats};
pub use entry::{
    CIRCULAR_SENTINEL, DEPTH_SENTINEL, FieldValue, Fields, LogEntry, MAX_FIELD_DEPTH, SharedFields,
};
pub use errors::{ErrorHandler, ErrorSeverity, LogError, OmniError, Result};
pub use format::Format;
pub use levels::{LEVELS, Level};
pub use logger::{CancelToken, Logger};
pub use metrics::{DropReason, MetricsSnapshot};
pub use policy::{FilterFn, Redactor, SamplingStrategy};
pub use uri::{ParsedUri, SYSLOG_DEFAULT_PORT, parse as parse_uri};
