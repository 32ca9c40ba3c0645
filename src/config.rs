//! Logger configuration and validation.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::errors::{ErrorHandler, OmniError, Result};
use crate::format::Format;
use crate::levels::Level;
use crate::backend::plugin::PluginRegistry;
use crate::policy::SamplingStrategy;

/// Compression algorithm applied to rotated files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression (default)
    None,
    /// GZIP compression
    Gzip,
}

impl Compression {
    /// Parse from a string, case-insensitive: "gzip"/"gz" or "none".
    /// Unrecognised values default to `None`.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gzip" | "gz" => Compression::Gzip,
            _ => Compression::None,
        }
    }
}

/// Default capacity of the bounded message channel.
pub const DEFAULT_CHANNEL_SIZE: usize = 100;
/// Default rotation size trigger.
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;
/// Default file writer buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;
/// Default compression worker pool size.
pub const DEFAULT_COMPRESSION_WORKERS: usize = 2;
/// Floor applied to `cleanup_interval`.
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
/// Default timestamp directive: ISO-8601 with nanoseconds.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9f%:z";

/// Everything the logger accepts at construction time.
///
/// Runtime-tunable pieces (level, format, filters) can also be changed later
/// through the logger; the rest is fixed for the logger's lifetime.
#[derive(Clone)]
pub struct Config {
    /// Primary file destination URI; the logger may start with none.
    pub path: Option<String>,
    pub level: Level,
    pub format: Format,
    /// Bounded channel capacity.
    pub channel_size: usize,
    /// Rotation size trigger in bytes.
    pub max_size: u64,
    /// Rotated-file retention count; 0 disables count-based retention.
    pub max_files: usize,
    /// Rotated-file retention age; zero disables age-based rotation/retention.
    pub max_age: Duration,
    /// Cleanup ticker interval; values below one minute are raised to it.
    pub cleanup_interval: Duration,
    pub compression: Compression,
    pub compression_workers: usize,
    /// Rotated files younger than this are not compressed yet.
    pub compression_min_age: Duration,
    /// Capture a stack trace at ERROR (or at every level with `capture_all`).
    pub include_trace: bool,
    pub capture_all: bool,
    /// Maximum stack frames to keep.
    pub stack_size: usize,
    pub sampling_strategy: SamplingStrategy,
    /// Acceptance rate in `[0, 1]` for the random/interval/consistent strategies.
    pub sampling_rate: f64,
    /// Field whose value keys the consistent sampler; defaults to the message.
    pub sampling_key: Option<String>,
    pub redaction_patterns: Vec<String>,
    pub redaction_replace: String,
    /// Also apply redaction to field map keys.
    pub redact_keys: bool,
    pub include_hostname: bool,
    pub include_process: bool,
    pub include_runtime: bool,
    pub timestamp_format: String,
    /// Emit these field keys first in JSON output; remaining keys follow
    /// alphabetically.
    pub json_field_order: Option<Vec<String>>,
    /// Called synchronously for every reported error; `None` falls back to a
    /// one-line stderr diagnostic.
    pub error_handler: Option<ErrorHandler>,
    /// Registry consulted for unknown URI schemes.
    pub plugins: Option<Arc<PluginRegistry>>,
    /// File writer buffer size.
    pub buffer_size: usize,
    /// Transient write errors are retried this many times.
    pub max_retries: u32,
    /// First retry backoff; doubles per attempt.
    pub retry_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path: None,
            level: Level::Info,
            format: Format::Text,
            channel_size: DEFAULT_CHANNEL_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            max_files: 0,
            max_age: Duration::ZERO,
            cleanup_interval: MIN_CLEANUP_INTERVAL,
            compression: Compression::None,
            compression_workers: DEFAULT_COMPRESSION_WORKERS,
            compression_min_age: Duration::ZERO,
            include_trace: false,
            capture_all: false,
            stack_size: 32,
            sampling_strategy: SamplingStrategy::None,
            sampling_rate: 1.0,
            sampling_key: None,
            redaction_patterns: Vec::new(),
            redaction_replace: "[REDACTED]".to_string(),
            redact_keys: false,
            include_hostname: false,
            include_process: false,
            include_runtime: false,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            json_field_order: None,
            error_handler: None,
            plugins: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_channel_size(mut self, size: usize) -> Self {
        self.channel_size = size;
        self
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    /// Set the rotation size trigger from a human string like "10MB".
    pub fn with_max_size_str(mut self, size: &str) -> Result<Self> {
        self.max_size = parse_size(size)
            .ok_or_else(|| OmniError::ConfigInvalid(format!("invalid size limit: '{}'", size)))?;
        Ok(self)
    }

    pub fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = age;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_sampling(mut self, strategy: SamplingStrategy, rate: f64) -> Self {
        self.sampling_strategy = strategy;
        self.sampling_rate = rate;
        self
    }

    pub fn with_redaction(mut self, patterns: Vec<String>, replace: impl Into<String>) -> Self {
        self.redaction_patterns = patterns;
        self.redaction_replace = replace.into();
        self
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn with_plugins(mut self, plugins: Arc<PluginRegistry>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    /// The cleanup interval with the one-minute floor applied.
    pub(crate) fn effective_cleanup_interval(&self) -> Duration {
        self.cleanup_interval.max(MIN_CLEANUP_INTERVAL)
    }

    /// Reject configurations the pipeline cannot run with. Called by the
    /// logger constructor; surfaced synchronously.
    pub fn validate(&self) -> Result<()> {
        if self.channel_size == 0 {
            return Err(OmniError::ConfigInvalid(
                "channel_size must be at least 1".into(),
            ));
        }
        if self.max_size == 0 {
            return Err(OmniError::ConfigInvalid("max_size must be positive".into()));
        }
        if self.compression_workers == 0 {
            return Err(OmniError::ConfigInvalid(
                "compression_workers must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sampling_rate) {
            return Err(OmniError::ConfigInvalid(format!(
                "sampling_rate must be within [0, 1], got {}",
                self.sampling_rate
            )));
        }
        if self.include_trace && self.stack_size == 0 {
            return Err(OmniError::ConfigInvalid(
                "stack_size must be positive when include_trace is set".into(),
            ));
        }
        if self.timestamp_format.is_empty() {
            return Err(OmniError::ConfigInvalid(
                "timestamp_format must not be empty".into(),
            ));
        }
        if !crate::format::timestamp_directive_valid(&self.timestamp_format) {
            return Err(OmniError::ConfigInvalid(format!(
                "timestamp_format '{}' is not a valid directive",
                self.timestamp_format
            )));
        }
        if self.buffer_size == 0 {
            return Err(OmniError::ConfigInvalid(
                "buffer_size must be positive".into(),
            ));
        }
        for pattern in &self.redaction_patterns {
            Regex::new(pattern).map_err(|e| {
                OmniError::ConfigInvalid(format!("invalid redaction pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }
}

/// Parse size strings like "500B", "5KB", "10MB", "1GB" into bytes.
/// A bare number is taken as bytes. Case-insensitive, short units accepted.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut num_end = 0;
    for (i, c) in s.chars().enumerate() {
        if !c.is_ascii_digit() {
            break;
        }
        num_end = i + 1;
    }
    if num_end == 0 {
        return None;
    }

    let num_str = &s[..num_end];
    let unit = s[num_end..].trim().to_uppercase();

    let multiplier = match unit.as_str() {
        "B" | "" => 1,
        "KB" | "K" => 1024,
        "MB" | "M" => 1024 * 1024,
        "GB" | "G" => 1024 * 1024 * 1024,
        _ => return None,
    };

    num_str.parse::<u64>().ok().map(|n| n * multiplier)
}
