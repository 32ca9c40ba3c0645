//! The logger: producer entry points, destination lifecycle, shutdown.
//!
//! Producer calls never touch the disk or the network. They run the
//! predicate pipeline (level, filters, sampler), redact, build a record, and
//! try a non-blocking enqueue; everything else happens on the dispatcher
//! thread. `sync` is the only blocking producer API.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use chrono::Utc;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};
use parking_lot::{Mutex, RwLock};

use crate::backend::BackendKind;
use crate::backend::file::{FileBackend, FileHooks, FileOptions};
use crate::backend::plugin::{PluginBackend, PluginRegistry};
use crate::backend::syslog::{DEFAULT_PRIORITY, DEFAULT_TAG, SyslogBackend};
use crate::compression::CompressionManager;
use crate::config::{Compression, Config};
use crate::destination::Destination;
use crate::dispatch::{self, DestinationMap, DispatcherContext, FormatSettings};
use crate::entry::{FieldValue, Fields, LogEntry, sanitize_fields};
use crate::errors::{ErrorReporter, ErrorSeverity, LogError, OmniError, Result};
use crate::format::{Format, FormatOptions};
use crate::levels::Level;
use crate::message::{LogMessage, SyncToken};
use crate::metrics::{DropReason, Metrics, MetricsSnapshot};
use crate::policy::{FilterChain, Redactor, Sampler};
use crate::recovery::RecoveryPolicy;
use crate::rotation;
use crate::uri::{self, ParsedUri};

/// How long the context-aware log variant waits for channel space.
const ENQUEUE_WAIT: Duration = Duration::from_millis(10);
/// Capacity of the rotated-file compression queue.
const COMPRESSION_QUEUE_CAPACITY: usize = 64;

/// Cooperative cancellation for the context-aware entry points.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Redaction, filtering and sampling settings, read on the producer path.
struct PolicySettings {
    redactor: Option<Redactor>,
    sampler: Sampler,
    filters: FilterChain,
}

struct Core {
    closed: AtomicBool,
    /// Threshold as a level index, for the branch-only fast path.
    level: AtomicU8,
    tx: Sender<LogMessage>,
    channel_capacity: usize,
    destinations: DestinationMap,
    format_settings: Arc<RwLock<FormatSettings>>,
    policy: RwLock<PolicySettings>,
    metrics: Arc<Metrics>,
    reporter: Arc<ErrorReporter>,
    compression: Arc<CompressionManager>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    done_rx: Receiver<()>,
    cleanup: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
    plugins: Arc<PluginRegistry>,
    config: Config,
    /// Static metadata fields (hostname, process, pid).
    meta: Fields,
}

/// The embedded logging pipeline. Cheap to clone; all clones share one
/// dispatcher and destination set.
#[derive(Clone)]
pub struct Logger {
    core: Arc<Core>,
}

impl Logger {
    /// Validate the configuration, start the dispatcher (and workers), and
    /// open the primary file destination when `path` is set.
    pub fn new(config: Config) -> Result<Logger> {
        config.validate()?;

        let metrics = Arc::new(Metrics::default());
        let reporter = Arc::new(ErrorReporter::new(config.error_handler.clone(), metrics.clone()));

        let redactor = if config.redaction_patterns.is_empty() {
            None
        } else {
            Some(Redactor::new(
                &config.redaction_patterns,
                &config.redaction_replace,
                config.redact_keys,
            )?)
        };
        let sampler = Sampler::new(
            config.sampling_strategy,
            config.sampling_rate,
            config.sampling_key.clone(),
        );

        let compression = match config.compression {
            Compression::Gzip => {
                let metrics = metrics.clone();
                let reporter = reporter.clone();
                Arc::new(CompressionManager::start(
                    config.compression_workers,
                    COMPRESSION_QUEUE_CAPACITY,
                    config.compression_min_age,
                    Arc::new(
                        move |path: &std::path::Path, result: std::io::Result<u64>| match result {
                            Ok(_) => metrics.inc_compression(),
                            Err(e) => reporter.report(LogError::new(
                                "compress",
                                path.display().to_string(),
                                "failed to compress rotated file",
                                e.to_string(),
                                ErrorSeverity::Warn,
                            )),
                        },
                    ),
                ))
            }
            Compression::None => Arc::new(CompressionManager::disabled()),
        };

        let destinations: DestinationMap = Arc::new(RwLock::new(AHashMap::new()));
        let format_settings = Arc::new(RwLock::new(FormatSettings {
            format: config.format,
            options: Arc::new(FormatOptions {
                timestamp_format: config.timestamp_format.clone(),
                json_field_order: config.json_field_order.clone(),
            }),
        }));

        let (tx, rx) = bounded(config.channel_size);
        let (done_tx, done_rx) = bounded(1);
        let dispatcher = dispatch::spawn(
            rx,
            DispatcherContext {
                destinations: destinations.clone(),
                settings: format_settings.clone(),
                metrics: metrics.clone(),
                reporter: reporter.clone(),
                recovery: RecoveryPolicy {
                    max_retries: config.max_retries,
                    backoff: config.retry_backoff,
                },
                done: done_tx,
            },
        );

        let cleanup = spawn_cleanup_if_needed(
            &config,
            destinations.clone(),
            compression.clone(),
            reporter.clone(),
        );

        let core = Core {
            closed: AtomicBool::new(false),
            level: AtomicU8::new(config.level.index() as u8),
            tx,
            channel_capacity: config.channel_size,
            destinations,
            format_settings,
            policy: RwLock::new(PolicySettings {
                redactor,
                sampler,
                filters: FilterChain::default(),
            }),
            metrics,
            reporter,
            compression,
            dispatcher: Mutex::new(Some(dispatcher)),
            done_rx,
            cleanup: Mutex::new(cleanup),
            plugins: config.plugins.clone().unwrap_or_default(),
            meta: static_meta_fields(&config),
            config,
        };

        let logger = Logger { core: Arc::new(core) };
        if let Some(path) = logger.core.config.path.clone() {
            if let Err(e) = logger.add_destination(&path) {
                let _ = logger.close();
                return Err(e);
            }
        }
        Ok(logger)
    }

    // ---- producer entry points ------------------------------------------

    pub fn trace(&self, msg: &str) {
        self.log(Level::Trace, msg);
    }

    pub fn debug(&self, msg: &str) {
        self.log(Level::Debug, msg);
    }

    pub fn info(&self, msg: &str) {
        self.log(Level::Info, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.log(Level::Warn, msg);
    }

    pub fn error(&self, msg: &str) {
        self.log(Level::Error, msg);
    }

    /// Fire-and-forget: rejections and overflow are accounted in metrics and
    /// the error channel, never returned.
    pub fn log(&self, level: Level, msg: &str) {
        if let Some(entry) = self.prepare(level, msg, None, None) {
            self.enqueue(entry);
        }
    }

    /// Structured record with a field mapping. Fields are sanitised (shared
    /// nodes resolved, cycles and over-deep values replaced with sentinels)
    /// before enqueue.
    pub fn log_structured(&self, level: Level, msg: &str, fields: Fields) {
        if let Some(entry) = self.prepare(level, msg, Some(fields), None) {
            self.enqueue(entry);
        }
    }

    /// Like [`log_structured`](Self::log_structured) with a captured call site.
    pub fn log_with_caller(
        &self,
        level: Level,
        msg: &str,
        fields: Option<Fields>,
        file: &str,
        line: u32,
    ) {
        if let Some(entry) = self.prepare(level, msg, fields, Some((file.to_string(), line))) {
            self.enqueue(entry);
        }
    }

    /// Context-aware variant: waits up to 10 ms for channel space, then
    /// fails with `queue_full`; a fired token fails with `cancelled`.
    pub fn log_with_token(
        &self,
        level: Level,
        msg: &str,
        fields: Option<Fields>,
        token: &CancelToken,
    ) -> Result<()> {
        if token.is_cancelled() {
            return Err(OmniError::Cancelled);
        }
        let Some(entry) = self.prepare(level, msg, fields, None) else {
            return Ok(());
        };
        match self
            .core
            .tx
            .send_timeout(LogMessage::Record(entry), ENQUEUE_WAIT)
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                if token.is_cancelled() {
                    return Err(OmniError::Cancelled);
                }
                self.core.metrics.inc_dropped(DropReason::QueueFull);
                Err(OmniError::QueueFull)
            }
            // Disconnected means the dispatcher already tore down: the logger
            // is closed, and the call is treated like the closed fast path
            // (return immediately, no counters).
            Err(SendTimeoutError::Disconnected(_)) => Ok(()),
        }
    }

    /// Run the synchronous predicate pipeline and build the record. `None`
    /// means the message was rejected (already accounted).
    fn prepare(
        &self,
        level: Level,
        msg: &str,
        fields: Option<Fields>,
        call_site: Option<(String, u32)>,
    ) -> Option<Box<LogEntry>> {
        if self.core.closed.load(Ordering::Acquire) {
            return None;
        }
        if (level.index() as u8) < self.core.level.load(Ordering::Relaxed) {
            self.core.metrics.inc_below_level();
            return None;
        }

        let policy = self.core.policy.read();
        if !policy.filters.is_empty() && !policy.filters.accepts(level, msg, fields.as_ref()) {
            self.core.metrics.inc_dropped(DropReason::Filtered);
            return None;
        }
        if !policy.sampler.accept(msg, fields.as_ref()) {
            self.core.metrics.inc_dropped(DropReason::Sampled);
            return None;
        }

        let mut message = msg.to_string();
        let mut fields = fields.map(|f| sanitize_fields(&f));
        if let Some(redactor) = &policy.redactor {
            message = redactor.redact_text(&message);
            if let Some(fields) = fields.as_mut() {
                redactor.redact_fields(fields);
            }
        }
        drop(policy);

        self.augment_fields(&mut fields);

        let mut entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message,
            fields,
            file: None,
            line: None,
            stack_trace: None,
        };
        if let Some((file, line)) = call_site {
            entry.file = Some(file);
            entry.line = Some(line);
        }
        let cfg = &self.core.config;
        if cfg.include_trace && (cfg.capture_all || level == Level::Error) {
            entry.stack_trace = Some(capture_stack(cfg.stack_size));
        }
        Some(Box::new(entry))
    }

    fn enqueue(&self, entry: Box<LogEntry>) {
        match self.core.tx.try_send(LogMessage::Record(entry)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.core.metrics.inc_dropped(DropReason::QueueFull);
                self.core.reporter.report(LogError::new(
                    "dispatch",
                    "",
                    "message channel full, record dropped",
                    "",
                    ErrorSeverity::Warn,
                ));
            }
            // Disconnected means the dispatcher already tore down: the logger
            // is closed, and the call is treated like the closed fast path
            // (return immediately, no counters).
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn augment_fields(&self, fields: &mut Option<Fields>) {
        let cfg = &self.core.config;
        if !cfg.include_hostname && !cfg.include_process && !cfg.include_runtime {
            return;
        }
        let map = fields.get_or_insert_with(Fields::new);
        for (key, value) in &self.core.meta {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
        if cfg.include_runtime {
            let current = std::thread::current();
            let name = current
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{:?}", current.id()));
            map.entry("thread".to_string())
                .or_insert(FieldValue::Str(name));
        }
    }

    // ---- destination lifecycle ------------------------------------------

    /// Register an output path. The backend kind is inferred from the URI
    /// scheme; a duplicate URI is rejected with a distinct error.
    pub fn add_destination(&self, uri: &str) -> Result<()> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(OmniError::DestinationClosed(uri.to_string()));
        }
        if self.core.destinations.read().contains_key(uri) {
            return Err(OmniError::DuplicateDestination(uri.to_string()));
        }
        let parsed = uri::parse(uri)?;
        let dest = self.build_destination(uri, parsed)?;

        let mut map = self.core.destinations.write();
        if map.contains_key(uri) {
            let _ = dest.close();
            return Err(OmniError::DuplicateDestination(uri.to_string()));
        }
        map.insert(uri.to_string(), Arc::new(dest));
        Ok(())
    }

    /// Drain pending messages to the destination, then close and drop it.
    pub fn remove_destination(&self, uri: &str) -> Result<()> {
        {
            let map = self.core.destinations.read();
            let dest = map.get(uri).ok_or_else(|| {
                OmniError::ConfigInvalid(format!("no destination registered for '{}'", uri))
            })?;
            dest.begin_drain();
        }
        // Everything enqueued before this point still reaches it.
        self.barrier();

        let dest = self
            .core
            .destinations
            .write()
            .remove(uri)
            .ok_or_else(|| {
                OmniError::ConfigInvalid(format!("no destination registered for '{}'", uri))
            })?;
        dest.flush()?;
        dest.close()
    }

    /// Look up a live destination by URI.
    pub fn destination(&self, uri: &str) -> Option<Arc<Destination>> {
        self.core.destinations.read().get(uri).cloned()
    }

    /// URIs of all registered destinations.
    pub fn destinations(&self) -> Vec<String> {
        self.core.destinations.read().keys().cloned().collect()
    }

    fn build_destination(&self, uri: &str, parsed: ParsedUri) -> Result<Destination> {
        match parsed {
            ParsedUri::File { path } => self.build_file_destination(uri, path),
            ParsedUri::SyslogTcp {
                host,
                port,
                user,
                tag,
            } => {
                let tag = tag.or(user).unwrap_or_else(|| DEFAULT_TAG.to_string());
                let backend = SyslogBackend::tcp(&host, port, &tag, DEFAULT_PRIORITY)?;
                Ok(Destination::new(
                    uri.to_string(),
                    BackendKind::Syslog,
                    Box::new(backend),
                    None,
                ))
            }
            ParsedUri::SyslogUnix { path } => {
                #[cfg(unix)]
                {
                    let backend = SyslogBackend::unix(&path, DEFAULT_TAG, DEFAULT_PRIORITY)?;
                    Ok(Destination::new(
                        uri.to_string(),
                        BackendKind::Syslog,
                        Box::new(backend),
                        None,
                    ))
                }
                #[cfg(not(unix))]
                {
                    let _ = path;
                    Err(OmniError::ConfigInvalid(
                        "unix socket syslog requires a unix platform".into(),
                    ))
                }
            }
            ParsedUri::Plugin { scheme, .. } => {
                let plugin = self.core.plugins.create(&scheme, uri)?;
                Ok(Destination::new(
                    uri.to_string(),
                    BackendKind::Plugin,
                    Box::new(PluginBackend::new(plugin)),
                    None,
                ))
            }
        }
    }

    fn build_file_destination(&self, uri: &str, path: PathBuf) -> Result<Destination> {
        let cfg = &self.core.config;
        let opts = FileOptions {
            buffer_size: cfg.buffer_size,
            max_size: cfg.max_size,
            max_age: cfg.max_age,
        };

        let on_rotated: Box<dyn Fn(PathBuf) + Send> = {
            let compression = self.core.compression.clone();
            let metrics = self.core.metrics.clone();
            let reporter = self.core.reporter.clone();
            let base = path.clone();
            let max_files = cfg.max_files;
            let gzip = cfg.compression == Compression::Gzip;
            Box::new(move |rotated: PathBuf| {
                if gzip && !compression.enqueue(rotated.clone()) {
                    reporter.report(LogError::new(
                        "compress",
                        rotated.display().to_string(),
                        "compression queue refused rotated file",
                        "",
                        ErrorSeverity::Low,
                    ));
                }
                let skip = |p: &std::path::Path| compression.is_in_flight(p);
                if let Err(e) = rotation::apply_count_retention(&base, max_files, &skip) {
                    reporter.report(LogError::new(
                        "retention",
                        base.display().to_string(),
                        "failed to prune rotated files",
                        e.to_string(),
                        ErrorSeverity::Warn,
                    ));
                }
                metrics.inc_rotation();
            })
        };
        let report: Box<dyn Fn(LogError) + Send> = {
            let reporter = self.core.reporter.clone();
            Box::new(move |err| reporter.report(err))
        };

        let backend = FileBackend::create(
            path.clone(),
            opts,
            FileHooks { on_rotated, report },
        )
        .map_err(|e| OmniError::BackendWrite(format!("open {}: {}", path.display(), e)))?;

        Ok(Destination::new(
            uri.to_string(),
            BackendKind::File,
            Box::new(backend),
            Some(path),
        ))
    }

    // ---- barriers, flush, sync ------------------------------------------

    /// Wait until the dispatcher has consumed everything enqueued so far.
    fn barrier(&self) {
        let (token, rx) = SyncToken::new();
        if self.core.tx.send(LogMessage::Sync(token)).is_ok() {
            // If the dispatcher is gone the token is dropped and recv errs;
            // either way we do not hang.
            let _ = rx.recv();
        }
    }

    /// Push pending messages through to every destination's backend buffer.
    pub fn flush(&self) -> Result<()> {
        if self.core.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.barrier();
        for dest in self.core.destinations.read().values() {
            dest.flush()?;
        }
        Ok(())
    }

    /// Barrier plus fsync: every message enqueued before the call reaches
    /// durable storage before this returns.
    pub fn sync(&self) -> Result<()> {
        if self.core.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.barrier();
        for dest in self.core.destinations.read().values() {
            dest.sync()?;
        }
        Ok(())
    }

    /// Like [`sync`](Self::sync) with a deadline.
    pub fn sync_timeout(&self, timeout: Duration) -> Result<()> {
        if self.core.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        let (token, rx) = SyncToken::new();
        match self
            .core
            .tx
            .send_timeout(LogMessage::Sync(token), timeout)
        {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => return Err(OmniError::SyncTimeout),
            Err(SendTimeoutError::Disconnected(_)) => return Ok(()),
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if rx.recv_timeout(remaining).is_err() && !self.core.closed.load(Ordering::Acquire) {
            return Err(OmniError::SyncTimeout);
        }
        for dest in self.core.destinations.read().values() {
            dest.sync()?;
        }
        Ok(())
    }

    // ---- lifecycle -------------------------------------------------------

    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }

    /// Stop accepting messages, drain the channel, flush and close every
    /// destination, stop workers. Idempotent: later calls return Ok
    /// immediately.
    pub fn close(&self) -> Result<()> {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _ = self.core.tx.send(LogMessage::Shutdown);
        let _ = self.core.done_rx.recv();
        self.join_workers();
        Ok(())
    }

    /// Close with a deadline. On timeout the shutdown keeps running in the
    /// background (destinations are still flushed best-effort) and
    /// `close_timeout` returns the deadline error.
    pub fn close_timeout(&self, timeout: Duration) -> Result<()> {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _ = self.core.tx.send(LogMessage::Shutdown);
        match self.core.done_rx.recv_timeout(timeout) {
            Ok(()) => {
                self.join_workers();
                Ok(())
            }
            Err(_) => {
                // Ask auxiliary tasks to stop without waiting for them.
                if let Some((stop, _handle)) = self.core.cleanup.lock().as_ref() {
                    let _ = stop.try_send(());
                }
                Err(OmniError::CloseTimeout)
            }
        }
    }

    fn join_workers(&self) {
        if let Some(handle) = self.core.dispatcher.lock().take() {
            let _ = handle.join();
        }
        if let Some((stop, handle)) = self.core.cleanup.lock().take() {
            let _ = stop.try_send(());
            let _ = handle.join();
        }
        self.core.compression.shutdown();
    }

    // ---- runtime settings ------------------------------------------------

    pub fn level(&self) -> Level {
        Level::from_index(self.core.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: Level) {
        self.core.level.store(level.index() as u8, Ordering::Relaxed);
    }

    pub fn set_format(&self, format: Format) {
        self.core.format_settings.write().format = format;
    }

    /// Register a named filter; re-using a name replaces the filter.
    pub fn add_filter(
        &self,
        name: &str,
        filter: impl Fn(Level, &str, Option<&Fields>) -> bool + Send + Sync + 'static,
    ) {
        self.core.policy.write().filters.add(name, Arc::new(filter));
    }

    /// Remove a named filter. Returns whether it existed.
    pub fn remove_filter(&self, name: &str) -> bool {
        self.core.policy.write().filters.remove(name)
    }

    pub fn clear_filters(&self) {
        self.core.policy.write().filters.clear();
    }

    // ---- observability ---------------------------------------------------

    /// Point-in-time counter snapshot; safe to call concurrently with
    /// producers and the dispatcher.
    pub fn metrics(&self) -> MetricsSnapshot {
        let (active, disabled) = {
            let map = self.core.destinations.read();
            let active = map.values().filter(|d| d.is_enabled()).count();
            (active, map.len() - active)
        };
        let utilization = self.core.tx.len() as f64 / self.core.channel_capacity as f64;
        self.core
            .metrics
            .snapshot(active, disabled, utilization.clamp(0.0, 1.0))
    }

    /// Consumer handle for the bounded error channel.
    pub fn errors(&self) -> Receiver<LogError> {
        self.core.reporter.subscribe()
    }
}

/// Spawn the periodic cleanup ticker when age retention or deferred
/// compression needs it.
fn spawn_cleanup_if_needed(
    config: &Config,
    destinations: DestinationMap,
    compression: Arc<CompressionManager>,
    reporter: Arc<ErrorReporter>,
) -> Option<(Sender<()>, JoinHandle<()>)> {
    let wants_age_retention = !config.max_age.is_zero();
    let wants_late_compression =
        config.compression == Compression::Gzip && !config.compression_min_age.is_zero();
    if !wants_age_retention && !wants_late_compression {
        return None;
    }

    let max_age = config.max_age;
    let min_age = config.compression_min_age;
    let (stop_tx, stop_rx) = bounded(1);
    let handle = rotation::spawn_cleanup_ticker(
        config.effective_cleanup_interval(),
        stop_rx,
        move || {
            let bases: Vec<PathBuf> = destinations
                .read()
                .values()
                .filter_map(|d| d.file_path().cloned())
                .collect();
            for base in bases {
                if wants_age_retention {
                    let skip = |p: &std::path::Path| compression.is_in_flight(p);
                    if let Err(e) = rotation::apply_age_retention(&base, max_age, &skip) {
                        reporter.report(LogError::new(
                            "retention",
                            base.display().to_string(),
                            "age retention sweep failed",
                            e.to_string(),
                            ErrorSeverity::Warn,
                        ));
                    }
                }
                if wants_late_compression {
                    offer_uncompressed(&base, min_age, &compression);
                }
            }
        },
    );
    Some((stop_tx, handle))
}

/// Re-offer rotated files that were too fresh to compress at rotation time.
fn offer_uncompressed(base: &PathBuf, min_age: Duration, compression: &CompressionManager) {
    let Ok(rotated) = rotation::list_rotated(base) else {
        return;
    };
    let prefix = base
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| format!("{}.", n))
        .unwrap_or_default();
    for path in rotated {
        let name = path.to_string_lossy();
        if name.ends_with(crate::compression::COMPRESSED_SUFFIX) {
            continue;
        }
        if crate::compression::compressed_path(&path).exists() {
            continue;
        }
        let old_enough = rotation::rotated_file_age(&path, &prefix, chrono::Local::now())
            .map(|age| age >= min_age)
            .unwrap_or(false);
        if old_enough {
            let _ = compression.enqueue(path);
        }
    }
}

fn static_meta_fields(config: &Config) -> Fields {
    let mut meta = Fields::new();
    if config.include_hostname {
        let name = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        meta.insert("hostname".to_string(), FieldValue::Str(name));
    }
    if config.include_process {
        let process = std::env::args()
            .next()
            .unwrap_or_else(|| "unknown".to_string());
        meta.insert("process".to_string(), FieldValue::Str(process));
        meta.insert(
            "pid".to_string(),
            FieldValue::Uint(std::process::id() as u64),
        );
    }
    meta
}

/// Render the current stack, truncated to `max_frames` (the std rendering
/// uses two lines per frame).
fn capture_stack(max_frames: usize) -> String {
    let backtrace = std::backtrace::Backtrace::force_capture().to_string();
    let lines: Vec<&str> = backtrace.lines().take(max_frames * 2).collect();
    lines.join("\n")
}
