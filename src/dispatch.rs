//! The single consumer of the message channel.
//!
//! One long-lived thread owns the receive end. Per message it serialises the
//! entry once, then writes it to every enabled destination under the
//! destination-list read lock. Because there is exactly one consumer,
//! per-producer enqueue order is preserved end to end.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ahash::AHashMap;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;

use crate::destination::Destination;
use crate::entry::LogEntry;
use crate::errors::{ErrorReporter, ErrorSeverity, LogError};
use crate::format::{Format, FormatOptions, format_entry};
use crate::message::LogMessage;
use crate::metrics::{DropReason, Metrics};
use crate::recovery::{ErrorClass, RecoveryPolicy};

pub(crate) type DestinationMap = Arc<RwLock<AHashMap<String, Arc<Destination>>>>;

/// Formatting settings the dispatcher snapshots per message.
pub(crate) struct FormatSettings {
    pub(crate) format: Format,
    pub(crate) options: Arc<FormatOptions>,
}

pub(crate) struct DispatcherContext {
    pub(crate) destinations: DestinationMap,
    pub(crate) settings: Arc<RwLock<FormatSettings>>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) reporter: Arc<ErrorReporter>,
    pub(crate) recovery: RecoveryPolicy,
    /// Signalled once shutdown (drain + flush + close) has finished.
    pub(crate) done: Sender<()>,
}

pub(crate) fn spawn(rx: Receiver<LogMessage>, ctx: DispatcherContext) -> JoinHandle<()> {
    thread::Builder::new()
        .name("omni-dispatch".to_string())
        .spawn(move || run(rx, ctx))
        .expect("failed to spawn dispatcher thread")
}

fn run(rx: Receiver<LogMessage>, ctx: DispatcherContext) {
    loop {
        match rx.recv() {
            Ok(LogMessage::Sync(token)) => token.signal(),
            Ok(LogMessage::Record(entry)) => process_message(&entry, &ctx),
            Ok(LogMessage::Shutdown) | Err(_) => break,
        }
    }

    // Drain whatever producers managed to enqueue before they observed the
    // closed flag, then flush and close every destination.
    while let Ok(message) = rx.try_recv() {
        match message {
            LogMessage::Sync(token) => token.signal(),
            LogMessage::Record(entry) => process_message(&entry, &ctx),
            LogMessage::Shutdown => {}
        }
    }

    let destinations = ctx.destinations.read();
    for dest in destinations.values() {
        dest.begin_drain();
        if let Err(e) = dest.flush() {
            ctx.reporter.report(LogError::new(
                "flush",
                dest.uri().to_string(),
                "flush during shutdown failed",
                e.to_string(),
                ErrorSeverity::Warn,
            ));
        }
        if let Err(e) = dest.close() {
            ctx.reporter.report(LogError::new(
                "close",
                dest.uri().to_string(),
                "close during shutdown failed",
                e.to_string(),
                ErrorSeverity::Warn,
            ));
        }
    }
    drop(destinations);

    let _ = ctx.done.try_send(());
}

/// Serialise once, fan out to every enabled destination, account the result.
fn process_message(entry: &LogEntry, ctx: &DispatcherContext) {
    let (format, options) = {
        let settings = ctx.settings.read();
        (settings.format, settings.options.clone())
    };
    let bytes = format_entry(entry, format, &options);

    let destinations = ctx.destinations.read();
    let mut undelivered = false;
    for dest in destinations.values() {
        if !dest.is_enabled() {
            continue;
        }
        match dest.write(&bytes) {
            Ok(n) => ctx.metrics.add_bytes(n as u64),
            Err(err) => {
                let (recovered, class) = ctx.recovery.recover(dest, &bytes, err);
                match recovered {
                    Ok(n) => ctx.metrics.add_bytes(n as u64),
                    Err(final_err) => {
                        undelivered = true;
                        let severity = match class {
                            ErrorClass::DiskFull => ErrorSeverity::High,
                            _ => ErrorSeverity::Warn,
                        };
                        ctx.reporter.report(LogError::new(
                            "write",
                            dest.uri().to_string(),
                            "record dropped after write failure",
                            final_err.to_string(),
                            severity,
                        ));
                    }
                }
            }
        }
    }
    drop(destinations);

    // A record counts as logged only when every enabled destination took it;
    // an exhausted write anywhere makes it a drop, exactly once.
    if undelivered {
        ctx.metrics.inc_dropped(DropReason::WriteFailed);
    } else {
        ctx.metrics.inc_logged(entry.level);
    }
}
