//! The unit transported on the internal message channel.

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::entry::LogEntry;

/// One message on the dispatcher channel.
pub(crate) enum LogMessage {
    /// A log record to fan out to every enabled destination.
    Record(Box<LogEntry>),
    /// A barrier marker: the dispatcher signals the token without formatting
    /// or writing anything.
    Sync(SyncToken),
    /// Tells the dispatcher to drain whatever remains and shut down.
    Shutdown,
}

/// One-shot signal carried by a sync barrier message.
pub(crate) struct SyncToken {
    tx: Sender<()>,
}

impl SyncToken {
    /// Create a token and the receiver the caller blocks on.
    pub(crate) fn new() -> (SyncToken, Receiver<()>) {
        let (tx, rx) = bounded(1);
        (SyncToken { tx }, rx)
    }

    /// Fire the signal. Safe to call if the waiter has given up.
    pub(crate) fn signal(&self) {
        let _ = self.tx.try_send(());
    }
}
