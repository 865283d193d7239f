//! Run events emitted by the executor.
//!
//! The engine never prints; it reports stage transitions, progress and
//! per-file actions on an optional channel, and the binary decides what to
//! show.

use tokio::sync::mpsc;

/// Event types emitted while a backup runs
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Run started and the previous baseline was loaded
    Started {
        run_id: String,
        previous_records: usize,
    },

    /// Source scan finished
    ScanCompleted { total_files: usize, total_bytes: u64 },

    /// Digest phase progress
    DigestProgress { processed: usize, total: usize },

    /// Change detection finished
    DiffCompleted { to_copy: usize, skipped: usize },

    /// Copy phase progress
    CopyProgress { processed: usize, total: usize },

    /// A file was written and verified (or would be, in dry-run)
    FileCopied { path: String, bytes: u64, compressed: bool },

    /// A vanished file's artifact was removed (or would be, in dry-run)
    FileRemoved { path: String },

    /// Run finished; state persisted unless dry-run
    Completed { errors: usize },

    /// Run stopped by the user before persisting
    Interrupted,
}

/// Sending half of the event channel; a no-op when nobody listens
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl EventSink {
    /// Create a connected sink and the receiver the caller drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means the listener stopped caring
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_are_delivered_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(RunEvent::ScanCompleted {
            total_files: 2,
            total_bytes: 10,
        });
        sink.emit(RunEvent::Completed { errors: 0 });
        drop(sink);

        assert_eq!(
            rx.recv().await,
            Some(RunEvent::ScanCompleted {
                total_files: 2,
                total_bytes: 10
            })
        );
        assert_eq!(rx.recv().await, Some(RunEvent::Completed { errors: 0 }));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_disconnected_sink_is_silent() {
        EventSink::none().emit(RunEvent::Interrupted);

        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(RunEvent::Interrupted);
    }
}
