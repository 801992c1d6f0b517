//! Batch events and the sinks that deliver them to a host.
//!
//! The sequencer reports everything observable about a batch through one
//! [`EventSink`]. A host either hands it the sending half of an unbounded
//! channel and drains the receiver, or supplies its own implementation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::progress::ProgressSnapshot;

// ---------------------------------------------------------------------------
// BatchEvent
// ---------------------------------------------------------------------------

/// Something that happened during a batch. Indices are zero-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    Started {
        index: usize,
        total: usize,
        input: PathBuf,
    },
    Progress {
        index: usize,
        snapshot: ProgressSnapshot,
    },
    Finished {
        index: usize,
        total: usize,
        output: PathBuf,
    },
    Failed {
        index: usize,
        total: usize,
        input: PathBuf,
        error: String,
    },
    BatchCancelled,
    AllFinished,
}

impl BatchEvent {
    /// Whether this event ends the batch.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::BatchCancelled | Self::AllFinished)
    }
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Destination for batch events.
///
/// `emit` is called from the sequencer task and must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: BatchEvent);
}

impl EventSink for mpsc::UnboundedSender<BatchEvent> {
    fn emit(&self, event: BatchEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Event receiver dropped; discarding batch event");
        }
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: BatchEvent) {
        (**self).emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(index: usize) -> BatchEvent {
        BatchEvent::Started {
            index,
            total: 3,
            input: PathBuf::from(format!("/in/{index}.mp4")),
        }
    }

    #[test]
    fn unbounded_sender_delivers_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(started(0));
        tx.emit(BatchEvent::AllFinished);
        assert_eq!(rx.try_recv().unwrap(), started(0));
        assert_eq!(rx.try_recv().unwrap(), BatchEvent::AllFinished);
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.emit(BatchEvent::BatchCancelled);
    }

    #[test]
    fn shared_sender_works_through_arc() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn EventSink> = Arc::new(tx);
        sink.emit(BatchEvent::AllFinished);
        assert_eq!(rx.try_recv().unwrap(), BatchEvent::AllFinished);
    }

    #[test]
    fn event_json_is_tagged() {
        let event = BatchEvent::Failed {
            index: 0,
            total: 1,
            input: PathBuf::from("/in/a.mp4"),
            error: "exit code 1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["error"], "exit code 1");
        let back: BatchEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert!(BatchEvent::BatchCancelled.is_terminal());
        assert!(!started(0).is_terminal());
    }
}
