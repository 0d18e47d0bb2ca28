// Author: Lukas Bower
// Purpose: Broadcast per-chunk upload progress and the terminal outcome to any number of subscribers.

use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

/// One progress update, emitted after every acknowledged chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadProgress {
    /// Bytes acknowledged so far.
    pub bytes_sent: usize,
    /// Total artifact size.
    pub total_bytes: usize,
    /// Chunks acknowledged so far.
    pub chunks_sent: usize,
    /// Total chunk count for this upload.
    pub total_chunks: usize,
    /// `bytes_sent / total_bytes`, as a whole percentage.
    pub percent: u8,
}

/// Terminal state reported on the final progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTerminal {
    /// `IMG_OK:END`/`IMG_OK:COMPLETE` received.
    Complete,
    /// Retries exhausted, a rejection, or a CRC mismatch.
    Failed,
    /// The cancel token fired.
    Cancelled,
}

/// One event published to upload progress subscribers.
///
/// `upload()` emits zero or more [`Progress`](UploadEvent::Progress) events
/// as chunks are acknowledged, followed by exactly one
/// [`Terminal`](UploadEvent::Terminal) event when the upload reaches
/// `"Complete!"`, `"Failed"`, or `"Cancelled"` — no further events follow it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UploadEvent {
    /// A chunk was just acknowledged.
    Progress(UploadProgress),
    /// The upload reached a terminal state.
    Terminal(UploadTerminal),
}

/// Small synchronous fan-out broadcaster standing in for an async broadcast
/// channel (this workspace is thread-based, not runtime-based). Every
/// subscriber gets every event; subscribers that have been dropped are
/// pruned on the next publish.
#[derive(Default)]
pub struct ProgressBroadcaster {
    subscribers: Mutex<Vec<Sender<UploadEvent>>>,
}

impl ProgressBroadcaster {
    /// Build an empty broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber; the returned receiver observes every
    /// event published from this point on.
    pub fn subscribe(&self) -> Receiver<UploadEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Publish one event to every live subscriber, dropping closed ones.
    pub fn publish(&self, event: UploadEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_live_subscriber_receives_published_events() {
        let broadcaster = ProgressBroadcaster::new();
        let a = broadcaster.subscribe();
        let b = broadcaster.subscribe();
        let event = UploadEvent::Progress(UploadProgress {
            bytes_sent: 512,
            total_bytes: 1024,
            chunks_sent: 1,
            total_chunks: 2,
            percent: 50,
        });
        broadcaster.publish(event);
        assert_eq!(a.try_recv().unwrap(), event);
        assert_eq!(b.try_recv().unwrap(), event);
    }

    #[test]
    fn dropped_subscribers_are_pruned_without_erroring() {
        let broadcaster = ProgressBroadcaster::new();
        {
            let _dropped = broadcaster.subscribe();
        }
        let event = UploadEvent::Progress(UploadProgress {
            bytes_sent: 0,
            total_bytes: 1,
            chunks_sent: 0,
            total_chunks: 1,
            percent: 0,
        });
        broadcaster.publish(event);
        assert_eq!(broadcaster.subscribers.lock().unwrap().len(), 0);
    }

    #[test]
    fn terminal_event_is_distinguishable_from_progress() {
        let broadcaster = ProgressBroadcaster::new();
        let rx = broadcaster.subscribe();
        broadcaster.publish(UploadEvent::Terminal(UploadTerminal::Cancelled));
        assert!(matches!(rx.try_recv().unwrap(), UploadEvent::Terminal(UploadTerminal::Cancelled)));
    }
}
