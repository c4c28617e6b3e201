//! Events reported while transfers run.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use nofile_protocol::{Notice, TransferState};

use crate::download::DownloadedFile;
use crate::links::FinishedUpload;

/// Client-side id of one transfer. Echoed by the remote as `i`.
pub type TransferId = u64;

/// Progress and outcome events for the UI boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    /// Uploads were queued; `count` is the queue length afterwards.
    Queued { count: usize },
    StateChanged {
        transfer: TransferId,
        state: TransferState,
    },
    /// `completed` of `total` chunks are through.
    Progress {
        transfer: TransferId,
        completed: u32,
        total: u32,
    },
    /// A reconnect is scheduled after `delay`.
    Retrying {
        transfer: TransferId,
        candidate: usize,
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    UploadFinalized {
        transfer: TransferId,
        upload: FinishedUpload,
    },
    DownloadFinalized {
        transfer: TransferId,
        name: String,
        content_type: String,
        size: u64,
    },
    Failed {
        transfer: TransferId,
        notice: Notice,
    },
    /// Unsaved-work guard raised or lowered.
    GuardChanged { active: bool },
}

impl TransferEvent {
    pub(crate) fn download_finalized(transfer: TransferId, file: &DownloadedFile) -> Self {
        Self::DownloadFinalized {
            transfer,
            name: file.name.clone(),
            content_type: file.content_type.clone(),
            size: file.bytes.len() as u64,
        }
    }
}

/// Events buffered before new ones are dropped.
pub const EVENT_BUFFER: usize = 1024;

/// Sending half of the event stream.
///
/// The buffer is bounded and `emit` never waits: once it is full, new
/// events are dropped until the receiver catches up. Outcomes are also
/// returned by the sequencers, so a lagging or absent reader loses
/// progress reports only.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<TransferEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<TransferEvent>) -> Self {
        Self { tx }
    }

    /// Creates a sink and its receiver with [`EVENT_BUFFER`] slots.
    pub fn channel() -> (Self, mpsc::Receiver<TransferEvent>) {
        Self::with_capacity(EVENT_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<TransferEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: TransferEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.tx.try_send(event) {
            trace!(?event, "event buffer full, dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_buffer_drops_instead_of_blocking() {
        let (sink, mut rx) = EventSink::with_capacity(2);
        for count in 1..=5 {
            sink.emit(TransferEvent::Queued { count });
        }
        assert_eq!(rx.try_recv().unwrap(), TransferEvent::Queued { count: 1 });
        assert_eq!(rx.try_recv().unwrap(), TransferEvent::Queued { count: 2 });
        assert!(rx.try_recv().is_err());

        // Space frees up once the reader drains.
        sink.emit(TransferEvent::Queued { count: 6 });
        assert_eq!(rx.try_recv().unwrap(), TransferEvent::Queued { count: 6 });
    }

    #[test]
    fn closed_receiver_is_ignored() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(TransferEvent::GuardChanged { active: true });
    }
}
