//! Transfer manager: runs queued uploads one at a time.
//!
//! Each upload gets its own key, chunk plan and transport session. A
//! failed upload is reported and the next one starts; cancelling the
//! active transfer does not touch the rest of the queue unless
//! [`TransferController::cancel_all`] is used.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use nofile_connection::Connector;

use crate::config::ClientConfig;
use crate::download::{DownloadSequencer, DownloadSpec, DownloadedFile};
use crate::error::TransferError;
use crate::events::{EventSink, TransferEvent, TransferId};
use crate::links::FinishedUpload;
use crate::upload::{UploadJob, UploadSequencer};

type ActiveSlot = Arc<Mutex<Option<(TransferId, CancellationToken)>>>;
type SharedQueue = Arc<Mutex<VecDeque<(TransferId, UploadJob)>>>;

/// Result of one queued upload.
#[derive(Debug)]
pub struct UploadOutcome {
    pub id: TransferId,
    pub name: String,
    pub result: Result<FinishedUpload, TransferError>,
}

/// Feeds and cancels transfers from outside the task running them.
#[derive(Clone)]
pub struct TransferController {
    queue: SharedQueue,
    next_id: Arc<AtomicU64>,
    events: EventSink,
    active: ActiveSlot,
    shutdown: CancellationToken,
}

impl TransferController {
    /// Appends one upload per job, in order. Jobs added while the queue
    /// runs start after everything already waiting.
    pub fn enqueue(&self, jobs: impl IntoIterator<Item = UploadJob>) -> Vec<TransferId> {
        let mut ids = Vec::new();
        let Ok(mut queue) = self.queue.lock() else {
            return ids;
        };
        for job in jobs {
            let id = self.allocate_id();
            debug!(transfer = id, name = %job.name(), "upload queued");
            queue.push_back((id, job));
            ids.push(id);
        }
        if !ids.is_empty() {
            self.events.emit(TransferEvent::Queued { count: queue.len() });
        }
        ids
    }

    /// Uploads waiting to start.
    pub fn pending(&self) -> usize {
        self.queue.lock().map_or(0, |q| q.len())
    }

    /// Cancels the running transfer. Queued uploads still run.
    ///
    /// Returns the id of the cancelled transfer, if one was running.
    pub fn cancel_active(&self) -> Option<TransferId> {
        let (id, token) = self.active.lock().ok()?.take()?;
        token.cancel();
        Some(id)
    }

    /// Cancels the running transfer and drops everything queued.
    pub fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    fn allocate_id(&self) -> TransferId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn pop_next(&self) -> Option<(TransferId, UploadJob)> {
        self.queue.lock().ok()?.pop_front()
    }
}

/// Owns the upload queue and at most one live transfer.
pub struct TransferManager {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    handle: TransferController,
    events_rx: Option<mpsc::Receiver<TransferEvent>>,
    guard: bool,
}

impl TransferManager {
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (events, events_rx) = EventSink::channel();
        Self {
            config,
            connector,
            handle: TransferController {
                queue: Arc::new(Mutex::new(VecDeque::new())),
                next_id: Arc::new(AtomicU64::new(1)),
                events,
                active: Arc::new(Mutex::new(None)),
                shutdown: CancellationToken::new(),
            },
            events_rx: Some(events_rx),
            guard: false,
        }
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// The receiver should be drained; see [`EventSink`] for what happens
    /// when it is not.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransferEvent>> {
        self.events_rx.take()
    }

    pub fn controller(&self) -> TransferController {
        self.handle.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Queues one upload per job, in order.
    pub fn enqueue(&mut self, jobs: impl IntoIterator<Item = UploadJob>) -> Vec<TransferId> {
        self.handle.enqueue(jobs)
    }

    /// Uploads waiting to start.
    pub fn pending(&self) -> usize {
        self.handle.pending()
    }

    /// Id of the transfer currently running, if any.
    pub fn active(&self) -> Option<TransferId> {
        self.handle.active.lock().ok()?.as_ref().map(|(id, _)| *id)
    }

    /// Runs queued uploads strictly one after another until the queue is
    /// empty or [`TransferController::cancel_all`] is called. Jobs enqueued
    /// through a [`TransferController`] meanwhile are picked up in order.
    pub async fn run_queue(&mut self) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::new();

        while let Some((id, job)) = self.handle.pop_next() {
            let name = job.name().to_string();
            if self.handle.shutdown.is_cancelled() {
                debug!(transfer = id, "dropping queued upload");
                outcomes.push(UploadOutcome {
                    id,
                    name,
                    result: Err(TransferError::Cancelled),
                });
                continue;
            }

            self.set_guard(true);
            let cancel = self.start(id);
            let result = match UploadSequencer::new(
                id,
                job,
                &self.config,
                self.connector.clone(),
                self.handle.events.clone(),
                cancel,
            ) {
                Ok(sequencer) => sequencer.run().await,
                Err(e) => {
                    warn!(transfer = id, error = %e, "upload could not start");
                    self.report_failure(id, &e);
                    Err(e)
                }
            };
            self.finish(id);
            outcomes.push(UploadOutcome { id, name, result });
        }

        self.set_guard(false);
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(total = outcomes.len(), failed, "upload queue drained");
        outcomes
    }

    /// Runs a single download. Downloads bypass the upload queue.
    pub async fn download(&mut self, spec: DownloadSpec) -> Result<DownloadedFile, TransferError> {
        let id = self.handle.allocate_id();
        self.set_guard(true);
        let cancel = self.start(id);
        let result = match DownloadSequencer::new(
            id,
            spec,
            &self.config,
            self.connector.clone(),
            self.handle.events.clone(),
            cancel,
        ) {
            Ok(sequencer) => sequencer.run().await,
            Err(e) => {
                self.report_failure(id, &e);
                Err(e)
            }
        };
        self.finish(id);
        self.set_guard(false);
        result
    }

    fn start(&self, id: TransferId) -> CancellationToken {
        let token = self.handle.shutdown.child_token();
        if let Ok(mut slot) = self.handle.active.lock() {
            *slot = Some((id, token.clone()));
        }
        token
    }

    fn finish(&self, id: TransferId) {
        if let Ok(mut slot) = self.handle.active.lock()
            && slot.as_ref().is_some_and(|(active, _)| *active == id)
        {
            *slot = None;
        }
    }

    fn report_failure(&self, id: TransferId, err: &TransferError) {
        if let Some(notice) = err.notice() {
            self.handle.events.emit(TransferEvent::Failed {
                transfer: id,
                notice,
            });
        }
    }

    fn set_guard(&mut self, active: bool) {
        if self.guard != active {
            self.guard = active;
            self.handle.events.emit(TransferEvent::GuardChanged { active });
        }
    }
}
