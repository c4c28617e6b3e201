//! Upload sequencer: seals a file chunk by chunk and waits for each ack.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use nofile_connection::{Connector, RetryNotice, TransportSession};
use nofile_protocol::constants::FALLBACK_CONTENT_TYPE;
use nofile_protocol::{ChunkPayload, TransferState, UploadAck, UploadChunkMeta, encode_frame};
use nofile_transfer::{
    ChunkError, ChunkPlan, ChunkSource, TransferKey, encrypt_chunk, sanitize_file_name,
};

use crate::config::ClientConfig;
use crate::error::TransferError;
use crate::events::{EventSink, TransferEvent, TransferId};
use crate::links::{FinishedUpload, ShareLinks};

/// One file waiting to be uploaded.
#[derive(Debug)]
pub struct UploadJob {
    name: String,
    content_type: String,
    delay: u32,
    burn: bool,
    password: Option<String>,
    source: ChunkSource,
}

impl UploadJob {
    /// Opens `path` for upload, named after its final component.
    pub async fn from_path(path: &Path) -> Result<Self, TransferError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ChunkError::InvalidName(path.display().to_string()))?;
        let name = sanitize_file_name(&name)?;
        let source = ChunkSource::open(path).await?;
        Ok(Self::with_source(name, source))
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::with_source(name.into(), ChunkSource::from_bytes(bytes))
    }

    fn with_source(name: String, source: ChunkSource) -> Self {
        Self {
            name,
            content_type: FALLBACK_CONTENT_TYPE.into(),
            delay: 0,
            burn: false,
            password: None,
            source,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Retention in days, 0 = unlimited.
    pub fn with_delay(mut self, days: u32) -> Self {
        self.delay = days;
        self
    }

    pub fn with_burn(mut self, burn: bool) -> Self {
        self.burn = burn;
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.source.size()
    }
}

/// Drives one upload from first chunk to share links.
pub struct UploadSequencer {
    id: TransferId,
    job: UploadJob,
    plan: ChunkPlan,
    key: TransferKey,
    burn: bool,
    base_url: String,
    action_url: String,
    session: TransportSession,
    events: EventSink,
    cancel: CancellationToken,
    state: TransferState,
    short: Option<String>,
    token: Option<String>,
}

impl UploadSequencer {
    pub fn new(
        id: TransferId,
        job: UploadJob,
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<Self, TransferError> {
        let plan = ChunkPlan::new(job.size(), config.chunk_size)?;

        let mut session = TransportSession::new(
            connector,
            config.candidates(),
            config.transport.clone(),
            cancel.clone(),
        )
        .with_label(format!("upload-{id}"));
        session.set_correlation(Some(id));
        session.set_retry_callback(retry_reporter(id, events.clone()));

        Ok(Self {
            id,
            burn: job.burn || config.force_burn,
            job,
            plan,
            key: TransferKey::generate(),
            base_url: config.base_url.clone(),
            action_url: config.action_base().to_string(),
            session,
            events,
            cancel,
            state: TransferState::Pending,
            short: None,
            token: None,
        })
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn total(&self) -> u32 {
        self.plan.total()
    }

    /// Runs the upload to a terminal state and closes the channel.
    pub async fn run(mut self) -> Result<FinishedUpload, TransferError> {
        info!(
            transfer = self.id,
            name = %self.job.name,
            size = self.plan.file_size(),
            chunks = self.plan.total(),
            "upload started"
        );
        let result = self.drive().await;
        self.session.close();

        match &result {
            Ok(upload) => {
                self.set_state(TransferState::Complete);
                info!(transfer = self.id, short = %upload.short, "upload complete");
                self.events.emit(TransferEvent::UploadFinalized {
                    transfer: self.id,
                    upload: upload.clone(),
                });
            }
            Err(e) if e.is_cancelled() => {
                self.set_state(TransferState::Cancelled);
                info!(transfer = self.id, "upload cancelled");
            }
            Err(e) => {
                self.set_state(TransferState::Failed);
                error!(transfer = self.id, error = %e, "upload failed");
                if let Some(notice) = e.notice() {
                    self.events.emit(TransferEvent::Failed {
                        transfer: self.id,
                        notice,
                    });
                }
            }
        }
        result
    }

    async fn drive(&mut self) -> Result<FinishedUpload, TransferError> {
        self.set_state(TransferState::Connecting);
        self.session.open().await?;

        let total = self.plan.total();
        let mut last = UploadAck::default();
        for index in 0..total {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            self.set_state(TransferState::ProcessingChunk);
            let frame = self.seal(index).await?;

            self.set_state(TransferState::AwaitingChunk);
            let ack: UploadAck = self.session.request(&frame, index).await?;
            self.accept(&ack)?;
            debug!(transfer = self.id, chunk = index, total, "chunk acknowledged");
            self.events.emit(TransferEvent::Progress {
                transfer: self.id,
                completed: index + 1,
                total,
            });
            last = ack;
        }
        self.finalize(&last)
    }

    /// Reads, encrypts and frames one chunk. The plaintext is dropped
    /// before the frame is returned.
    async fn seal(&mut self, index: u32) -> Result<String, TransferError> {
        let plaintext = self.job.source.read_chunk(&self.plan, index).await?;
        let sealed = encrypt_chunk(&self.key, index, &plaintext)
            .map_err(|e| TransferError::from_codec(index, e))?;
        drop(plaintext);

        let meta = UploadChunkMeta {
            total: self.plan.total(),
            part: index,
            size: self.plan.file_size(),
            name: self.job.name.clone(),
            content_type: self.job.content_type.clone(),
            delay: self.job.delay,
            del_at_first_view: self.burn,
            zipped: false,
            id: self.short.clone(),
            i: self.id,
            file_pwd: self.job.password.clone(),
        };
        let payload = ChunkPayload::new(&sealed.nonce, sealed.ciphertext);
        Ok(encode_frame(&meta, Some(&payload))?)
    }

    fn accept(&mut self, ack: &UploadAck) -> Result<(), TransferError> {
        if !ack.success {
            let msg = ack.msg.clone().unwrap_or_else(|| "upload rejected".into());
            warn!(transfer = self.id, error = %msg, "upload rejected by remote");
            return Err(TransferError::ServerRejection(msg));
        }
        if ack.j.is_none() {
            return Err(TransferError::ProtocolViolation(
                "acknowledgement carries no chunk index".into(),
            ));
        }
        if let Some(parts) = ack.parts
            && parts != self.plan.total()
        {
            return Err(TransferError::ProtocolViolation(format!(
                "remote expects {parts} chunks, file has {}",
                self.plan.total()
            )));
        }
        if let Some(short) = &ack.short {
            self.short = Some(short.clone());
        }
        if let Some(token) = &ack.token {
            self.token = Some(token.clone());
        }
        Ok(())
    }

    fn finalize(&self, last: &UploadAck) -> Result<FinishedUpload, TransferError> {
        let short = self.short.clone().ok_or_else(|| {
            TransferError::ProtocolViolation("upload finished without a file id".into())
        })?;
        let token = self.token.clone().ok_or_else(|| {
            TransferError::ProtocolViolation("upload finished without a modification token".into())
        })?;
        let links = ShareLinks::build(
            &self.base_url,
            &self.action_url,
            &short,
            &token,
            &self.key.encoded_key(),
        );
        Ok(FinishedUpload {
            name: self.job.name.clone(),
            size: self.plan.file_size(),
            short,
            token,
            links,
            created_at: last.created_at,
            delay: last.delay.unwrap_or(self.job.delay),
            burn: self.burn,
        })
    }

    fn set_state(&mut self, state: TransferState) {
        if self.state == state {
            return;
        }
        debug!(transfer = self.id, from = ?self.state, to = ?state, "state change");
        self.state = state;
        self.events.emit(TransferEvent::StateChanged {
            transfer: self.id,
            state,
        });
    }
}

/// Forwards scheduled reconnects to the event stream.
pub(crate) fn retry_reporter(
    id: TransferId,
    events: EventSink,
) -> nofile_connection::RetryCallback {
    Box::new(move |notice: &RetryNotice| {
        let cause = TransferError::from_retry(notice);
        debug!(
            transfer = id,
            candidate = notice.candidate,
            attempt = notice.attempt,
            retryable = cause.is_retryable(),
            error = %cause,
            "channel fault"
        );
        events.emit(TransferEvent::Retrying {
            transfer: id,
            candidate: notice.candidate,
            attempt: notice.attempt,
            delay: notice.delay,
            reason: cause.to_string(),
        });
    })
}
