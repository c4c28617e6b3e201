//! Transport session: one channel, one outstanding request.
//!
//! The session owns at most one [`Channel`] at a time. Open failures, lost
//! channels and idle timeouts go through the [`FailoverPolicy`]; the
//! outstanding request is re-sent unchanged on every replacement channel.
//! Only exhaustion, cancellation and index gaps reach the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use nofile_protocol::envelope::{EnvelopeError, decode_frame};
use nofile_protocol::messages::{DownloadResponse, UploadAck};

use crate::channel::{Channel, ChannelEvent, Connector};
use crate::failover::{FailoverDecision, FailoverPolicy};
use crate::types::{FailureKind, RetryNotice, TransportConfig};

/// Errors surfaced by a [`TransportSession`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unable to reach the transfer channel: {last_failure}")]
    Exhausted { last_failure: String },

    #[error("expected a response for chunk {expected}, got chunk {received}")]
    ProtocolViolation { expected: u32, received: u32 },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("session closed")]
    Closed,

    #[error("no channel endpoint configured")]
    NoCandidates,
}

/// Called before each backoff wait.
pub type RetryCallback = Box<dyn Fn(&RetryNotice) + Send + Sync>;

/// An inbound frame the session can match to the request in flight.
pub trait InboundFrame: Sized {
    fn parse(text: &str) -> Result<Self, EnvelopeError>;

    /// Chunk index this frame answers. `None` for frames that answer no
    /// chunk, such as rejections; those are handed up unchecked.
    fn chunk_index(&self) -> Option<u32>;

    /// Transfer id carried by the frame, if the protocol has one.
    fn correlation_id(&self) -> Option<u64> {
        None
    }
}

impl InboundFrame for UploadAck {
    fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let (ack, _) = decode_frame::<UploadAck>(text)?;
        Ok(ack)
    }

    fn chunk_index(&self) -> Option<u32> {
        if self.success { self.j } else { None }
    }

    fn correlation_id(&self) -> Option<u64> {
        self.i
    }
}

impl InboundFrame for DownloadResponse {
    fn parse(text: &str) -> Result<Self, EnvelopeError> {
        DownloadResponse::parse(text)
    }

    fn chunk_index(&self) -> Option<u32> {
        if self.rejection().is_some() {
            None
        } else {
            self.meta.part
        }
    }
}

/// Strict request/response exchange over a replaceable channel.
pub struct TransportSession {
    connector: Arc<dyn Connector>,
    policy: FailoverPolicy,
    idle_timeout: Duration,
    channel: Option<Channel>,
    generation: u64,
    in_flight: Option<u32>,
    correlation: Option<u64>,
    label: String,
    cancel: CancellationToken,
    closed: bool,
    on_retry: Option<RetryCallback>,
}

impl TransportSession {
    pub fn new(
        connector: Arc<dyn Connector>,
        candidates: Vec<String>,
        config: TransportConfig,
        cancel: CancellationToken,
    ) -> Self {
        let idle_timeout = config.idle_timeout;
        Self {
            connector,
            policy: FailoverPolicy::new(candidates, config),
            idle_timeout,
            channel: None,
            generation: 0,
            in_flight: None,
            correlation: None,
            label: String::new(),
            cancel,
            closed: false,
            on_retry: None,
        }
    }

    /// Sets the transfer label used in log fields.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn set_retry_callback(&mut self, cb: RetryCallback) {
        self.on_retry = Some(cb);
    }

    /// Responses carrying a different transfer id are discarded as stale.
    pub fn set_correlation(&mut self, id: Option<u64>) {
        self.correlation = id;
    }

    /// Chunk index of the request awaiting its response.
    pub fn in_flight(&self) -> Option<u32> {
        self.in_flight
    }

    /// Number of channels opened so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    pub fn policy(&self) -> &FailoverPolicy {
        &self.policy
    }

    /// Opens a channel unless one is already live, retrying per policy.
    pub async fn open(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.policy.candidates().is_empty() {
            return Err(TransportError::NoCandidates);
        }

        while self.channel.is_none() {
            self.check_cancelled()?;
            let candidate = self.policy.current_candidate();
            let Some(url) = self.policy.current_endpoint().map(str::to_owned) else {
                return Err(TransportError::Closed);
            };

            debug!(transfer = %self.label, candidate, url = %url, "opening channel");
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TransportError::Cancelled),
                r = tokio::time::timeout(self.idle_timeout, self.connector.connect(&url)) => r,
            };

            match result {
                Ok(Ok(channel)) => {
                    self.policy.record_success();
                    self.generation += 1;
                    info!(
                        transfer = %self.label,
                        candidate,
                        generation = self.generation,
                        "channel open"
                    );
                    self.channel = Some(channel);
                }
                Ok(Err(e)) => {
                    warn!(transfer = %self.label, candidate, error = %e, "channel open failed");
                    self.backoff(FailureKind::Open, e.to_string()).await?;
                }
                Err(_) => {
                    warn!(transfer = %self.label, candidate, "channel open timed out");
                    self.backoff(FailureKind::Open, "connection timed out".into())
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Sends `frame` as the request for chunk `index` and waits for the
    /// matching response.
    ///
    /// Unparseable and stale frames are discarded. A response for another
    /// chunk index is a [`TransportError::ProtocolViolation`].
    pub async fn request<R>(&mut self, frame: &str, index: u32) -> Result<R, TransportError>
    where
        R: InboundFrame + Send,
    {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.in_flight = Some(index);
        let mut sent_on: Option<u64> = None;

        loop {
            self.check_cancelled()?;
            self.open().await?;

            if sent_on != Some(self.generation) {
                let sent = match &self.channel {
                    Some(channel) => channel.send(frame.to_owned()).await,
                    None => continue,
                };
                if let Err(e) = sent {
                    self.lose_channel(e.to_string()).await?;
                    continue;
                }
                trace!(transfer = %self.label, chunk = index, frame = %truncated(frame), "frame sent");
                debug!(transfer = %self.label, chunk = index, generation = self.generation, "request sent");
                sent_on = Some(self.generation);
            }

            let Some(channel) = self.channel.as_mut() else {
                continue;
            };
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TransportError::Cancelled),
                r = tokio::time::timeout(self.idle_timeout, channel.recv()) => r,
            };

            match event {
                Ok(ChannelEvent::Message(text)) => {
                    if let Some(response) = self.accept::<R>(&text, index)? {
                        self.in_flight = None;
                        return Ok(response);
                    }
                }
                Ok(ChannelEvent::Closed { reason }) => {
                    let reason = reason.unwrap_or_else(|| "connection lost".into());
                    self.lose_channel(reason).await?;
                }
                Ok(ChannelEvent::Errored(e)) => self.lose_channel(e).await?,
                Err(_) => {
                    warn!(
                        transfer = %self.label,
                        chunk = index,
                        timeout_secs = self.idle_timeout.as_secs(),
                        "no response before idle timeout"
                    );
                    self.lose_channel("idle timeout".into()).await?;
                }
            }
        }
    }

    /// Sends a frame that expects no response. Best effort: skipped when no
    /// channel is open.
    pub async fn notify(&mut self, frame: &str) {
        if let Some(channel) = &self.channel
            && let Err(e) = channel.send(frame.to_owned()).await
        {
            debug!(transfer = %self.label, error = %e, "notify not delivered");
        }
    }

    /// Tears down the channel and halts failover. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.policy.halt();
        self.in_flight = None;
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        debug!(transfer = %self.label, "session closed");
    }

    fn check_cancelled(&self) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            Err(TransportError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn accept<R: InboundFrame>(&mut self, text: &str, index: u32) -> Result<Option<R>, TransportError> {
        let frame = match R::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(transfer = %self.label, chunk = index, error = %e, "discarding malformed frame");
                return Ok(None);
            }
        };

        // With a correlation id set, a frame that omits its id is as stale
        // as one carrying another.
        if let Some(expected) = self.correlation {
            let got = frame.correlation_id();
            if got != Some(expected) {
                debug!(transfer = %self.label, stale = ?got, "discarding response for another transfer");
                return Ok(None);
            }
        }

        self.policy.record_success();

        if let Some(received) = frame.chunk_index()
            && received != index
        {
            return Err(TransportError::ProtocolViolation {
                expected: index,
                received,
            });
        }
        Ok(Some(frame))
    }

    async fn lose_channel(&mut self, reason: String) -> Result<(), TransportError> {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        warn!(transfer = %self.label, error = %reason, "channel lost");
        self.backoff(FailureKind::Lost, reason).await
    }

    async fn backoff(&mut self, kind: FailureKind, reason: String) -> Result<(), TransportError> {
        let (candidate, attempt, delay) = match self.policy.record_failure(reason.clone()) {
            FailoverDecision::Retry {
                candidate,
                attempt,
                delay,
            } => (candidate, attempt, delay),
            FailoverDecision::Advance { candidate, delay } => {
                info!(transfer = %self.label, candidate, "switching channel endpoint");
                (candidate, 0, delay)
            }
            FailoverDecision::Exhausted { last_failure } => {
                warn!(transfer = %self.label, error = %last_failure, "all channel endpoints exhausted");
                self.close();
                return Err(TransportError::Exhausted { last_failure });
            }
            FailoverDecision::Halted => return Err(TransportError::Closed),
        };

        debug!(
            transfer = %self.label,
            candidate,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "retry scheduled"
        );
        if let Some(cb) = &self.on_retry {
            cb(&RetryNotice {
                candidate,
                attempt,
                delay,
                kind,
                reason,
            });
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Frame text for trace logs; chunk payloads are large.
fn truncated(frame: &str) -> &str {
    const LIMIT: usize = 256;
    if frame.len() <= LIMIT {
        return frame;
    }
    let mut end = LIMIT;
    while !frame.is_char_boundary(end) {
        end -= 1;
    }
    &frame[..end]
}
