//! Public types for the transport layer.

use std::time::Duration;

use nofile_protocol::constants::{
    DEFAULT_IDLE_TIMEOUT, MAX_CHANNEL_ATTEMPTS, RETRY_BASE_DELAY, RETRY_MAX_DELAY,
    WS_MAX_MESSAGE_SIZE,
};

/// Retry and liveness settings for a [`TransportSession`](crate::TransportSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Opens per candidate before advancing to the next one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Silence allowed while a request is outstanding.
    pub idle_timeout: Duration,
    /// Largest inbound frame accepted from the channel.
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_CHANNEL_ATTEMPTS,
            base_delay: RETRY_BASE_DELAY,
            max_delay: RETRY_MAX_DELAY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_frame_size: WS_MAX_MESSAGE_SIZE,
        }
    }
}

impl TransportConfig {
    /// `min(base_delay * 2^(attempt-1), max_delay)` for a 1-based attempt.
    ///
    /// No jitter: every client of a transfer retries on the same schedule.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exp).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What went wrong on the channel that triggered a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The channel could not be opened.
    Open,
    /// An open channel closed, errored or went silent.
    Lost,
}

/// Describes one scheduled reconnect, reported before the wait starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    /// Index of the candidate that will be tried next.
    pub candidate: usize,
    /// Failed attempts so far on that candidate (0 right after a switch).
    pub attempt: u32,
    pub delay: Duration,
    pub kind: FailureKind,
    pub reason: String,
}
