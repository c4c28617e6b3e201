//! Endpoint failover with bounded exponential backoff.
//!
//! Each candidate gets `max_attempts` opens. A failure below the ceiling
//! retries the same candidate after `min(base * 2^(attempt-1), max)`; the
//! failure that reaches the ceiling advances to the next candidate after
//! the base delay. Past the last candidate the policy is exhausted.

use std::time::Duration;

use crate::types::TransportConfig;

/// What the session should do after a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverDecision {
    /// Reopen the same candidate after `delay`.
    Retry {
        candidate: usize,
        attempt: u32,
        delay: Duration,
    },
    /// Move to the next candidate after `delay`.
    Advance { candidate: usize, delay: Duration },
    /// Every candidate used up its attempts.
    Exhausted { last_failure: String },
    /// The caller stopped the policy; nothing further is scheduled.
    Halted,
}

/// Per-transfer failover state over a fixed candidate list.
#[derive(Debug, Clone)]
pub struct FailoverPolicy {
    candidates: Vec<String>,
    attempts: Vec<u32>,
    current: usize,
    last_failure: Option<String>,
    halted: bool,
    config: TransportConfig,
}

impl FailoverPolicy {
    pub fn new(candidates: Vec<String>, config: TransportConfig) -> Self {
        let attempts = vec![0; candidates.len()];
        Self {
            candidates,
            attempts,
            current: 0,
            last_failure: None,
            halted: false,
            config,
        }
    }

    /// The endpoint to open next, `None` once exhausted or empty.
    pub fn current_endpoint(&self) -> Option<&str> {
        if self.halted {
            return None;
        }
        self.candidates.get(self.current).map(String::as_str)
    }

    pub fn current_candidate(&self) -> usize {
        self.current
    }

    /// Failed attempts recorded on the current candidate.
    pub fn attempts(&self) -> u32 {
        self.attempts.get(self.current).copied().unwrap_or(0)
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Records a failed open or a lost channel.
    pub fn record_failure(&mut self, reason: impl Into<String>) -> FailoverDecision {
        if self.halted {
            return FailoverDecision::Halted;
        }
        self.last_failure = Some(reason.into());

        let Some(count) = self.attempts.get_mut(self.current) else {
            return self.exhausted();
        };
        *count += 1;
        let attempt = *count;

        if attempt < self.config.max_attempts {
            return FailoverDecision::Retry {
                candidate: self.current,
                attempt,
                delay: self.config.delay_for_attempt(attempt),
            };
        }

        self.current += 1;
        match self.attempts.get_mut(self.current) {
            Some(next) => {
                *next = 0;
                FailoverDecision::Advance {
                    candidate: self.current,
                    delay: self.config.base_delay,
                }
            }
            None => self.exhausted(),
        }
    }

    /// A successful open or a valid response: backoff restarts from zero.
    pub fn record_success(&mut self) {
        if let Some(count) = self.attempts.get_mut(self.current) {
            *count = 0;
        }
    }

    /// Stops the policy; every later failure yields [`FailoverDecision::Halted`].
    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn exhausted(&self) -> FailoverDecision {
        FailoverDecision::Exhausted {
            last_failure: self
                .last_failure
                .clone()
                .unwrap_or_else(|| "no channel endpoint available".into()),
        }
    }
}
