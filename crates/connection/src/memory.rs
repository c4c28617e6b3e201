//! In-process connector for driving the protocol without a network.
//!
//! Every successful [`MemoryConnector::connect`] hands the remote end of a
//! fresh [`Channel::pair`] to the [`MemoryListener`], where a scripted
//! remote reads request frames and answers with frames or closures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::channel::{Channel, ChannelError, ChannelEvent, ConnectFuture, Connector};

/// Remote end of an in-process channel.
#[derive(Debug)]
pub struct ChannelPeer {
    frames: mpsc::Receiver<String>,
    events: mpsc::Sender<ChannelEvent>,
}

impl ChannelPeer {
    pub(crate) fn new(frames: mpsc::Receiver<String>, events: mpsc::Sender<ChannelEvent>) -> Self {
        Self { frames, events }
    }

    /// Next frame the local side sent; `None` once it closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.frames.recv().await
    }

    /// A frame already queued by the local side, without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.frames.try_recv().ok()
    }

    /// Sends one text frame. Returns `false` if the local side is gone.
    pub async fn reply(&self, text: impl Into<String>) -> bool {
        self.events
            .send(ChannelEvent::Message(text.into()))
            .await
            .is_ok()
    }

    /// Closes from the remote side.
    pub async fn close(self, reason: Option<&str>) {
        let _ = self
            .events
            .send(ChannelEvent::Closed {
                reason: reason.map(str::to_string),
            })
            .await;
    }

    /// Fails the transport from the remote side.
    pub async fn error(self, message: &str) {
        let _ = self
            .events
            .send(ChannelEvent::Errored(message.to_string()))
            .await;
    }
}

#[derive(Default)]
struct MemoryState {
    attempts: Vec<(String, Instant)>,
    refusals: HashMap<String, usize>,
}

/// [`Connector`] backed by in-process channel pairs.
#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
    accepted: mpsc::UnboundedSender<(String, ChannelPeer)>,
}

/// Receives the remote ends of accepted connections.
pub struct MemoryListener {
    accepted: mpsc::UnboundedReceiver<(String, ChannelPeer)>,
}

impl MemoryListener {
    /// Next accepted connection with the URL it was opened for.
    pub async fn accept(&mut self) -> Option<(String, ChannelPeer)> {
        self.accepted.recv().await
    }
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            accepted: tx,
        };
        (connector, MemoryListener { accepted: rx })
    }

    /// Refuses every connection to `url`.
    pub fn refuse(&self, url: &str) {
        self.refuse_times(url, usize::MAX);
    }

    /// Refuses the next `times` connections to `url`.
    pub fn refuse_times(&self, url: &str, times: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.refusals.insert(url.to_string(), times);
        }
    }

    /// Every connect attempt so far, with the (virtual) time it was made.
    pub fn attempts(&self) -> Vec<(String, Instant)> {
        self.state
            .lock()
            .map(|s| s.attempts.clone())
            .unwrap_or_default()
    }

    fn admit(&self, url: &str) -> Result<(), ChannelError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChannelError::Open("connector state poisoned".into()))?;
        state.attempts.push((url.to_string(), Instant::now()));
        match state.refusals.get_mut(url) {
            Some(left) if *left > 0 => {
                if *left != usize::MAX {
                    *left -= 1;
                }
                Err(ChannelError::Open("connection refused".into()))
            }
            _ => Ok(()),
        }
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            self.admit(url)?;
            let (channel, peer) = Channel::pair();
            self.accepted
                .send((url.to_string(), peer))
                .map_err(|_| ChannelError::Open("no listener".into()))?;
            Ok(channel)
        })
    }
}
