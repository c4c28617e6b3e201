//! Message-oriented duplex channel and the connector seam.
//!
//! A [`Channel`] is a pair of queues: text frames out, [`ChannelEvent`]s in.
//! Transports (WebSocket, in-memory) run their own pump tasks behind it, so
//! the session above only ever sees discrete events.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use crate::memory::ChannelPeer;

/// Queue depth for frames waiting to be written.
pub(crate) const OUTBOUND_CAPACITY: usize = 16;
/// Queue depth for events waiting to be read.
pub(crate) const INBOUND_CAPACITY: usize = 64;

/// Errors from opening or using a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("connection failed: {0}")]
    Open(String),

    #[error("connection closed")]
    Closed,
}

/// Inbound event delivered by a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One text frame from the remote.
    Message(String),
    /// The channel closed; `reason` is the remote's close reason if any.
    Closed { reason: Option<String> },
    /// The transport failed.
    Errored(String),
}

/// One live channel connection.
pub struct Channel {
    outbound: Option<mpsc::Sender<String>>,
    inbound: mpsc::Receiver<ChannelEvent>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Channel {
    pub(crate) fn from_parts(
        outbound: mpsc::Sender<String>,
        inbound: mpsc::Receiver<ChannelEvent>,
        cancel: CancellationToken,
        reader: Option<JoinHandle<()>>,
        writer: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            outbound: Some(outbound),
            inbound,
            cancel,
            reader,
            writer,
        }
    }

    /// Creates an in-process channel and the peer end that plays the remote.
    pub fn pair() -> (Self, ChannelPeer) {
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);
        let channel = Self::from_parts(out_tx, in_rx, CancellationToken::new(), None, None);
        (channel, ChannelPeer::new(out_rx, in_tx))
    }

    /// Queues one text frame.
    pub async fn send(&self, frame: String) -> Result<(), ChannelError> {
        let tx = self.outbound.as_ref().ok_or(ChannelError::Closed)?;
        tx.send(frame).await.map_err(|_| ChannelError::Closed)
    }

    /// Waits for the next inbound event.
    ///
    /// A transport that went away without a close frame reads as
    /// `Closed { reason: None }`.
    pub async fn recv(&mut self) -> ChannelEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or(ChannelEvent::Closed { reason: None })
    }

    /// Closes the channel. Frames already queued are still written.
    pub fn close(&mut self) {
        self.outbound = None;
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_none()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        // The writer exits on its own once the outbound queue drains.
        self.writer.take();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Boxed future returned by [`Connector::connect`].
pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = Result<Channel, ChannelError>> + Send + 'a>>;

/// Opens channels to endpoint URLs.
///
/// Implemented by [`WsConnector`](crate::WsConnector) for real sockets and
/// by [`MemoryConnector`](crate::MemoryConnector) for in-process peers.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a>;
}
