//! WebSocket connector.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{WebSocketStream, tungstenite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use nofile_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::channel::{
    Channel, ConnectFuture, Connector, INBOUND_CAPACITY, OUTBOUND_CAPACITY,
};
use crate::pumps::{read::read_pump, write::write_pump};

/// Opens WebSocket channels with `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    max_message_size: usize,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(WS_MAX_MESSAGE_SIZE)
    }
}

impl WsConnector {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    fn ws_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

impl Connector for WsConnector {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            let (stream, _) =
                tokio_tungstenite::connect_async_with_config(url, Some(self.ws_config()), false)
                    .await?;
            debug!(url, "WebSocket connected");
            Ok(spawn_channel(stream, self.max_message_size))
        })
    }
}

/// Wraps an established WebSocket in a [`Channel`], spawning its pumps.
pub fn spawn_channel<S>(stream: WebSocketStream<S>, max_frame_size: usize) -> Channel
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (write, read) = stream.split();
    let (frames_tx, frames_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let (control_tx, control_rx) = mpsc::channel::<tungstenite::Message>(OUTBOUND_CAPACITY);
    let (events_tx, events_rx) = mpsc::channel(INBOUND_CAPACITY);
    let cancel = CancellationToken::new();

    let writer = tokio::spawn(write_pump(write, frames_rx, control_rx, cancel.clone()));
    let reader = tokio::spawn(read_pump(
        read,
        events_tx,
        control_tx,
        max_frame_size,
        cancel.clone(),
    ));

    Channel::from_parts(frames_tx, events_rx, cancel, Some(reader), Some(writer))
}
