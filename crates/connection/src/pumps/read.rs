//! WebSocket read pump: turns socket messages into channel events.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::channel::ChannelEvent;

/// Reads messages from the WebSocket and forwards them as [`ChannelEvent`]s.
///
/// Pings are answered through `control`. Exactly one terminal event
/// (`Closed` or `Errored`) is emitted unless the pump is cancelled.
pub(crate) async fn read_pump<S>(
    mut read: S,
    events: mpsc::Sender<ChannelEvent>,
    control: mpsc::Sender<tungstenite::Message>,
    max_frame_size: usize,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return,
            msg = read.next() => msg,
        };

        let event = match msg {
            Some(Ok(tungstenite::Message::Text(text))) => {
                if text.len() > max_frame_size {
                    warn!(len = text.len(), "frame too large, dropping");
                    continue;
                }
                trace!(len = text.len(), "received frame");
                ChannelEvent::Message(text.as_str().to_owned())
            }
            Some(Ok(tungstenite::Message::Ping(data))) => {
                trace!("received ping, sending pong");
                let _ = control.send(tungstenite::Message::Pong(data)).await;
                continue;
            }
            Some(Ok(tungstenite::Message::Close(frame))) => {
                debug!("received close frame");
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty());
                let _ = events.send(ChannelEvent::Closed { reason }).await;
                return;
            }
            Some(Ok(_)) => continue, // Binary, Pong, raw frames
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket read error");
                let _ = events.send(ChannelEvent::Errored(e.to_string())).await;
                return;
            }
            None => {
                debug!("WebSocket stream ended");
                let _ = events.send(ChannelEvent::Closed { reason: None }).await;
                return;
            }
        };

        if events.send(event).await.is_err() {
            // Channel dropped; nobody is listening.
            return;
        }
    }
}
