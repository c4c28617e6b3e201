//! WebSocket write pump: serialises outbound frames.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

/// Writes queued text frames and control messages to the WebSocket.
///
/// Frames already queued when the channel closes are still written, then a
/// close frame is sent.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut frames: mpsc::Receiver<String>,
    mut control: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let msg = tokio::select! {
            biased;
            frame = frames.recv() => match frame {
                Some(text) => {
                    trace!(len = text.len(), "sending frame");
                    tungstenite::Message::Text(text.into())
                }
                None => break,
            },
            Some(m) = control.recv() => m,
            _ = cancel.cancelled() => break,
        };

        if let Err(e) = write.send(msg).await {
            error!("WebSocket write error: {e}");
            return;
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}
