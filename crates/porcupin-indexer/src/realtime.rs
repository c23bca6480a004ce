use futures_util::StreamExt;
use porcupin_core::PorcupinError;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::model::RealtimeEvent;

/// Receiving end handed to the caller; `events_rx` yields parsed events as
/// they arrive over the socket.
pub struct RealtimeHandle {
    pub events_rx: mpsc::Receiver<RealtimeEvent>,
}

/// One realtime subscription to the indexer's push channel.
///
/// `run_once` drives a single connection to completion and returns when it
/// drops — mirroring the teacher's `P2pNetwork`, the restart/backoff policy
/// across repeated connection attempts belongs to the caller, not here.
pub struct RealtimeSubscriber {
    url: String,
    events_tx: mpsc::Sender<RealtimeEvent>,
}

impl RealtimeSubscriber {
    pub fn connect(url: impl Into<String>) -> (Self, RealtimeHandle) {
        let (events_tx, events_rx) = mpsc::channel(256);
        (
            Self {
                url: url.into(),
                events_tx,
            },
            RealtimeHandle { events_rx },
        )
    }

    pub async fn run_once(&self) -> Result<(), PorcupinError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|e| PorcupinError::Network(e.to_string()))?;
        let (_write, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| PorcupinError::Network(e.to_string()))?;
            let text = match msg {
                Message::Text(t) => t,
                Message::Binary(b) => String::from_utf8_lossy(&b).into_owned(),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                Message::Close(_) => break,
            };

            match serde_json::from_str::<RealtimeEvent>(&text) {
                Ok(event) => {
                    if self.events_tx.send(event).await.is_err() {
                        debug!("realtime event receiver dropped, stopping subscriber");
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to parse realtime event"),
            }
        }

        Ok(())
    }
}
