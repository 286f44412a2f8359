use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use crate::models::{ClientEvent, ServerEvent};

use super::session::RoomTransport;
use super::RtcError;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// WebSocket transport for a room's live channel.
///
/// Connect with the room URL including the auth token, e.g.
/// `ws://host:3000/api/v1/rooms/ABC123/ws?token=...`. Inbound server
/// events arrive on the returned receiver; the session drains it on its
/// own event loop.
pub struct WsRoomTransport {
    sink: Mutex<WsSink>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WsRoomTransport {
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>), RtcError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| RtcError::Transport(format!("Failed to connect: {}", e)))?;
        info!("Connected to live channel");

        let (sink, mut source) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Live channel read error: {}", e);
                        break;
                    }
                };
                if let Message::Text(text) = message {
                    match serde_json::from_str::<ServerEvent>(text.as_str()) {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Unparseable server event: {}", e),
                    }
                }
            }
            info!("Live channel reader finished");
        });

        Ok((
            Self {
                sink: Mutex::new(sink),
                reader: Mutex::new(Some(reader)),
            },
            rx,
        ))
    }
}

#[async_trait]
impl RoomTransport for WsRoomTransport {
    async fn publish(&self, event: ClientEvent) -> Result<(), RtcError> {
        let text = serde_json::to_string(&event)
            .map_err(|e| RtcError::Transport(format!("Failed to encode event: {}", e)))?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| RtcError::Transport(format!("Failed to send event: {}", e)))
    }

    async fn close(&self) -> Result<(), RtcError> {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        self.sink
            .lock()
            .await
            .send(Message::Close(None))
            .await
            .map_err(|e| RtcError::Transport(format!("Failed to close: {}", e)))
    }
}
