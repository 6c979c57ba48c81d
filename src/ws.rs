//! WebSocket transport
//!
//! Production implementation of the [`Transport`] seam on top of
//! tokio-tungstenite. Each opened link runs a pump task that moves
//! [`LinkCommand`]s onto the socket and socket traffic into
//! [`TransportEvent`]s. Protocol-level pings are answered transparently and
//! never reach the connection layer.

use crate::traits::{
    DuraSockError, Frame, LinkCommand, Result, Transport, TransportEvent, TransportLink,
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport backed by `ws://` / `wss://` connections
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, target: &str) -> Result<TransportLink> {
        let (stream, _) = connect_async(target)
            .await
            .map_err(|e| DuraSockError::Transport(e.to_string()))?;
        debug!(%target, "websocket open");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(pump(stream, command_rx, event_tx));

        Ok(TransportLink {
            commands: command_tx,
            events: event_rx,
        })
    }
}

/// Move frames between the socket and the link channels until either side ends
async fn pump(
    stream: WsStream,
    mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if event_tx
                        .send(TransportEvent::Frame(Frame::Text(text)))
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if event_tx
                        .send(TransportEvent::Frame(Frame::Binary(data)))
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if write.send(Message::Pong(payload)).await.is_err() {
                        let _ = event_tx.send(TransportEvent::Closed {
                            code: None,
                            reason: "pong send failed".into(),
                        });
                        break;
                    }
                }
                Some(Ok(Message::Close(close_frame))) => {
                    let (code, reason) = match close_frame {
                        Some(frame) => (Some(frame.code.into()), frame.reason.to_string()),
                        None => (None, String::new()),
                    };
                    let _ = event_tx.send(TransportEvent::Closed { code, reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read error");
                    let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                    let _ = event_tx.send(TransportEvent::Closed {
                        code: None,
                        reason: e.to_string(),
                    });
                    break;
                }
                None => {
                    let _ = event_tx.send(TransportEvent::Closed {
                        code: None,
                        reason: "stream ended".into(),
                    });
                    break;
                }
            },

            command = command_rx.recv() => match command {
                Some(LinkCommand::Send(frame)) => {
                    let message = match frame {
                        Frame::Text(text) => Message::Text(text),
                        Frame::Binary(data) => Message::Binary(data),
                    };
                    if let Err(e) = write.send(message).await {
                        warn!(error = %e, "websocket write error");
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        let _ = event_tx.send(TransportEvent::Closed {
                            code: None,
                            reason: e.to_string(),
                        });
                        break;
                    }
                }
                Some(LinkCommand::Close { code, reason }) => {
                    let close_frame = CloseFrame {
                        code: code.map(CloseCode::from).unwrap_or(CloseCode::Normal),
                        reason: reason.clone().into(),
                    };
                    let _ = write.send(Message::Close(Some(close_frame))).await;
                    let _ = write.close().await;
                    let _ = event_tx.send(TransportEvent::Closed { code, reason });
                    break;
                }
                None => {
                    // Opener dropped the link
                    let _ = write.close().await;
                    break;
                }
            },
        }
    }

    debug!("websocket pump exiting");
}
