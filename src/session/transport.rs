//! Transport seam between the session driver and the network.
//!
//! Real implementation: [`WsConnector`] over `tokio-tungstenite`. Tests plug
//! in an in-memory connector.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::channel::ABNORMAL_CLOSURE;
use crate::errors::ChannelError;

/// Close code used when the peer's close frame carried none.
const NO_STATUS_RECEIVED: u16 = 1005;

/// One inbound event from a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFrame {
    Text(String),
    Closed { code: u16, reason: String },
    Error(String),
}

/// An established bidirectional text link.
///
/// `recv` must be cancel-safe: the driver polls it inside `select!`.
#[async_trait]
pub trait Link: Send {
    async fn send(&mut self, text: String) -> Result<(), ChannelError>;

    async fn recv(&mut self) -> LinkFrame;

    /// Best-effort close frame.
    async fn close(&mut self, code: u16, reason: &str);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &str) -> Result<Box<dyn Link>, ChannelError>;
}

/// WebSocket connector (`ws://` and `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, target: &str) -> Result<Box<dyn Link>, ChannelError> {
        let (stream, response) = tokio_tungstenite::connect_async(target)
            .await
            .map_err(|e| ChannelError::ConnectFailure {
                target: target.to_string(),
                detail: e.to_string(),
            })?;
        debug!(target, status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WsLink { stream }))
    }
}

pub struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WsLink {
    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ChannelError::Link(e.to_string()))
    }

    async fn recv(&mut self) -> LinkFrame {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return LinkFrame::Text(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return LinkFrame::Text(text),
                    Err(_) => trace!(len = bytes.len(), "non-utf8 binary frame skipped"),
                },
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(frame) => LinkFrame::Closed {
                            code: u16::from(frame.code),
                            reason: frame.reason.as_str().to_owned(),
                        },
                        None => LinkFrame::Closed {
                            code: NO_STATUS_RECEIVED,
                            reason: String::new(),
                        },
                    };
                }
                // Pings are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => return LinkFrame::Error(e.to_string()),
                None => {
                    return LinkFrame::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: String::new(),
                    };
                }
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        let _ = self.stream.close(Some(frame)).await;
    }
}
