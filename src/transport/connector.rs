//! Transport seam between the client and whatever carries its frames
//!
//! A [`Connector`] opens one [`Link`] per connection attempt. The WebSocket
//! connector talks to a hub over the network; the hub connector attaches to
//! a hub running in the same process.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::hub::{HubConnection, HubHandle, Outgoing};
use crate::{RelayError, Result};

/// Why a link closed, in WebSocket close-code terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const NO_STATUS: u16 = 1005;
    pub const ABNORMAL: u16 = 1006;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into() }
    }

    /// Graceful close initiated by this side.
    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(Self::NORMAL, reason)
    }

    /// The transport broke without a close handshake.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(Self::ABNORMAL, reason)
    }
}

/// What a link produced next.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Text(String),
    Closed(CloseReason),
}

/// One open duplex connection.
///
/// `next_event` must be cancel safe: the client polls it inside `select!`.
/// After it returned [`LinkEvent::Closed`] the link is discarded.
#[async_trait]
pub trait Link: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    async fn next_event(&mut self) -> LinkEvent;

    async fn close(&mut self, reason: CloseReason);
}

/// Opens links to one hub endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Link>>;

    /// Endpoint description for logs.
    fn describe(&self) -> String;
}

/// Connects over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Link>> {
        let (socket, response) =
            tokio_tungstenite::connect_async(self.url.as_str()).await.map_err(|e| {
                RelayError::connection_failed_with_source(
                    format!("cannot reach {}", self.url),
                    Box::new(e),
                )
            })?;
        debug!(url = %self.url, status = %response.status(), "WebSocket opened");
        Ok(Box::new(WsLink { socket }))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

struct WsLink {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WsLink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.socket.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> LinkEvent {
        loop {
            match self.socket.next().await {
                Some(Ok(WsMessage::Text(text))) => return LinkEvent::Text(text),
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return LinkEvent::Text(text),
                    Err(_) => warn!("Dropping non UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    let reason = frame
                        .map(|f| CloseReason::new(u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or_else(|| CloseReason::new(CloseReason::NO_STATUS, ""));
                    return LinkEvent::Closed(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return LinkEvent::Closed(CloseReason::abnormal(e.to_string())),
                None => return LinkEvent::Closed(CloseReason::abnormal("stream ended")),
            }
        }
    }

    async fn close(&mut self, reason: CloseReason) {
        let frame = CloseFrame { code: CloseCode::from(reason.code), reason: reason.reason.into() };
        if let Err(e) = self.socket.close(Some(frame)).await {
            debug!("Close handshake failed: {}", e);
        }
    }
}

/// Attaches to a hub running in this process.
#[derive(Clone)]
pub struct HubConnector {
    hub: HubHandle,
}

impl HubConnector {
    pub fn new(hub: HubHandle) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Connector for HubConnector {
    async fn connect(&self) -> Result<Box<dyn Link>> {
        let connection = self.hub.attach().await?;
        Ok(Box::new(HubLink { connection }))
    }

    fn describe(&self) -> String {
        "in-process hub".to_string()
    }
}

struct HubLink {
    connection: HubConnection,
}

#[async_trait]
impl Link for HubLink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.connection.push_text(text)
    }

    async fn next_event(&mut self) -> LinkEvent {
        match self.connection.recv().await {
            Some(Outgoing::Text(text)) => LinkEvent::Text(text),
            Some(Outgoing::Close) => {
                LinkEvent::Closed(CloseReason::new(CloseReason::GOING_AWAY, "closed by hub"))
            }
            None => LinkEvent::Closed(CloseReason::abnormal("hub dropped the connection")),
        }
    }

    async fn close(&mut self, _reason: CloseReason) {
        self.connection.detach();
    }
}
