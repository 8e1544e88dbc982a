//! WebSocket front end and the handle used to drive a running hub

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::{HubConnection, Outgoing};
use super::core::{HubCommand, HubCore};
use crate::config::HubConfig;
use crate::source::SequenceSource;
use crate::sources;
use crate::types::ClientInfo;
use crate::{RelayError, Result};

/// A relay hub bound to a TCP listener but not yet serving.
pub struct RelayHub {
    listener: TcpListener,
    config: HubConfig,
    source: Box<dyn SequenceSource>,
}

impl RelayHub {
    /// Bind the configured listen address. The sequence source comes from
    /// the configuration unless replaced with [`with_source`](Self::with_source).
    pub async fn bind(config: HubConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_address).await.map_err(|e| {
            RelayError::connection_failed_with_source(
                format!("cannot bind {}", config.listen_address),
                Box::new(e),
            )
        })?;
        let source = sources::from_config(&config.sequence);
        Ok(Self { listener, config, source })
    }

    pub fn with_source(mut self, source: Box<dyn SequenceSource>) -> Self {
        self.source = source;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the hub loop and the accept loop.
    pub fn spawn(self) -> Result<HubHandle> {
        let local_addr = self.local_addr()?;
        let handle = HubHandle::start(self.config, self.source);
        let accept_handle = handle.clone();

        tokio::spawn(async move {
            accept_loop(self.listener, accept_handle).await;
        });

        info!("Relay hub listening on ws://{}", local_addr);
        Ok(HubHandle { local_addr: Some(local_addr), ..handle })
    }
}

/// Cloneable handle to a running hub loop.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
    cancel: CancellationToken,
    local_addr: Option<SocketAddr>,
}

impl HubHandle {
    /// Start a hub loop without any network listener. Clients attach in
    /// process through [`attach`](Self::attach).
    pub fn start(config: HubConfig, source: Box<dyn SequenceSource>) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let core = HubCore::new(config, source, commands.clone());

        let loop_cancel = cancel.clone();
        tokio::spawn(async move {
            core.run(receiver, loop_cancel).await;
        });

        Self { commands, cancel, local_addr: None }
    }

    /// Attach an in-process client. The hub sends `connection` right away.
    pub async fn attach(&self) -> Result<HubConnection> {
        HubConnection::attach(self.commands.clone()).await
    }

    /// Snapshot of the connected clients.
    pub async fn clients(&self) -> Result<Vec<ClientInfo>> {
        let (reply, snapshot) = oneshot::channel();
        self.commands
            .send(HubCommand::Clients { reply })
            .map_err(|_| RelayError::connection_failed("hub is shut down"))?;
        snapshot.await.map_err(|_| RelayError::connection_failed("hub is shut down"))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// WebSocket URL clients should connect to, when listening.
    pub fn url(&self) -> Option<String> {
        self.local_addr.map(|addr| format!("ws://{addr}"))
    }

    /// Close every connection, cancel every timer and stop the loops.
    pub fn shutdown(&self) {
        info!("Shutting down relay hub");
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once [`shutdown`](Self::shutdown) was called.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

async fn accept_loop(listener: TcpListener, hub: HubHandle) {
    loop {
        let accepted = tokio::select! {
            _ = hub.closed() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let hub = hub.clone();
                tokio::spawn(async move {
                    serve_socket(stream, peer, hub).await;
                });
            }
            Err(e) => {
                error!("Accept failed: {}", e);
            }
        }
    }
    debug!("Accept loop ended");
}

async fn serve_socket(stream: TcpStream, peer: SocketAddr, hub: HubHandle) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!(%peer, "WebSocket handshake failed: {}", e);
            return;
        }
    };
    let (mut sink, mut source) = socket.split();

    let mut connection = match hub.attach().await {
        Ok(connection) => connection,
        Err(e) => {
            warn!(%peer, "Rejecting connection: {}", e);
            let _ = sink.close().await;
            return;
        }
    };
    let client_id = connection.client_id();
    debug!(%peer, client_id, "WebSocket session started");

    loop {
        tokio::select! {
            outgoing = connection.recv() => match outgoing {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        debug!(client_id, "Send failed: {}", e);
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let frame = CloseFrame { code: CloseCode::Away, reason: "closed by hub".into() };
                    let _ = sink.send(WsMessage::Close(Some(frame))).await;
                    break;
                }
            },
            inbound = source.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    if connection.push_text(text).is_err() {
                        break;
                    }
                }
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        if connection.push_text(text).is_err() {
                            break;
                        }
                    }
                    Err(_) => warn!(client_id, "Dropping non UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(client_id, ?frame, "Client closed connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(client_id, "Transport error: {}", e);
                    break;
                }
                None => break,
            },
        }
    }

    connection.detach();
    debug!(%peer, client_id, "WebSocket session ended");
}
