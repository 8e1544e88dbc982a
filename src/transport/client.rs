//! The transport client and the supervisor task that owns its connection

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::connector::{CloseReason, Connector, Link, LinkEvent, WsConnector};
use super::events::{EventRegistry, ListenerId, MessageStream};
use super::reconnect::{ReconnectDecision, ReconnectPolicy, ReconnectState};
use crate::config::ClientConfig;
use crate::protocol::payloads::{ConnectionAck, ErrorPayload, RegisterSuccess};
use crate::protocol::{Message, MessageType};
use crate::{RelayError, Result};

/// Observable connection state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected { client_id: u64 },
    /// Waiting for or running automatic attempt `attempt`.
    Reconnecting { attempt: u32 },
    /// Automatic reconnection gave up. Only `reconnect()` leaves this state.
    Failed,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }

    pub fn client_id(&self) -> Option<u64> {
        match self {
            ConnectionStatus::Connected { client_id } => Some(*client_id),
            _ => None,
        }
    }
}

enum Command {
    Connect { reply: oneshot::Sender<Result<u64>> },
    Disconnect { reply: oneshot::Sender<()> },
    Reconnect { reply: oneshot::Sender<Result<u64>> },
    Send(Message),
}

/// Duplex messaging to one hub with heartbeat and bounded reconnection.
///
/// All connection state lives in a supervisor task; this handle only sends
/// it commands, so it is cheap to clone and every method takes `&self`.
/// Inbound messages other than the protocol's system messages are delivered
/// to listeners registered with [`on`](Self::on) and to
/// [`subscribe`](Self::subscribe) streams. The client also emits the local
/// events `connected`, `disconnected` and `reconnect_failed`.
///
/// ```rust,no_run
/// use simrelay::config::ClientConfig;
/// use simrelay::transport::TransportClient;
///
/// # async fn run() -> simrelay::Result<()> {
/// let client = TransportClient::websocket(ClientConfig::default());
/// client.on("robot_state_update", |message| {
///     println!("{:?}", message.data());
///     Ok(())
/// });
/// let client_id = client.connect().await?;
/// println!("connected as {client_id}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TransportClient {
    commands: mpsc::UnboundedSender<Command>,
    events: Arc<EventRegistry>,
    status: watch::Receiver<ConnectionStatus>,
    cancel: CancellationToken,
}

impl TransportClient {
    /// Spawn the supervisor task. Must be called inside a tokio runtime.
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ConnectionStatus::Disconnected);
        let events = Arc::new(EventRegistry::new());
        let cancel = CancellationToken::new();

        let supervisor = Supervisor {
            policy: ReconnectPolicy::from(&config),
            config,
            connector,
            events: events.clone(),
            status: status_tx,
            reconnect: ReconnectState::default(),
            link: None,
            heartbeat: None,
            retry_at: None,
        };
        let supervisor_cancel = cancel.clone();
        tokio::spawn(async move {
            supervisor.run(receiver, supervisor_cancel).await;
        });

        Self { commands, events, status, cancel }
    }

    /// Client for the WebSocket endpoint in `config.url`.
    pub fn websocket(config: ClientConfig) -> Self {
        let connector = Arc::new(WsConnector::new(config.url.clone()));
        Self::new(config, connector)
    }

    /// Open the connection and register. Resolves with the hub-assigned id
    /// once the hub acknowledged, or fails if the handshake does. After
    /// automatic reconnection gave up this fails with
    /// [`RelayError::ReconnectExhausted`] until [`reconnect`](Self::reconnect).
    pub async fn connect(&self) -> Result<u64> {
        let (reply, result) = oneshot::channel();
        self.command(Command::Connect { reply })?;
        result.await.map_err(|_| RelayError::Disconnected)?
    }

    /// Close gracefully and suppress automatic reconnection.
    pub async fn disconnect(&self) {
        let (reply, done) = oneshot::channel();
        if self.command(Command::Disconnect { reply }).is_ok() {
            let _ = done.await;
        }
    }

    /// Reset the attempt budget and connect again, also after exhaustion.
    pub async fn reconnect(&self) -> Result<u64> {
        let (reply, result) = oneshot::channel();
        self.command(Command::Reconnect { reply })?;
        result.await.map_err(|_| RelayError::Disconnected)?
    }

    /// Send a message. Logs and drops it when not connected.
    pub fn send_message(&self, message: Message) {
        if !self.is_connected() {
            warn!(kind = message.kind(), "Not connected, dropping outbound message");
            return;
        }
        if self.command(Command::Send(message)).is_err() {
            warn!("Client is shut down, dropping outbound message");
        }
    }

    /// Serialise `payload` and send it as `kind`.
    pub fn send<T: Serialize>(&self, kind: MessageType, payload: &T) {
        match Message::with_payload(kind, payload) {
            Ok(message) => self.send_message(message),
            Err(e) => error!(kind = kind.as_str(), "Cannot encode outbound payload: {}", e),
        }
    }

    pub fn on<F>(&self, kind: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Message) -> Result<()> + Send + Sync + 'static,
    {
        self.events.on(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    pub fn subscribe(&self, kind: impl Into<String>) -> MessageStream {
        self.events.subscribe(kind)
    }

    pub fn events(&self) -> &Arc<EventRegistry> {
        &self.events
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    pub fn client_id(&self) -> Option<u64> {
        self.status.borrow().client_id()
    }

    /// Stop the supervisor, closing any open connection. Affects all clones.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| RelayError::Disconnected)
    }
}

struct Supervisor {
    config: ClientConfig,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    events: Arc<EventRegistry>,
    status: watch::Sender<ConnectionStatus>,
    reconnect: ReconnectState,
    link: Option<Box<dyn Link>>,
    heartbeat: Option<Interval>,
    retry_at: Option<Instant>,
}

impl Supervisor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
        debug!(endpoint = %self.connector.describe(), "Transport supervisor started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                event = next_event(self.link.as_mut()) => self.on_link_event(event),
                _ = next_tick(self.heartbeat.as_mut()) => self.send_heartbeat().await,
                _ = until(self.retry_at) => self.retry().await,
            }
        }

        self.retry_at = None;
        self.drop_link(CloseReason::normal("client shutdown")).await;
        self.status.send_replace(ConnectionStatus::Disconnected);
        debug!("Transport supervisor ended");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => {
                let current = self.status.borrow().client_id();
                let result = match current {
                    Some(client_id) if self.link.is_some() => Ok(client_id),
                    _ if self.reconnect.is_exhausted() => {
                        warn!("Automatic reconnection gave up; use reconnect() to start over");
                        Err(RelayError::ReconnectExhausted { attempts: self.reconnect.attempts() })
                    }
                    _ => {
                        self.reconnect.on_connect_requested();
                        self.retry_at = None;
                        self.establish(ConnectionStatus::Connecting).await
                    }
                };
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                self.reconnect.on_manual_disconnect();
                self.retry_at = None;
                if self.link.is_some() {
                    self.drop_link(CloseReason::normal("client disconnect")).await;
                    info!("Disconnected from hub");
                    self.emit(
                        MessageType::Disconnected,
                        json!({"code": CloseReason::NORMAL, "reason": "client disconnect"}),
                    );
                }
                self.status.send_replace(ConnectionStatus::Disconnected);
                let _ = reply.send(());
            }
            Command::Reconnect { reply } => {
                self.retry_at = None;
                self.drop_link(CloseReason::normal("client reconnect")).await;
                self.reconnect.on_manual_reconnect();
                info!("Manual reconnect requested");
                let _ = reply.send(self.establish(ConnectionStatus::Connecting).await);
            }
            Command::Send(message) => self.send(&message).await,
        }
    }

    /// Open a link and wait for the hub's acknowledgment. On failure the
    /// status returns to `Disconnected` and no retry is scheduled here.
    async fn establish(&mut self, pending: ConnectionStatus) -> Result<u64> {
        self.status.send_replace(pending);
        let limit = self.config.handshake_timeout();
        let opened = timeout(limit, open_link(self.connector.as_ref(), &self.config, &self.events))
            .await
            .unwrap_or(Err(RelayError::Timeout { duration: limit }));

        match opened {
            Ok((link, client_id)) => {
                self.link = Some(link);
                let period = self.config.heartbeat_interval();
                let mut heartbeat = interval_at(Instant::now() + period, period);
                heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.heartbeat = Some(heartbeat);
                self.reconnect.on_connected();
                self.status.send_replace(ConnectionStatus::Connected { client_id });
                info!(client_id, endpoint = %self.connector.describe(), "Connected to hub");
                self.emit(MessageType::Connected, json!({"clientId": client_id}));
                Ok(client_id)
            }
            Err(e) => {
                warn!(endpoint = %self.connector.describe(), "Connection attempt failed: {}", e);
                self.status.send_replace(ConnectionStatus::Disconnected);
                Err(e)
            }
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Text(text) => self.on_text(&text),
            LinkEvent::Closed(reason) => {
                self.link = None;
                self.heartbeat = None;
                warn!(code = reason.code, reason = %reason.reason, "Connection to hub lost");
                self.emit(
                    MessageType::Disconnected,
                    json!({"code": reason.code, "reason": reason.reason}),
                );
                let decision = self.reconnect.on_unexpected_close(&self.policy);
                self.apply(decision);
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        match Message::decode(text) {
            Ok(message) => handle_inbound(&self.events, message),
            Err(e) => warn!("Dropping malformed inbound frame: {}", e),
        }
    }

    async fn retry(&mut self) {
        self.retry_at = None;
        let attempt = self.reconnect.attempts();
        info!(attempt, max = self.policy.max_attempts, "Reconnecting to hub");
        if self.establish(ConnectionStatus::Reconnecting { attempt }).await.is_err() {
            let decision = self.reconnect.on_attempt_failed(&self.policy);
            self.apply(decision);
        }
    }

    fn apply(&mut self, decision: ReconnectDecision) {
        match decision {
            ReconnectDecision::Retry { attempt, delay } => {
                debug!(attempt, ?delay, "Scheduling reconnect");
                self.retry_at = Some(Instant::now() + delay);
                self.status.send_replace(ConnectionStatus::Reconnecting { attempt });
            }
            ReconnectDecision::Exhausted { attempts } => {
                error!(attempts, "Giving up on automatic reconnection");
                self.status.send_replace(ConnectionStatus::Failed);
                self.emit(MessageType::ReconnectFailed, json!({"attempts": attempts}));
            }
            ReconnectDecision::Suppressed => {
                if !self.reconnect.is_exhausted() {
                    self.status.send_replace(ConnectionStatus::Disconnected);
                }
            }
        }
    }

    async fn send(&mut self, message: &Message) {
        let Some(link) = self.link.as_mut() else {
            warn!(kind = message.kind(), "Not connected, dropping outbound message");
            return;
        };
        match message.encode() {
            Ok(text) => {
                trace!(kind = message.kind(), "Sending");
                if let Err(e) = link.send_text(text).await {
                    warn!(kind = message.kind(), "Send failed: {}", e);
                }
            }
            Err(e) => error!(kind = message.kind(), "Cannot encode outbound message: {}", e),
        }
    }

    async fn send_heartbeat(&mut self) {
        trace!("Heartbeat");
        self.send(&Message::heartbeat()).await;
    }

    async fn drop_link(&mut self, reason: CloseReason) {
        self.heartbeat = None;
        if let Some(mut link) = self.link.take() {
            link.close(reason).await;
        }
    }

    fn emit(&self, kind: MessageType, data: serde_json::Value) {
        self.events.dispatch(&Message::new(kind.as_str(), data));
    }
}

/// Connect, register and wait for the `connection` acknowledgment.
async fn open_link(
    connector: &dyn Connector,
    config: &ClientConfig,
    events: &EventRegistry,
) -> Result<(Box<dyn Link>, u64)> {
    let mut link = connector.connect().await?;

    let register = Message::with_payload(MessageType::Register, &config.identity())?;
    link.send_text(register.encode()?).await?;

    loop {
        match link.next_event().await {
            LinkEvent::Text(text) => {
                let message = match Message::decode(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Dropping malformed frame during handshake: {}", e);
                        continue;
                    }
                };
                if message.message_type() == Some(MessageType::Connection) {
                    let ack: ConnectionAck = message.payload()?;
                    return Ok((link, ack.client_id));
                }
                handle_inbound(events, message);
            }
            LinkEvent::Closed(reason) => {
                return Err(RelayError::handshake_failed(format!(
                    "closed before acknowledgment ({} {})",
                    reason.code, reason.reason
                )));
            }
        }
    }
}

/// Handle system messages internally and hand everything else to listeners.
/// Hub `error` messages are logged and also dispatched.
fn handle_inbound(events: &EventRegistry, message: Message) {
    match message.message_type() {
        Some(MessageType::Connection) => {
            debug!(data = %message.data(), "Repeated connection acknowledgment ignored");
        }
        Some(MessageType::RegisterSuccess) => match message.payload::<RegisterSuccess>() {
            Ok(ack) => info!(client_id = ack.client_id, name = %ack.name, "Registered with hub"),
            Err(e) => warn!("Malformed register_success: {}", e),
        },
        Some(MessageType::HeartbeatResponse) => trace!("Heartbeat acknowledged"),
        Some(MessageType::Error) => {
            match message.payload::<ErrorPayload>() {
                Ok(error) => warn!(code = ?error.code, "Hub reported error: {}", error.message),
                Err(_) => warn!(data = %message.data(), "Hub reported error"),
            }
            events.dispatch(&message);
        }
        _ => {
            events.dispatch(&message);
        }
    }
}

async fn next_event(link: Option<&mut Box<dyn Link>>) -> LinkEvent {
    match link {
        Some(link) => link.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(heartbeat: Option<&mut Interval>) {
    match heartbeat {
        Some(heartbeat) => {
            heartbeat.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
