//! The hub's single event loop
//!
//! [`HubCore`] owns the roster and the scheduler and is only ever touched
//! from the task running [`HubCore::run`]. Connections, scheduled deliveries,
//! finished sequence loads and the liveness sweep all reach it as
//! [`HubCommand`]s, so every roster mutation happens on one task and needs no
//! locking. Sequence sources may block, so they are loaded on the blocking
//! pool and never on the loop itself.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::connection::Outgoing;
use super::roster::Roster;
use super::scheduler::{ScheduleTicket, SequenceScheduler};
use crate::config::HubConfig;
use crate::protocol::{ErrorCode, Message, MessageType};
use crate::source::SequenceSource;
use crate::types::{ActionSequence, ClientIdentity, ClientInfo, timestamp_ms};
use crate::{RelayError, Result};

/// Everything the hub loop reacts to.
#[derive(Debug)]
pub enum HubCommand {
    /// A transport opened; reply with the assigned client id.
    Attach { outbound: mpsc::UnboundedSender<Outgoing>, reply: oneshot::Sender<u64> },
    /// One inbound text frame from a client.
    Inbound { client_id: u64, text: String },
    /// The client's transport closed. Safe to send more than once.
    Detach { client_id: u64 },
    /// A scheduled delivery came due.
    Deliver { client_id: u64, ticket: ScheduleTicket, message: Message, last: bool },
    /// A sequence load started by `test_sequence_request` finished.
    SequenceLoaded { client_id: u64, load_id: u64, result: Result<ActionSequence> },
    /// Roster snapshot request.
    Clients { reply: oneshot::Sender<Vec<ClientInfo>> },
}

/// Roster, router and scheduler state of one hub.
pub struct HubCore {
    config: HubConfig,
    roster: Roster,
    scheduler: SequenceScheduler,
    source: Arc<dyn SequenceSource>,
    commands: mpsc::UnboundedSender<HubCommand>,
    /// Latest load id per client; older loads finishing later are dropped.
    loading: HashMap<u64, u64>,
    next_load: u64,
}

impl HubCore {
    pub fn new(
        config: HubConfig,
        source: Box<dyn SequenceSource>,
        commands: mpsc::UnboundedSender<HubCommand>,
    ) -> Self {
        Self {
            config,
            roster: Roster::new(),
            scheduler: SequenceScheduler::new(),
            source: Arc::from(source),
            commands,
            loading: HashMap::new(),
            next_load: 0,
        }
    }

    /// Process commands and sweep for stale clients until cancelled.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<HubCommand>,
        cancel: CancellationToken,
    ) {
        info!(
            sequence_source = %self.source.describe(),
            heartbeat_timeout = ?self.config.heartbeat_timeout(),
            "Hub loop started"
        );

        let period = self.config.sweep_interval();
        let mut sweep = interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = sweep.tick() => {
                    self.sweep(Instant::now());
                }
            }
        }

        self.shutdown();
        info!("Hub loop ended");
    }

    pub fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Attach { outbound, reply } => {
                let client_id = self.attach(outbound);
                if reply.send(client_id).is_err() {
                    self.detach(client_id);
                }
            }
            HubCommand::Inbound { client_id, text } => self.on_inbound(client_id, &text),
            HubCommand::Detach { client_id } => self.detach(client_id),
            HubCommand::Deliver { client_id, ticket, message, last } => {
                self.deliver(client_id, ticket, message, last)
            }
            HubCommand::SequenceLoaded { client_id, load_id, result } => {
                self.on_sequence_loaded(client_id, load_id, result)
            }
            HubCommand::Clients { reply } => {
                let _ = reply.send(self.roster.snapshot());
            }
        }
    }

    fn attach(&mut self, outbound: mpsc::UnboundedSender<Outgoing>) -> u64 {
        let client_id = self.roster.add(outbound);
        info!(client_id, connected = self.roster.len(), "Client connected");
        self.send_to(client_id, &Message::connection(client_id));
        client_id
    }

    /// Remove a client and cancel its scheduled deliveries. Idempotent.
    fn detach(&mut self, client_id: u64) {
        if self.roster.remove(client_id).is_some() {
            self.loading.remove(&client_id);
            let cancelled = self.scheduler.cancel_all(client_id);
            info!(client_id, cancelled, connected = self.roster.len(), "Client disconnected");
        } else {
            trace!(client_id, "Detach for unknown client ignored");
        }
    }

    /// Evict every client whose heartbeat is older than the timeout.
    /// Returns the evicted ids.
    pub fn sweep(&mut self, now: Instant) -> Vec<u64> {
        let stale = self.roster.stale(now, self.config.heartbeat_timeout());
        for &client_id in &stale {
            if let Some(record) = self.roster.remove(client_id) {
                warn!(
                    client_id,
                    age = ?record.heartbeat_age(now),
                    "Heartbeat timeout, evicting client"
                );
                record.close();
                self.loading.remove(&client_id);
                self.scheduler.cancel_all(client_id);
            }
        }
        stale
    }

    fn deliver(&mut self, client_id: u64, ticket: ScheduleTicket, message: Message, last: bool) {
        if ticket.token.is_cancelled() {
            trace!(client_id, kind = message.kind(), "Dropping delivery of cancelled sequence");
            return;
        }
        if last {
            self.scheduler.finish(client_id, ticket.id);
        }
        if self.roster.contains(client_id) {
            self.send_to(client_id, &message);
        }
    }

    fn on_inbound(&mut self, client_id: u64, text: &str) {
        if !self.roster.contains(client_id) {
            debug!(client_id, "Inbound frame from detached client ignored");
            return;
        }

        let message = match Message::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(client_id, "Dropping malformed frame: {}", e);
                self.send_to(client_id, &Message::error(ErrorCode::InvalidMessage, e.to_string()));
                return;
            }
        };

        trace!(client_id, kind = message.kind(), "Routing message");
        if let Err(e) = self.route(client_id, &message) {
            warn!(client_id, kind = message.kind(), "Failed to handle message: {}", e);
            let code = match e {
                RelayError::Protocol { .. } | RelayError::Serialization(_) => {
                    ErrorCode::InvalidMessage
                }
                _ => ErrorCode::InternalError,
            };
            self.send_to(client_id, &Message::error(code, e.to_string()));
        }
    }

    fn route(&mut self, client_id: u64, message: &Message) -> Result<()> {
        match message.message_type() {
            Some(MessageType::Register) => {
                let identity: ClientIdentity = message.payload()?;
                info!(client_id, client_type = %identity.client_type, name = %identity.name, "Client registered");
                if let Some(record) = self.roster.register(client_id, identity) {
                    let reply = Message::register_success(client_id, record.client_type, &record.name);
                    record.send(&reply);
                }
            }
            Some(MessageType::Heartbeat) => {
                self.roster.touch(client_id);
                self.send_to(client_id, &Message::heartbeat_response());
            }
            Some(MessageType::RobotState) => {
                let data = tag_source(message, client_id)?;
                self.broadcast_except(
                    client_id,
                    &Message::new(MessageType::RobotStateUpdate.as_str(), data),
                );
            }
            Some(MessageType::JointControl) => {
                let data = tag_source(message, client_id)?;
                self.send_to(client_id, &Message::new(MessageType::JointControlCommand.as_str(), data));
            }
            Some(MessageType::GetClients) => {
                self.send_to(client_id, &Message::clients_list(self.roster.snapshot()));
            }
            Some(MessageType::ResetRobot) => {
                info!(client_id, "Reset requested");
                self.send_to(client_id, &Message::control_echo(MessageType::ResetRobot, client_id, None));
            }
            Some(MessageType::EmergencyStop) => {
                warn!(client_id, "Emergency stop requested");
                let echo = Message::control_echo(MessageType::EmergencyStop, client_id, Some(timestamp_ms()));
                self.send_to(client_id, &echo);
            }
            Some(MessageType::TestSequenceRequest) => self.start_sequence(client_id),
            Some(MessageType::StopSequenceRequest) => self.stop_sequence(client_id, "stop requested"),
            _ => {
                warn!(client_id, kind = message.kind(), "Unknown message type");
                self.send_to(
                    client_id,
                    &Message::error(
                        ErrorCode::UnknownMessageType,
                        format!("unknown message type '{}'", message.kind()),
                    ),
                );
            }
        }
        Ok(())
    }

    /// Load a fresh sequence off the loop. The result comes back as
    /// [`HubCommand::SequenceLoaded`]; a newer request supersedes this one.
    fn start_sequence(&mut self, client_id: u64) {
        self.next_load += 1;
        let load_id = self.next_load;
        self.loading.insert(client_id, load_id);
        debug!(client_id, load_id, source = %self.source.describe(), "Loading sequence");

        let source = self.source.clone();
        let commands = self.commands.clone();
        tokio::task::spawn_blocking(move || {
            let result = source.load();
            // The hub may have shut down meanwhile.
            let _ = commands.send(HubCommand::SequenceLoaded { client_id, load_id, result });
        });
    }

    /// Replace whatever is scheduled for the client with a loaded sequence.
    /// A failed load reports `SEQUENCE_UNAVAILABLE` and leaves the current
    /// schedule running.
    fn on_sequence_loaded(&mut self, client_id: u64, load_id: u64, result: Result<ActionSequence>) {
        if self.loading.get(&client_id) != Some(&load_id) {
            debug!(client_id, load_id, "Dropping superseded sequence load");
            return;
        }
        self.loading.remove(&client_id);

        let sequence = match result {
            Ok(sequence) => sequence,
            Err(e) => {
                warn!(client_id, "Sequence source unavailable: {}", e);
                self.send_to(client_id, &Message::error(ErrorCode::SequenceUnavailable, e.to_string()));
                return;
            }
        };

        let replaced = self.scheduler.cancel_all(client_id);
        info!(
            client_id,
            frames = sequence.len(),
            duration_ms = sequence.duration().as_millis() as u64,
            replaced,
            "Starting scheduled sequence delivery"
        );

        self.send_to(client_id, &Message::sequence_start(&sequence));
        self.scheduler.schedule(client_id, &sequence, Instant::now(), self.commands.clone());
    }

    fn stop_sequence(&mut self, client_id: u64, reason: &str) {
        self.loading.remove(&client_id);
        let cancelled = self.scheduler.cancel_all(client_id);
        info!(client_id, cancelled, "Sequence delivery stopped");
        self.send_to(client_id, &Message::sequence_stopped(reason));
    }

    fn send_to(&self, client_id: u64, message: &Message) {
        match self.roster.get(client_id) {
            Some(record) => {
                if !record.send(message) {
                    debug!(client_id, kind = message.kind(), "Send to closing connection dropped");
                }
            }
            None => trace!(client_id, kind = message.kind(), "Send to unknown client skipped"),
        }
    }

    fn broadcast_except(&self, source_id: u64, message: &Message) {
        for client_id in self.roster.ids().into_iter().filter(|id| *id != source_id) {
            self.send_to(client_id, message);
        }
    }

    fn shutdown(&mut self) {
        self.loading.clear();
        self.scheduler.cancel_everything();
        for record in self.roster.drain() {
            record.close();
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn scheduler(&self) -> &SequenceScheduler {
        &self.scheduler
    }

    /// Whether a sequence load for the client is still running.
    pub fn is_loading(&self, client_id: u64) -> bool {
        self.loading.contains_key(&client_id)
    }
}

/// Copy a message's object payload and tag it with the sender.
fn tag_source(message: &Message, client_id: u64) -> Result<Value> {
    match message.data() {
        Value::Object(fields) => {
            let mut fields = fields.clone();
            fields.insert("sourceClientId".to_string(), Value::from(client_id));
            Ok(Value::Object(fields))
        }
        other => Err(RelayError::protocol(
            format!("'{}' payload", message.kind()),
            format!("expected an object, got {other}"),
        )),
    }
}
