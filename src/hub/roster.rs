//! Client roster owned by the hub

use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use super::connection::Outgoing;
use crate::protocol::Message;
use crate::types::{ClientIdentity, ClientInfo, ClientType, timestamp_ms};

/// One connected client. Created on connect, removed on disconnect or eviction.
#[derive(Debug)]
pub struct ClientRecord {
    pub id: u64,
    pub client_type: ClientType,
    pub name: String,
    /// Unix milliseconds
    pub connected_at: u64,
    /// Unix milliseconds of the last heartbeat, as reported in `clients_list`
    pub last_heartbeat: u64,
    /// Monotonic instant of the last heartbeat, used for eviction
    last_heartbeat_at: Instant,
    outbound: mpsc::UnboundedSender<Outgoing>,
}

impl ClientRecord {
    fn new(id: u64, outbound: mpsc::UnboundedSender<Outgoing>) -> Self {
        let now = timestamp_ms();
        Self {
            id,
            client_type: ClientType::Unknown,
            name: String::new(),
            connected_at: now,
            last_heartbeat: now,
            last_heartbeat_at: Instant::now(),
            outbound,
        }
    }

    /// Queue a message on this client's connection. Returns false if the
    /// connection task is already gone.
    pub fn send(&self, message: &Message) -> bool {
        match message.encode() {
            Ok(text) => self.outbound.send(Outgoing::Text(text)).is_ok(),
            Err(_) => false,
        }
    }

    /// Ask the connection task to close the transport.
    pub fn close(&self) {
        let _ = self.outbound.send(Outgoing::Close);
    }

    pub fn heartbeat_age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_heartbeat_at)
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            client_type: self.client_type,
            name: self.name.clone(),
            connected_at: self.connected_at,
            last_heartbeat: self.last_heartbeat,
        }
    }
}

/// Keyed map of connected clients with monotonic id assignment.
#[derive(Debug, Default)]
pub struct Roster {
    clients: BTreeMap<u64, ClientRecord>,
    next_id: u64,
}

impl Roster {
    pub fn new() -> Self {
        Self { clients: BTreeMap::new(), next_id: 1 }
    }

    /// Insert a new client and return its id. Ids are never reused.
    pub fn add(&mut self, outbound: mpsc::UnboundedSender<Outgoing>) -> u64 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        self.clients.insert(id, ClientRecord::new(id, outbound));
        id
    }

    pub fn remove(&mut self, id: u64) -> Option<ClientRecord> {
        self.clients.remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<&ClientRecord> {
        self.clients.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn register(&mut self, id: u64, identity: ClientIdentity) -> Option<&ClientRecord> {
        let record = self.clients.get_mut(&id)?;
        record.client_type = identity.client_type;
        record.name = identity.name;
        Some(record)
    }

    pub fn touch(&mut self, id: u64) -> bool {
        match self.clients.get_mut(&id) {
            Some(record) => {
                record.last_heartbeat = timestamp_ms();
                record.last_heartbeat_at = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Ids of clients whose heartbeat is older than `timeout` at `now`.
    pub fn stale(&self, now: Instant, timeout: Duration) -> Vec<u64> {
        self.clients.values().filter(|r| r.heartbeat_age(now) > timeout).map(|r| r.id).collect()
    }

    /// Snapshot of every connected id, safe to iterate while mutating the roster.
    pub fn ids(&self) -> Vec<u64> {
        self.clients.keys().copied().collect()
    }

    pub fn snapshot(&self) -> Vec<ClientInfo> {
        self.clients.values().map(ClientRecord::info).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn drain(&mut self) -> Vec<ClientRecord> {
        std::mem::take(&mut self.clients).into_values().collect()
    }
}
