//! Client identity and roster entries

use serde::{Deserialize, Serialize};

/// Declared type of a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Simulator,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientType::Simulator => f.write_str("simulator"),
            ClientType::Unknown => f.write_str("unknown"),
        }
    }
}

/// Identity a client declares in its `register` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    #[serde(rename = "type", default)]
    pub client_type: ClientType,
    #[serde(default)]
    pub name: String,
}

impl ClientIdentity {
    pub fn simulator(name: impl Into<String>) -> Self {
        Self { client_type: ClientType::Simulator, name: name.into() }
    }
}

/// Roster entry as reported in `clients_list`. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: u64,
    #[serde(rename = "type")]
    pub client_type: ClientType,
    pub name: String,
    pub connected_at: u64,
    pub last_heartbeat: u64,
}
