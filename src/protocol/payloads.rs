//! Typed `data` payloads for the protocol's system and sequence messages.
//!
//! Domain payloads (robot state, joint control, keyframes) live in
//! [`crate::types`]; this module holds the envelopes the hub builds itself.

use serde::{Deserialize, Serialize};

use crate::types::{ClientInfo, ClientType, SequenceMeta};

/// `connection`: identity assignment right after the transport opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAck {
    pub client_id: u64,
    pub message: String,
    pub timestamp: u64,
}

/// `register_success`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSuccess {
    pub client_id: u64,
    #[serde(rename = "type")]
    pub client_type: ClientType,
    pub name: String,
}

/// `heartbeat` and `heartbeat_response`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub timestamp: u64,
}

/// `reset_robot`, `emergency_stop` and `get_clients`: a sender-tagged intent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlIntent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_client_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// `clients_list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientsList {
    pub clients: Vec<ClientInfo>,
}

/// `test_sequence_request` and `stop_sequence_request`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<u64>,
}

/// `sequence_start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStart {
    pub meta: SequenceMeta,
    #[serde(default)]
    pub frame_count: usize,
    #[serde(default)]
    pub duration_ms: u64,
}

/// `sequence_complete`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceComplete {
    pub success: bool,
}

/// `sequence_stopped`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStopped {
    pub success: bool,
    pub timestamp: u64,
    pub reason: String,
}

/// Machine-readable code carried by `error` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownMessageType,
    InvalidMessage,
    SequenceUnavailable,
    InternalError,
}

/// `error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    pub timestamp: u64,
}
