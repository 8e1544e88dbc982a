//! The `{type, data}` message envelope

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MessageType;
use super::payloads::{
    ClientsList, ConnectionAck, ControlIntent, ErrorCode, ErrorPayload, Heartbeat,
    RegisterSuccess, SequenceComplete, SequenceStart, SequenceStopped,
};
use crate::types::{ActionSequence, ClientInfo, ClientType, KeyFrame, timestamp_ms};
use crate::{RelayError, Result};

/// One protocol message. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl Message {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self { kind: kind.into(), data }
    }

    /// Build a message from a known type and a serialisable payload.
    pub fn with_payload<T: Serialize>(kind: MessageType, payload: &T) -> Result<Self> {
        Ok(Self::new(kind.as_str(), serde_json::to_value(payload)?))
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::parse(&self.kind)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Deserialize `data` into a typed payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.data)
            .map_err(|e| RelayError::protocol(format!("'{}' payload", self.kind), e.to_string()))
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one inbound text frame.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| RelayError::protocol("inbound frame", e.to_string()))
    }

    // Hub-built messages. Payload structs are plain data, so serialisation
    // cannot fail; `infallible` keeps the constructors `Result`-free.

    pub fn connection(client_id: u64) -> Self {
        infallible(
            MessageType::Connection,
            &ConnectionAck {
                client_id,
                message: "connected to relay hub".to_string(),
                timestamp: timestamp_ms(),
            },
        )
    }

    pub fn register_success(client_id: u64, client_type: ClientType, name: &str) -> Self {
        infallible(
            MessageType::RegisterSuccess,
            &RegisterSuccess { client_id, client_type, name: name.to_string() },
        )
    }

    pub fn heartbeat() -> Self {
        infallible(MessageType::Heartbeat, &Heartbeat { timestamp: timestamp_ms() })
    }

    pub fn heartbeat_response() -> Self {
        infallible(MessageType::HeartbeatResponse, &Heartbeat { timestamp: timestamp_ms() })
    }

    pub fn clients_list(clients: Vec<ClientInfo>) -> Self {
        infallible(MessageType::ClientsList, &ClientsList { clients })
    }

    /// `reset_robot` / `emergency_stop` echo tagged with the sender.
    pub fn control_echo(kind: MessageType, source_client_id: u64, timestamp: Option<u64>) -> Self {
        infallible(kind, &ControlIntent { source_client_id: Some(source_client_id), timestamp })
    }

    pub fn sequence_start(sequence: &ActionSequence) -> Self {
        infallible(
            MessageType::SequenceStart,
            &SequenceStart {
                meta: sequence.meta().clone(),
                frame_count: sequence.len(),
                duration_ms: sequence.duration().as_millis() as u64,
            },
        )
    }

    pub fn sequence_frame(frame: &KeyFrame) -> Self {
        infallible(MessageType::SequenceFrame, frame)
    }

    pub fn sequence_complete() -> Self {
        infallible(MessageType::SequenceComplete, &SequenceComplete { success: true })
    }

    pub fn sequence_stopped(reason: impl Into<String>) -> Self {
        infallible(
            MessageType::SequenceStopped,
            &SequenceStopped { success: true, timestamp: timestamp_ms(), reason: reason.into() },
        )
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        infallible(
            MessageType::Error,
            &ErrorPayload { code, message: message.into(), timestamp: timestamp_ms() },
        )
    }
}

fn infallible<T: Serialize>(kind: MessageType, payload: &T) -> Message {
    Message::new(kind.as_str(), serde_json::to_value(payload).unwrap_or(Value::Null))
}
