//! Message type tags

use std::fmt;

/// Every message tag of the protocol, plus the client-local lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // hub -> client
    Connection,
    RegisterSuccess,
    HeartbeatResponse,
    RobotStateUpdate,
    JointControlCommand,
    ClientsList,
    SequenceStart,
    SequenceFrame,
    SequenceComplete,
    SequenceStopped,
    Error,

    // client -> hub
    Register,
    Heartbeat,
    RobotState,
    JointControl,
    GetClients,
    TestSequenceRequest,
    StopSequenceRequest,

    // both directions (echoed by the hub)
    ResetRobot,
    EmergencyStop,

    // emitted locally by the transport client, never sent
    Connected,
    Disconnected,
    ReconnectFailed,
}

impl MessageType {
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageType::Connection => "connection",
            MessageType::RegisterSuccess => "register_success",
            MessageType::HeartbeatResponse => "heartbeat_response",
            MessageType::RobotStateUpdate => "robot_state_update",
            MessageType::JointControlCommand => "joint_control_command",
            MessageType::ClientsList => "clients_list",
            MessageType::SequenceStart => "sequence_start",
            MessageType::SequenceFrame => "sequence_frame",
            MessageType::SequenceComplete => "sequence_complete",
            MessageType::SequenceStopped => "sequence_stopped",
            MessageType::Error => "error",
            MessageType::Register => "register",
            MessageType::Heartbeat => "heartbeat",
            MessageType::RobotState => "robot_state",
            MessageType::JointControl => "joint_control",
            MessageType::GetClients => "get_clients",
            MessageType::TestSequenceRequest => "test_sequence_request",
            MessageType::StopSequenceRequest => "stop_sequence_request",
            MessageType::ResetRobot => "reset_robot",
            MessageType::EmergencyStop => "emergency_stop",
            MessageType::Connected => "connected",
            MessageType::Disconnected => "disconnected",
            MessageType::ReconnectFailed => "reconnect_failed",
        }
    }

    /// Look up a tag. Unknown tags return `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        const ALL: [MessageType; 23] = [
            MessageType::Connection,
            MessageType::RegisterSuccess,
            MessageType::HeartbeatResponse,
            MessageType::RobotStateUpdate,
            MessageType::JointControlCommand,
            MessageType::ClientsList,
            MessageType::SequenceStart,
            MessageType::SequenceFrame,
            MessageType::SequenceComplete,
            MessageType::SequenceStopped,
            MessageType::Error,
            MessageType::Register,
            MessageType::Heartbeat,
            MessageType::RobotState,
            MessageType::JointControl,
            MessageType::GetClients,
            MessageType::TestSequenceRequest,
            MessageType::StopSequenceRequest,
            MessageType::ResetRobot,
            MessageType::EmergencyStop,
            MessageType::Connected,
            MessageType::Disconnected,
            MessageType::ReconnectFailed,
        ];
        ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// Types the transport client consumes itself instead of forwarding to listeners.
    pub fn is_system(self) -> bool {
        matches!(
            self,
            MessageType::Connection
                | MessageType::RegisterSuccess
                | MessageType::HeartbeatResponse
                | MessageType::Error
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
