//! Core domain types shared by the hub, the transport client and playback.
//!
//! - [`KeyFrame`] is one timestamped pose of a motion sequence (angles in radians)
//! - [`ActionSequence`] is a validated, ordered list of keyframes
//! - [`RobotStateData`] is a published snapshot of a simulated arm (angles in degrees)
//! - [`JointControlData`] is a joint control intent
//! - [`ClientInfo`] is a hub roster entry

mod client_info;
mod control;
mod keyframe;
mod robot_state;
mod sequence;
mod update_rate;

pub use client_info::{ClientIdentity, ClientInfo, ClientType};
pub use control::{JointControlCommand, JointControlData, JointTarget};
pub use keyframe::{CartesianPose, DigitalIo, KeyFrame};
pub use robot_state::{GripperState, JointState, RobotStateData, RobotStateUpdate};
pub use sequence::{ActionSequence, SequenceDocument, SequenceMeta};
pub use update_rate::UpdateRate;

/// Milliseconds since the unix epoch, as carried in message timestamps.
pub fn timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
