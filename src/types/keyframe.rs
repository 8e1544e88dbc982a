//! Keyframes: one timestamped target pose of a motion sequence

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cartesian pose: position in metres plus orientation quaternion `[x, y, z, w]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CartesianPose {
    pub position: [f64; 3],
    pub orientation: [f64; 4],
}

impl CartesianPose {
    /// Pose at `position` with the identity orientation.
    pub fn at(position: [f64; 3]) -> Self {
        Self { position, orientation: [0.0, 0.0, 0.0, 1.0] }
    }
}

/// Digital I/O flags carried by a keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalIo {
    /// `Some(true)` opens the gripper, `Some(false)` closes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gripper_open: Option<bool>,
}

/// One keyframe of an [`ActionSequence`](super::ActionSequence).
///
/// `time` is milliseconds relative to sequence start and `joints` holds one
/// angle per controllable joint, in radians. Keyframes are immutable once
/// built; the builder methods consume `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFrame {
    pub id: u64,
    pub time: u64,
    pub joints: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<CartesianPose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io: Option<DigitalIo>,
}

impl KeyFrame {
    pub fn new(id: u64, time: u64, joints: Vec<f64>) -> Self {
        Self { id, time, joints, pose: None, io: None }
    }

    pub fn with_pose(mut self, pose: CartesianPose) -> Self {
        self.pose = Some(pose);
        self
    }

    pub fn with_gripper(mut self, open: bool) -> Self {
        self.io = Some(DigitalIo { gripper_open: Some(open) });
        self
    }

    /// Offset of this frame from sequence start.
    pub fn offset(&self) -> Duration {
        Duration::from_millis(self.time)
    }

    /// Requested gripper state, if the frame carries one.
    pub fn gripper_open(&self) -> Option<bool> {
        self.io.and_then(|io| io.gripper_open)
    }
}
