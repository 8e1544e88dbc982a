//! Robot state snapshots published by simulator clients

use serde::{Deserialize, Serialize};

use super::CartesianPose;

/// Angle of one named joint, in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    pub name: String,
    pub angle: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
}

/// Gripper state derived from jaw openness (0 = closed, 1 = fully open).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GripperState {
    pub openness: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_gripping: Option<bool>,
}

impl GripperState {
    /// Classify `openness` against `threshold`: strictly below means gripping.
    pub fn classify(openness: f64, threshold: f64) -> Self {
        Self { openness, is_gripping: Some(openness < threshold) }
    }
}

/// Payload of `robot_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotStateData {
    pub joints: Vec<JointState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gripper: Option<GripperState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_effector: Option<CartesianPose>,
    pub timestamp: u64,
}

impl RobotStateData {
    pub fn joint(&self, name: &str) -> Option<&JointState> {
        self.joints.iter().find(|j| j.name == name)
    }
}

/// Payload of `robot_state_update`: a state tagged with the publishing client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotStateUpdate {
    pub source_client_id: u64,
    #[serde(flatten)]
    pub state: RobotStateData,
}
