//! Joint control intents

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Target angle for one named joint, in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointTarget {
    pub name: String,
    pub angle: f64,
}

impl JointTarget {
    pub fn new(name: impl Into<String>, angle: f64) -> Self {
        Self { name: name.into(), angle }
    }
}

/// Payload of `joint_control`.
///
/// Either a single `jointName`/`angle` pair, a `joints` list, or both.
/// `duration` is in seconds; absent or zero applies the angles instantly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JointControlData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joint_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joints: Option<Vec<JointTarget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gripper_openness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl JointControlData {
    pub fn single(name: impl Into<String>, angle: f64) -> Self {
        Self { joint_name: Some(name.into()), angle: Some(angle), ..Default::default() }
    }

    pub fn many(joints: Vec<JointTarget>) -> Self {
        Self { joints: Some(joints), ..Default::default() }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_gripper(mut self, openness: f64) -> Self {
        self.gripper_openness = Some(openness);
        self
    }

    /// All joint targets in this command, single form first.
    pub fn targets(&self) -> Vec<JointTarget> {
        let mut targets = Vec::new();
        if let (Some(name), Some(angle)) = (&self.joint_name, self.angle) {
            targets.push(JointTarget::new(name.clone(), angle));
        }
        if let Some(joints) = &self.joints {
            targets.extend(joints.iter().cloned());
        }
        targets
    }

    /// Animation duration, or `None` for an instant application. Durations
    /// too large for [`Duration`] are applied instantly as well.
    pub fn transition(&self) -> Option<Duration> {
        let secs = self.duration.filter(|secs| secs.is_finite() && *secs > 0.0)?;
        match Duration::try_from_secs_f64(secs) {
            Ok(duration) => Some(duration),
            Err(e) => {
                warn!(duration = secs, "Joint control duration out of range, applying instantly: {}", e);
                None
            }
        }
    }
}

/// Payload of `joint_control_command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JointControlCommand {
    pub source_client_id: u64,
    #[serde(flatten)]
    pub control: JointControlData,
}
