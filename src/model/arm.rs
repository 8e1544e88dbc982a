//! In-memory six-axis arm

use std::sync::{PoisonError, RwLock};

use super::RobotModel;
use crate::types::{CartesianPose, JointTarget};
use crate::{RelayError, Result};

/// Angular range of one joint, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimits {
    pub min: f64,
    pub max: f64,
}

impl JointLimits {
    pub const fn symmetric(range: f64) -> Self {
        Self { min: -range, max: range }
    }

    pub fn clamp(&self, degrees: f64) -> f64 {
        degrees.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone)]
struct Joint {
    name: String,
    limits: JointLimits,
    home: f64,
}

#[derive(Debug)]
struct ArmState {
    angles: Vec<f64>,
    gripper: f64,
}

// Link lengths in metres: base height, upper arm, forearm.
const BASE_HEIGHT: f64 = 0.2;
const UPPER_ARM: f64 = 0.4;
const FOREARM: f64 = 0.35;

/// A simulated arm holding joint angles and a gripper in memory.
///
/// Angles are clamped to the joint limits. The end-effector position uses a
/// planar approximation over base yaw, shoulder and elbow pitch.
#[derive(Debug)]
pub struct SimulatedArm {
    joints: Vec<Joint>,
    home_gripper: f64,
    state: RwLock<ArmState>,
}

impl SimulatedArm {
    /// Base, shoulder, elbow and three wrist joints, all at zero.
    pub fn six_axis() -> Self {
        let joints = [
            ("base", 180.0),
            ("shoulder", 90.0),
            ("elbow", 135.0),
            ("wrist_pitch", 120.0),
            ("wrist_roll", 180.0),
            ("wrist_yaw", 180.0),
        ];
        Self::new(
            joints.iter().map(|(name, range)| (name.to_string(), JointLimits::symmetric(*range), 0.0)),
            1.0,
        )
    }

    /// Arm with `(name, limits, home angle)` joints and a home gripper openness.
    pub fn new(joints: impl IntoIterator<Item = (String, JointLimits, f64)>, home_gripper: f64) -> Self {
        let joints: Vec<Joint> = joints
            .into_iter()
            .map(|(name, limits, home)| Joint { name, limits, home: limits.clamp(home) })
            .collect();
        let angles = joints.iter().map(|j| j.home).collect();
        let home_gripper = home_gripper.clamp(0.0, 1.0);
        Self { joints, home_gripper, state: RwLock::new(ArmState { angles, gripper: home_gripper }) }
    }

    /// All joint angles in degrees, keyframe order.
    pub fn angles(&self) -> Vec<f64> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).angles.clone()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }
}

impl RobotModel for SimulatedArm {
    fn joint_names(&self) -> Vec<String> {
        self.joints.iter().map(|j| j.name.clone()).collect()
    }

    fn joint_angle(&self, name: &str) -> Option<f64> {
        let index = self.index_of(name)?;
        Some(self.state.read().unwrap_or_else(PoisonError::into_inner).angles[index])
    }

    fn set_joint_angle(&self, name: &str, degrees: f64) -> Result<()> {
        let index = self.index_of(name).ok_or_else(|| RelayError::model(format!("unknown joint '{name}'")))?;
        if !degrees.is_finite() {
            return Err(RelayError::model(format!("joint '{name}' angle {degrees} is not finite")));
        }
        let clamped = self.joints[index].limits.clamp(degrees);
        self.state.write().unwrap_or_else(PoisonError::into_inner).angles[index] = clamped;
        Ok(())
    }

    fn gripper_openness(&self) -> Option<f64> {
        Some(self.state.read().unwrap_or_else(PoisonError::into_inner).gripper)
    }

    fn set_gripper_openness(&self, openness: f64) -> Result<()> {
        if !openness.is_finite() {
            return Err(RelayError::model(format!("gripper openness {openness} is not finite")));
        }
        self.state.write().unwrap_or_else(PoisonError::into_inner).gripper = openness.clamp(0.0, 1.0);
        Ok(())
    }

    fn end_effector(&self) -> Option<CartesianPose> {
        let angles = self.angles();
        let [base, shoulder, elbow, ..] = angles.as_slice() else {
            return None;
        };
        let (yaw, pitch, elbow) = (base.to_radians(), shoulder.to_radians(), elbow.to_radians());

        let reach = UPPER_ARM * pitch.cos() + FOREARM * (pitch + elbow).cos();
        let height = BASE_HEIGHT + UPPER_ARM * pitch.sin() + FOREARM * (pitch + elbow).sin();
        let half = yaw / 2.0;
        Some(CartesianPose {
            position: [reach * yaw.cos(), reach * yaw.sin(), height],
            orientation: [0.0, 0.0, half.sin(), half.cos()],
        })
    }

    fn default_pose(&self) -> Vec<JointTarget> {
        self.joints.iter().map(|j| JointTarget { name: j.name.clone(), angle: j.home }).collect()
    }

    fn default_gripper(&self) -> Option<f64> {
        Some(self.home_gripper)
    }
}
