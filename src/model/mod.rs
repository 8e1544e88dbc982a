//! The kinematic model a session drives
//!
//! Rendering and scene management live outside this crate. What the session
//! and the playback queue need from a model is the [`RobotModel`] trait:
//! joint angles by name in degrees, a normalised gripper and a home pose.
//! [`SimulatedArm`] is an in-memory six-axis implementation.

mod arm;

pub use arm::{JointLimits, SimulatedArm};

use crate::Result;
use crate::types::{CartesianPose, JointTarget};

/// Joint-space view of a robot arm.
///
/// Methods take `&self`: models are shared between the playback loop, the
/// session's command handlers and the state sync task.
pub trait RobotModel: Send + Sync + 'static {
    /// Controllable joints in keyframe order.
    fn joint_names(&self) -> Vec<String>;

    /// Current angle in degrees, `None` for an unknown joint.
    fn joint_angle(&self, name: &str) -> Option<f64>;

    fn set_joint_angle(&self, name: &str, degrees: f64) -> Result<()>;

    /// Gripper openness in `0..=1`, `None` without a gripper.
    fn gripper_openness(&self) -> Option<f64>;

    fn set_gripper_openness(&self, openness: f64) -> Result<()>;

    /// End-effector pose when the model can compute one.
    fn end_effector(&self) -> Option<CartesianPose> {
        None
    }

    /// Home joint angles in degrees.
    fn default_pose(&self) -> Vec<JointTarget>;

    /// Home gripper openness.
    fn default_gripper(&self) -> Option<f64> {
        None
    }

    fn joint_count(&self) -> usize {
        self.joint_names().len()
    }
}
