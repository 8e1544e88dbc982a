//! Periodic robot state publication

use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::SyncConfig;
use crate::model::RobotModel;
use crate::protocol::MessageType;
use crate::transport::TransportClient;
use crate::types::{GripperState, JointState, RobotStateData, timestamp_ms};

/// Snapshot the model as a `robot_state` payload. Gripping is derived from
/// openness: strictly below `gripping_threshold` counts as gripping.
pub fn capture_state(model: &dyn RobotModel, gripping_threshold: f64) -> RobotStateData {
    let joints = model
        .joint_names()
        .into_iter()
        .filter_map(|name| {
            let angle = model.joint_angle(&name)?;
            Some(JointState { name, angle, velocity: None })
        })
        .collect();

    RobotStateData {
        joints,
        gripper: model
            .gripper_openness()
            .map(|openness| GripperState::classify(openness, gripping_threshold)),
        end_effector: model.end_effector(),
        timestamp: timestamp_ms(),
    }
}

/// Publish a snapshot every interval while connected, until cancelled.
pub(super) async fn publish_states(
    client: TransportClient,
    model: Arc<dyn RobotModel>,
    config: SyncConfig,
    cancel: CancellationToken,
) {
    let mut ticks = interval(config.interval());
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(interval = ?config.interval(), "State sync started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }
        if client.is_connected() {
            let state = capture_state(model.as_ref(), config.gripping_threshold);
            trace!(joints = state.joints.len(), "Publishing robot state");
            client.send(MessageType::RobotState, &state);
        }
    }
    debug!("State sync stopped");
}
