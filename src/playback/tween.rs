//! Linear-in-time joint transitions on a [`RobotModel`]

use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{RelayError, Result};
use crate::model::RobotModel;
use crate::types::JointTarget;

/// How a transition ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweenOutcome {
    Completed,
    Interrupted,
}

/// A multi-joint transition with an optional gripper channel, all
/// interpolated over the same duration.
#[derive(Debug, Clone, PartialEq)]
pub struct JointTween {
    pub joints: Vec<JointTarget>,
    pub gripper: Option<f64>,
    pub duration: Duration,
}

struct Channel {
    name: String,
    from: f64,
    to: f64,
}

impl JointTween {
    pub fn new(joints: Vec<JointTarget>, duration: Duration) -> Self {
        Self { joints, gripper: None, duration }
    }

    pub fn with_gripper(mut self, openness: Option<f64>) -> Self {
        self.gripper = openness;
        self
    }

    /// Drive the model towards the targets, one update per `step`, until the
    /// duration elapsed or `cancel` fired. The final update lands exactly on
    /// the targets. Any joint the model does not know fails the tween before
    /// anything moves.
    pub async fn run(
        &self,
        model: &dyn RobotModel,
        step: Duration,
        cancel: &CancellationToken,
    ) -> Result<TweenOutcome> {
        let channels = self
            .joints
            .iter()
            .map(|target| {
                let from = model.joint_angle(&target.name).ok_or_else(|| {
                    RelayError::model(format!("unknown joint '{}'", target.name))
                })?;
                Ok(Channel { name: target.name.clone(), from, to: target.angle })
            })
            .collect::<Result<Vec<_>>>()?;
        let gripper = match self.gripper {
            Some(to) => Some((model.gripper_openness().unwrap_or(to), to)),
            None => None,
        };

        if self.duration.is_zero() {
            apply(model, &channels, gripper, 1.0)?;
            return Ok(TweenOutcome::Completed);
        }

        let start = Instant::now();
        let mut ticks = interval(step.max(Duration::from_millis(1)));
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    trace!(elapsed = ?start.elapsed(), "Transition interrupted");
                    return Ok(TweenOutcome::Interrupted);
                }
                _ = ticks.tick() => {}
            }

            let progress = (start.elapsed().as_secs_f64() / self.duration.as_secs_f64()).min(1.0);
            apply(model, &channels, gripper, progress)?;
            if progress >= 1.0 {
                return Ok(TweenOutcome::Completed);
            }
        }
    }
}

fn apply(
    model: &dyn RobotModel,
    channels: &[Channel],
    gripper: Option<(f64, f64)>,
    progress: f64,
) -> Result<()> {
    for channel in channels {
        model.set_joint_angle(&channel.name, lerp(channel.from, channel.to, progress))?;
    }
    if let Some((from, to)) = gripper {
        model.set_gripper_openness(lerp(from, to, progress))?;
    }
    Ok(())
}

fn lerp(from: f64, to: f64, progress: f64) -> f64 {
    if progress >= 1.0 { to } else { from + (to - from) * progress }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SimulatedArm;

    fn target(name: &str, angle: f64) -> JointTarget {
        JointTarget { name: name.to_string(), angle }
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_targets_after_duration() {
        let arm = SimulatedArm::six_axis();
        let tween = JointTween::new(vec![target("base", 90.0), target("elbow", -30.0)], Duration::from_millis(500))
            .with_gripper(Some(0.0));

        let start = Instant::now();
        let outcome = tween.run(&arm, Duration::from_millis(16), &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, TweenOutcome::Completed);
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_millis(520));
        assert_eq!(arm.joint_angle("base"), Some(90.0));
        assert_eq!(arm.joint_angle("elbow"), Some(-30.0));
        assert_eq!(arm.gripper_openness(), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_linear_in_time() {
        let arm = std::sync::Arc::new(SimulatedArm::six_axis());
        let tween = JointTween::new(vec![target("base", 100.0)], Duration::from_secs(1));
        let cancel = CancellationToken::new();

        let runner = {
            let (arm, cancel) = (arm.clone(), cancel.clone());
            tokio::spawn(async move { tween.run(arm.as_ref(), Duration::from_millis(10), &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(505)).await;
        let midway = arm.joint_angle("base").unwrap();
        assert!((midway - 50.0).abs() <= 1.0, "midway angle was {midway}");

        runner.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_motion_in_place() {
        let arm = std::sync::Arc::new(SimulatedArm::six_axis());
        let tween = JointTween::new(vec![target("shoulder", 80.0)], Duration::from_secs(2));
        let cancel = CancellationToken::new();

        let runner = {
            let (arm, cancel) = (arm.clone(), cancel.clone());
            tokio::spawn(async move { tween.run(arm.as_ref(), Duration::from_millis(16), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();

        assert_eq!(runner.await.unwrap().unwrap(), TweenOutcome::Interrupted);
        let stopped_at = arm.joint_angle("shoulder").unwrap();
        assert!(stopped_at > 0.0 && stopped_at < 80.0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(arm.joint_angle("shoulder"), Some(stopped_at));
    }

    #[tokio::test]
    async fn zero_duration_snaps() {
        let arm = SimulatedArm::six_axis();
        let tween = JointTween::new(vec![target("wrist_roll", 45.0)], Duration::ZERO);
        tween.run(&arm, Duration::from_millis(16), &CancellationToken::new()).await.unwrap();
        assert_eq!(arm.joint_angle("wrist_roll"), Some(45.0));
    }

    #[tokio::test]
    async fn unknown_joint_fails_before_moving() {
        let arm = SimulatedArm::six_axis();
        let tween = JointTween::new(vec![target("base", 10.0), target("tail", 5.0)], Duration::ZERO);
        let err = tween.run(&arm, Duration::from_millis(16), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RelayError::Model { .. }));
        assert_eq!(arm.joint_angle("base"), Some(0.0));
    }
}
