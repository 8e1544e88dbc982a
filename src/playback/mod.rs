//! Keyframe playback onto a [`RobotModel`](crate::model::RobotModel)
//!
//! Frames pushed by the hub arrive in bursts; [`FrameQueue`] buffers them
//! and plays them back on its own schedule so motion stays smooth while the
//! buffer stays ahead of consumption.

mod duration;
mod queue;
mod tween;

pub use duration::DurationPolicy;
pub use queue::{FrameQueue, PlaybackObserver, PlaybackSnapshot, PlaybackStatus, TracingObserver};
pub use tween::{JointTween, TweenOutcome};
