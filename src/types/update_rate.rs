//! Delivery rate control for mirrored state streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rate at which mirrored robot states are delivered to a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every update as it arrives
    Every,

    /// At most this many updates per second per source client
    Max(u32),
}

impl UpdateRate {
    /// Throttle interval, or `None` when every update passes through.
    ///
    /// `Max(0)` is treated as `Every` rather than stalling the stream.
    pub fn interval(self) -> Option<Duration> {
        match self {
            UpdateRate::Every | UpdateRate::Max(0) => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}
