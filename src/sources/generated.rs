//! Synthetic sequence source

use std::f64::consts::TAU;

use crate::source::SequenceSource;
use crate::types::{ActionSequence, KeyFrame, SequenceMeta, timestamp_ms};
use crate::Result;

/// Peak joint excursion of the generated sweep, in radians.
const AMPLITUDE_RAD: f64 = 0.6;

/// Produces a deterministic sweep: every joint follows one sine period,
/// phase-shifted per joint. The gripper opens on the first frame and closes
/// at the midpoint.
#[derive(Debug, Clone, Copy)]
pub struct GeneratedSequenceSource {
    joint_count: usize,
    frame_count: usize,
    frame_interval_ms: u64,
}

impl GeneratedSequenceSource {
    pub fn new(joint_count: usize, frame_count: usize, frame_interval_ms: u64) -> Self {
        Self { joint_count, frame_count, frame_interval_ms }
    }

    fn frame(&self, index: usize) -> KeyFrame {
        let phase = TAU * index as f64 / self.frame_count as f64;
        let joints = (0..self.joint_count)
            .map(|j| AMPLITUDE_RAD * (phase + j as f64 * TAU / self.joint_count as f64).sin())
            .collect();

        let frame = KeyFrame::new(index as u64, index as u64 * self.frame_interval_ms, joints);
        if index == 0 {
            frame.with_gripper(true)
        } else if index == self.frame_count / 2 {
            frame.with_gripper(false)
        } else {
            frame
        }
    }
}

impl SequenceSource for GeneratedSequenceSource {
    fn load(&self) -> Result<ActionSequence> {
        let meta = SequenceMeta {
            description: "generated joint sweep".to_string(),
            version: "1.0".to_string(),
            created_at: Some(timestamp_ms().to_string()),
            robot_type: format!("{}-axis", self.joint_count),
        };
        let frames = (0..self.frame_count).map(|i| self.frame(i)).collect();
        ActionSequence::new(meta, frames, self.joint_count)
    }

    fn describe(&self) -> String {
        format!(
            "generated sweep ({} joints, {} frames every {}ms)",
            self.joint_count, self.frame_count, self.frame_interval_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_sequence_is_valid_and_evenly_spaced() {
        let sequence = GeneratedSequenceSource::new(6, 10, 50).load().unwrap();
        assert_eq!(sequence.len(), 10);
        assert_eq!(sequence.joint_count(), 6);
        let times: Vec<_> = sequence.frames().iter().map(|f| f.time).collect();
        assert_eq!(times, (0..10).map(|i| i * 50).collect::<Vec<_>>());
        assert!(sequence.frames().iter().flat_map(|f| &f.joints).all(|a| a.abs() <= AMPLITUDE_RAD));
    }

    #[test]
    fn gripper_opens_then_closes() {
        let sequence = GeneratedSequenceSource::new(2, 4, 100).load().unwrap();
        assert_eq!(sequence.frames()[0].gripper_open(), Some(true));
        assert_eq!(sequence.frames()[2].gripper_open(), Some(false));
        assert_eq!(sequence.frames()[1].gripper_open(), None);
    }

    #[test]
    fn zero_frames_fails_validation() {
        assert!(GeneratedSequenceSource::new(2, 0, 100).load().is_err());
    }
}
