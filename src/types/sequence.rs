//! Validated action sequences

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::KeyFrame;
use crate::{RelayError, Result};

/// Descriptive metadata attached to a sequence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SequenceMeta {
    pub description: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub robot_type: String,
}

/// Unvalidated on-disk / on-wire form of a sequence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SequenceDocument {
    #[serde(default)]
    pub meta: SequenceMeta,
    pub frames: Vec<KeyFrame>,
}

/// An ordered, validated, non-empty list of keyframes.
///
/// Construction always goes through [`ActionSequence::new`], so holding an
/// `ActionSequence` means the frames are sorted by non-decreasing `time` and
/// every frame carries exactly `joint_count` finite angles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSequence {
    meta: SequenceMeta,
    frames: Vec<KeyFrame>,
    #[serde(skip)]
    joint_count: usize,
}

impl ActionSequence {
    /// Validate `frames` against `joint_count` and build a sequence.
    pub fn new(meta: SequenceMeta, frames: Vec<KeyFrame>, joint_count: usize) -> Result<Self> {
        validate_frames(&frames, joint_count)?;
        Ok(Self { meta, frames, joint_count })
    }

    pub fn from_document(document: SequenceDocument, joint_count: usize) -> Result<Self> {
        Self::new(document.meta, document.frames, joint_count)
    }

    /// Parse and validate a JSON sequence document.
    pub fn from_json_str(json: &str, joint_count: usize) -> Result<Self> {
        let document: SequenceDocument = serde_json::from_str(json).map_err(|e| {
            RelayError::sequence_invalid(format!("malformed sequence document: {e}"), None)
        })?;
        Self::from_document(document, joint_count)
    }

    /// Parse and validate a YAML sequence document.
    pub fn from_yaml_str(yaml: &str, joint_count: usize) -> Result<Self> {
        let document: SequenceDocument = serde_yaml_ng::from_str(yaml).map_err(|e| {
            RelayError::sequence_invalid(format!("malformed sequence document: {e}"), None)
        })?;
        Self::from_document(document, joint_count)
    }

    pub fn meta(&self) -> &SequenceMeta {
        &self.meta
    }

    pub fn frames(&self) -> &[KeyFrame] {
        &self.frames
    }

    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Never true: construction rejects empty sequences.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Offset of the last frame, which is also when delivery completes.
    pub fn duration(&self) -> Duration {
        self.frames.last().map(KeyFrame::offset).unwrap_or_default()
    }

    pub fn into_parts(self) -> (SequenceMeta, Vec<KeyFrame>) {
        (self.meta, self.frames)
    }
}

fn validate_frames(frames: &[KeyFrame], joint_count: usize) -> Result<()> {
    if frames.is_empty() {
        return Err(RelayError::sequence_invalid("sequence contains no frames", None));
    }

    let mut previous_time = 0;
    for (index, frame) in frames.iter().enumerate() {
        if frame.joints.len() != joint_count {
            return Err(RelayError::sequence_invalid(
                format!(
                    "frame {} has {} joint angles, expected {}",
                    frame.id,
                    frame.joints.len(),
                    joint_count
                ),
                Some(index),
            ));
        }

        if let Some(angle) = frame.joints.iter().find(|a| !a.is_finite()) {
            return Err(RelayError::sequence_invalid(
                format!("frame {} has non-finite joint angle {}", frame.id, angle),
                Some(index),
            ));
        }

        if frame.time < previous_time {
            return Err(RelayError::sequence_invalid(
                format!(
                    "frame {} at {}ms precedes previous frame at {}ms",
                    frame.id, frame.time, previous_time
                ),
                Some(index),
            ));
        }
        previous_time = frame.time;
    }

    Ok(())
}
