//! In-memory sequence source

use crate::Result;
use crate::source::SequenceSource;
use crate::types::ActionSequence;

/// Hands out clones of one pre-validated sequence.
#[derive(Debug, Clone)]
pub struct FixedSequenceSource {
    sequence: ActionSequence,
}

impl FixedSequenceSource {
    pub fn new(sequence: ActionSequence) -> Self {
        Self { sequence }
    }
}

impl SequenceSource for FixedSequenceSource {
    fn load(&self) -> Result<ActionSequence> {
        Ok(self.sequence.clone())
    }

    fn describe(&self) -> String {
        format!("fixed sequence '{}' ({} frames)", self.sequence.meta().description, self.sequence.len())
    }
}
