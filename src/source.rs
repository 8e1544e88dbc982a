//! Sequence source trait

use crate::Result;
use crate::types::ActionSequence;

/// Trait for producers of action sequences
///
/// The hub asks its source for a fresh sequence on every
/// `test_sequence_request`. Sources validate before returning, so a load
/// failure never reaches the scheduler.
pub trait SequenceSource: Send + Sync + 'static {
    /// Load and validate one sequence
    ///
    /// Returns:
    /// - `Ok(sequence)` - validated, non-empty sequence
    /// - `Err(e)` - source unavailable or sequence malformed
    fn load(&self) -> Result<ActionSequence>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}
