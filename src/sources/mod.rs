//! Sequence source implementations

mod file;
mod fixed;
mod generated;

pub use file::FileSequenceSource;
pub use fixed::FixedSequenceSource;
pub use generated::GeneratedSequenceSource;

use crate::config::SequenceSourceConfig;
use crate::source::SequenceSource;

/// Build the source described by the hub configuration.
pub fn from_config(config: &SequenceSourceConfig) -> Box<dyn SequenceSource> {
    match config {
        SequenceSourceConfig::Generated { joint_count, frame_count, frame_interval_ms } => {
            Box::new(GeneratedSequenceSource::new(*joint_count, *frame_count, *frame_interval_ms))
        }
        SequenceSourceConfig::File { path, joint_count } => {
            Box::new(FileSequenceSource::new(path, *joint_count))
        }
    }
}
