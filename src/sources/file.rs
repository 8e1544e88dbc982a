//! File-backed sequence source

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::source::SequenceSource;
use crate::types::ActionSequence;
use crate::{RelayError, Result};

/// Reads a JSON or YAML sequence document from disk on every load.
///
/// The format is chosen by extension: `.yaml`/`.yml` parse as YAML, anything
/// else as JSON. Re-reading on each load lets operators edit the file while
/// the hub runs.
#[derive(Debug, Clone)]
pub struct FileSequenceSource {
    path: PathBuf,
    joint_count: usize,
}

impl FileSequenceSource {
    pub fn new<P: AsRef<Path>>(path: P, joint_count: usize) -> Self {
        Self { path: path.as_ref().to_path_buf(), joint_count }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_yaml(&self) -> bool {
        matches!(self.path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"))
    }
}

impl SequenceSource for FileSequenceSource {
    fn load(&self) -> Result<ActionSequence> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| RelayError::io_error(&self.path, e))?;
        debug!("Read sequence file {} ({} bytes)", self.path.display(), contents.len());

        let sequence = if self.is_yaml() {
            ActionSequence::from_yaml_str(&contents, self.joint_count)?
        } else {
            ActionSequence::from_json_str(&contents, self.joint_count)?
        };

        info!(
            frames = sequence.len(),
            duration_ms = sequence.duration().as_millis() as u64,
            "Loaded sequence '{}' from {}",
            sequence.meta().description,
            self.path.display()
        );
        Ok(sequence)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
