//! Error types for the relay, transport and playback layers.
//!
//! All errors implement `std::error::Error` and carry enough context to be
//! logged directly. The variants follow the failure taxonomy of the system:
//!
//! ## Error Categories
//!
//! - **Protocol Errors**: malformed inbound payloads, unknown message types
//! - **Transport Errors**: handshake failures, unexpected closes, send failures
//! - **Sequence Errors**: empty or malformed action sequences rejected at load time
//! - **Execution Errors**: a frame transition failing while it is applied to the model
//! - **Model Errors**: the kinematic model rejecting a joint or gripper update
//! - **Exhaustion**: automatic reconnection gave up
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use simrelay::RelayError;
//!
//! let error = RelayError::connection_failed("hub refused connection");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Main error type for relay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Failed to connect to hub: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Handshake with hub failed: {reason}")]
    Handshake { reason: String },

    #[error("Not connected to hub")]
    Disconnected,

    #[error("Protocol error in {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid action sequence: {reason}")]
    Sequence { reason: String, frame_index: Option<usize> },

    #[error("Frame {frame_id} failed to execute: {details}")]
    Execution { frame_id: u64, details: String },

    #[error("Robot model rejected update: {details}")]
    Model { details: String },

    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Reconnection abandoned after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl RelayError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Connection { .. } => true,
            RelayError::Handshake { .. } => true,
            RelayError::Disconnected => true,
            RelayError::Timeout { .. } => true,
            RelayError::Io { .. } => false,
            RelayError::Protocol { .. } => false,
            RelayError::Serialization(_) => false,
            RelayError::Sequence { .. } => false,
            RelayError::Execution { .. } => false,
            RelayError::Model { .. } => false,
            RelayError::Config { .. } => false,
            RelayError::ReconnectExhausted { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RelayError::Connection { .. } | RelayError::Handshake { .. } => vec![
                "Ensure the relay hub is running",
                "Check the hub URL and port",
                "Verify no firewall blocks the connection",
            ],
            RelayError::Disconnected => {
                vec!["Call connect() before sending", "Wait for automatic reconnection"]
            }
            RelayError::Protocol { .. } | RelayError::Serialization(_) => vec![
                "Check that client and hub speak the same message format",
                "Inspect the offending payload in the debug log",
            ],
            RelayError::Sequence { .. } => vec![
                "Check frame times are non-decreasing",
                "Check every frame has one angle per controllable joint",
                "Ensure the sequence contains at least one frame",
            ],
            RelayError::Execution { .. } => vec![
                "Verify the joint names of the model match the sequence",
                "Start a new sequence after fixing the model",
            ],
            RelayError::Model { .. } => {
                vec!["Check the joint name against the model's joint list", "Check the value is finite"]
            }
            RelayError::Config { .. } => {
                vec!["Check the configuration file syntax", "Compare against the defaults"]
            }
            RelayError::Io { .. } => {
                vec!["Check the file exists and is readable", "Check file permissions"]
            }
            RelayError::Timeout { .. } => {
                vec!["Increase the timeout", "Verify the hub is responding"]
            }
            RelayError::ReconnectExhausted { .. } => {
                vec!["Restart the hub", "Call reconnect() to reset the attempt counter"]
            }
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        RelayError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        RelayError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for handshake errors.
    pub fn handshake_failed(reason: impl Into<String>) -> Self {
        RelayError::Handshake { reason: reason.into() }
    }

    /// Helper constructor for protocol errors.
    pub fn protocol(context: impl Into<String>, details: impl Into<String>) -> Self {
        RelayError::Protocol { context: context.into(), details: details.into() }
    }

    /// Helper constructor for sequence validation errors.
    pub fn sequence_invalid(reason: impl Into<String>, frame_index: Option<usize>) -> Self {
        RelayError::Sequence { reason: reason.into(), frame_index }
    }

    /// Helper constructor for frame execution errors.
    pub fn execution_failed(frame_id: u64, details: impl Into<String>) -> Self {
        RelayError::Execution { frame_id, details: details.into() }
    }

    /// Helper constructor for model update errors.
    pub fn model(details: impl Into<String>) -> Self {
        RelayError::Model { details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        RelayError::Config { details: details.into() }
    }

    /// Helper constructor for I/O errors with path context.
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RelayError::Io { path: path.into(), source }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for RelayError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        RelayError::Config { details: err.to_string() }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RelayError::connection_failed_with_source("websocket error", Box::new(err))
    }
}
