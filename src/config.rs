//! Configuration for the relay hub, the transport client and playback.
//!
//! Loaded from a YAML file. Every section and every field has a default, so
//! an empty file (or no file at all) yields a working configuration:
//!
//! ```yaml
//! hub:
//!   listen_address: 0.0.0.0:8080
//!   heartbeat_timeout_ms: 30000
//!   sweep_interval_ms: 10000
//!   sequence:
//!     kind: file
//!     path: sequences/wave.json
//!     joint_count: 6
//! client:
//!   url: ws://127.0.0.1:8080
//!   name: arm-1
//! sync:
//!   enabled: true
//!   interval_ms: 100
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{ClientIdentity, ClientType};
use crate::{RelayError, Result};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    pub hub: HubConfig,
    pub client: ClientConfig,
    pub playback: PlaybackConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Relay hub settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    /// TCP bind address for WebSocket clients
    pub listen_address: String,
    /// A client whose last heartbeat is older than this is evicted
    pub heartbeat_timeout_ms: u64,
    /// Period of the liveness sweep
    pub sweep_interval_ms: u64,
    /// Where `test_sequence_request` playback comes from
    pub sequence: SequenceSourceConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".to_string(),
            heartbeat_timeout_ms: 30_000,
            sweep_interval_ms: 10_000,
            sequence: SequenceSourceConfig::default(),
        }
    }
}

impl HubConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Sequence source used by the hub
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SequenceSourceConfig {
    /// Synthetic joint sweep
    Generated { joint_count: usize, frame_count: usize, frame_interval_ms: u64 },
    /// JSON or YAML sequence document on disk
    File { path: PathBuf, joint_count: usize },
}

impl Default for SequenceSourceConfig {
    fn default() -> Self {
        SequenceSourceConfig::Generated { joint_count: 6, frame_count: 20, frame_interval_ms: 200 }
    }
}

/// Transport client settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Hub WebSocket URL
    pub url: String,
    /// Declared client type sent in `register`
    pub client_type: ClientType,
    /// Display name sent in `register`
    pub name: String,
    pub heartbeat_interval_ms: u64,
    /// Automatic reconnect attempts after an unexpected close
    pub max_reconnect_attempts: u32,
    /// Fixed delay before each automatic reconnect attempt
    pub reconnect_delay_ms: u64,
    /// How long `connect` waits for the hub's `connection` acknowledgment
    pub handshake_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".to_string(),
            client_type: ClientType::Simulator,
            name: "simulator".to_string(),
            heartbeat_interval_ms: 15_000,
            max_reconnect_attempts: 3,
            reconnect_delay_ms: 2_000,
            handshake_timeout_ms: 5_000,
        }
    }
}

impl ClientConfig {
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity { client_type: self.client_type, name: self.name.clone() }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Frame animation queue settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Transition duration of the first frame of a session
    pub first_frame_duration_ms: u64,
    /// Floor for every computed transition duration
    pub min_frame_duration_ms: u64,
    /// How often the scheduling loop tries to advance the queue
    pub tick_interval_ms: u64,
    /// Interpolation step of joint transitions
    pub tween_step_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            first_frame_duration_ms: 1_000,
            min_frame_duration_ms: 100,
            tick_interval_ms: 16,
            tween_step_ms: 16,
        }
    }
}

impl PlaybackConfig {
    pub fn first_frame_duration(&self) -> Duration {
        Duration::from_millis(self.first_frame_duration_ms)
    }

    pub fn min_frame_duration(&self) -> Duration {
        Duration::from_millis(self.min_frame_duration_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn tween_step(&self) -> Duration {
        Duration::from_millis(self.tween_step_ms)
    }
}

/// Periodic robot state publication
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Gripper openness strictly below this is reported as gripping
    pub gripping_threshold: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { enabled: false, interval_ms: 100, gripping_threshold: 0.3 }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl RelayConfig {
    /// Load and validate configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| RelayError::io_error(path, e))?;
        Self::from_yaml_str(&contents)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RelayConfig =
            if yaml.trim().is_empty() { RelayConfig::default() } else { serde_yaml_ng::from_str(yaml)? };
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Reject values that would stall timers or misclassify state.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("hub.heartbeat_timeout_ms", self.hub.heartbeat_timeout_ms),
            ("hub.sweep_interval_ms", self.hub.sweep_interval_ms),
            ("client.heartbeat_interval_ms", self.client.heartbeat_interval_ms),
            ("client.handshake_timeout_ms", self.client.handshake_timeout_ms),
            ("playback.tick_interval_ms", self.playback.tick_interval_ms),
            ("playback.tween_step_ms", self.playback.tween_step_ms),
            ("sync.interval_ms", self.sync.interval_ms),
        ];
        if let Some((field, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(RelayError::config(format!("{field} must be greater than zero")));
        }

        if !(0.0..=1.0).contains(&self.sync.gripping_threshold) {
            return Err(RelayError::config("sync.gripping_threshold must be within 0..=1"));
        }

        match &self.hub.sequence {
            SequenceSourceConfig::Generated { joint_count: 0, .. }
            | SequenceSourceConfig::File { joint_count: 0, .. } => {
                Err(RelayError::config("hub.sequence.joint_count must be greater than zero"))
            }
            SequenceSourceConfig::Generated { frame_count: 0, .. } => {
                Err(RelayError::config("hub.sequence.frame_count must be greater than zero"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = RelayConfig::default();
        assert_eq!(config.client.heartbeat_interval(), Duration::from_secs(15));
        assert_eq!(config.client.max_reconnect_attempts, 3);
        assert_eq!(config.client.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(config.hub.heartbeat_timeout(), Duration::from_secs(30));
        assert_eq!(config.hub.sweep_interval(), Duration::from_secs(10));
        assert_eq!(config.playback.first_frame_duration(), Duration::from_secs(1));
        assert_eq!(config.playback.min_frame_duration(), Duration::from_millis(100));
        assert_eq!(config.sync.gripping_threshold, 0.3);
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(RelayConfig::from_yaml_str("").unwrap(), RelayConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = RelayConfig::from_yaml_str(
            "client:\n  name: arm-7\n  max_reconnect_attempts: 5\nhub:\n  sequence:\n    kind: file\n    path: wave.json\n    joint_count: 4\n",
        )
        .unwrap();
        assert_eq!(config.client.name, "arm-7");
        assert_eq!(config.client.max_reconnect_attempts, 5);
        assert_eq!(config.client.heartbeat_interval_ms, 15_000);
        assert_eq!(
            config.hub.sequence,
            SequenceSourceConfig::File { path: PathBuf::from("wave.json"), joint_count: 4 }
        );
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let err = RelayConfig::from_yaml_str("playback:\n  tick_interval_ms: 0\n").unwrap_err();
        assert!(err.to_string().contains("tick_interval_ms"));
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        assert!(RelayConfig::from_yaml_str("sync:\n  gripping_threshold: 1.5\n").is_err());
    }

    #[test]
    fn yaml_round_trip() {
        let config = RelayConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(RelayConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = RelayConfig::from_yaml_str("hub: [unterminated").unwrap_err();
        assert!(matches!(err, RelayError::Config { .. }));
    }
}
