//! Relay hub, reconnecting transport client and keyframe playback for
//! robot-arm simulators.
//!
//! SimRelay connects simulator instances and control panels through a
//! central hub speaking JSON `{type, data}` messages over WebSocket.
//!
//! # Features
//!
//! - **Relay Hub**: client registry, heartbeat eviction, message routing and
//!   timed push of action sequences
//! - **Transport Client**: heartbeat, bounded fixed-delay reconnection,
//!   typed event listeners and message streams
//! - **Frame Queue**: buffered keyframe playback with one transition in
//!   flight and generation-safe stop
//! - **Control Session**: joint control, reset, emergency stop and periodic
//!   state publication bound to a [`RobotModel`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use simrelay::{ControlSession, RelayConfig, RelayHub, SimulatedArm, TransportClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> simrelay::Result<()> {
//!     let config = RelayConfig::default();
//!     let hub = RelayHub::bind(config.hub.clone()).await?.spawn()?;
//!
//!     let client = TransportClient::websocket(config.client.clone());
//!     client.connect().await?;
//!
//!     let session = ControlSession::new(client, Arc::new(SimulatedArm::six_axis()), &config);
//!     session.request_test_sequence();
//!
//!     hub.closed().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod protocol;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Sequence sources
pub mod source;
pub mod sources;

// Hub and client
pub mod hub;
pub mod transport;

// Playback and control
pub mod model;
pub mod playback;
pub mod session;
pub mod stream;

// Core exports
pub use config::RelayConfig;
pub use error::*;
pub use types::*;

// Main API exports
pub use hub::{HubHandle, RelayHub};
pub use model::{RobotModel, SimulatedArm};
pub use playback::{FrameQueue, PlaybackObserver, PlaybackStatus};
pub use session::ControlSession;
pub use source::SequenceSource;
pub use transport::{ConnectionStatus, TransportClient};
