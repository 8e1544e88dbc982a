//! Relay hub: accepts simulator clients, assigns identities, routes their
//! messages and pushes scheduled sequence playback.
//!
//! # Architecture
//!
//! ```text
//!  WebSocket task ──┐                         ┌── Roster (id → ClientRecord)
//!  WebSocket task ──┼── HubCommand ──► HubCore ┤
//!  sequence task ───┤     (mpsc)               └── SequenceScheduler (id → tickets)
//!  sequence load ───┤
//!  sweep interval ──┘
//! ```
//!
//! One task runs [`HubCore`]; everything else talks to it through
//! [`HubCommand`]s, so roster and timer state are single-owner.
//!
//! # Example
//!
//! ```rust,no_run
//! use simrelay::config::HubConfig;
//! use simrelay::hub::RelayHub;
//!
//! #[tokio::main]
//! async fn main() -> simrelay::Result<()> {
//!     let hub = RelayHub::bind(HubConfig::default()).await?.spawn()?;
//!     hub.closed().await;
//!     Ok(())
//! }
//! ```

mod connection;
mod core;
mod roster;
mod scheduler;
mod server;

pub use connection::{HubConnection, Outgoing};
pub use core::{HubCommand, HubCore};
pub use roster::{ClientRecord, Roster};
pub use scheduler::{ScheduleTicket, SequenceScheduler};
pub use server::{HubHandle, RelayHub};

#[cfg(test)]
mod tests;
