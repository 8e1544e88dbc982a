//! Client side of the relay protocol
//!
//! [`TransportClient`] keeps one connection to a hub alive: it registers on
//! connect, heartbeats, reconnects a bounded number of times after an
//! unexpected close and fans inbound messages out through an
//! [`EventRegistry`]. How frames travel is behind the [`Connector`] seam:
//! [`WsConnector`] for a networked hub, [`HubConnector`] for one running in
//! the same process.

mod client;
mod connector;
mod events;
mod reconnect;

pub use client::{ConnectionStatus, TransportClient};
pub use connector::{CloseReason, Connector, HubConnector, Link, LinkEvent, WsConnector};
pub use events::{EventRegistry, Listener, ListenerId, MessageStream};
pub use reconnect::{ReconnectDecision, ReconnectPolicy, ReconnectState};
