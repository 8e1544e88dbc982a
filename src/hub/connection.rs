//! Hub-side view of one client connection

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::core::HubCommand;
use crate::protocol::Message;
use crate::{RelayError, Result};

/// What the hub asks a connection task to do with its transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// Send one encoded message
    Text(String),
    /// Close the transport
    Close,
}

/// One attached client: the hub's outbound queue for it plus a way to feed
/// inbound frames back. Dropping the connection detaches the client.
#[derive(Debug)]
pub struct HubConnection {
    client_id: u64,
    outbound: mpsc::UnboundedReceiver<Outgoing>,
    commands: mpsc::UnboundedSender<HubCommand>,
    detached: bool,
}

impl HubConnection {
    pub(crate) async fn attach(commands: mpsc::UnboundedSender<HubCommand>) -> Result<Self> {
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let (reply, assigned) = oneshot::channel();
        commands
            .send(HubCommand::Attach { outbound: outbound_tx, reply })
            .map_err(|_| RelayError::connection_failed("hub is shut down"))?;
        let client_id =
            assigned.await.map_err(|_| RelayError::connection_failed("hub is shut down"))?;
        Ok(Self { client_id, outbound, commands, detached: false })
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// Feed one inbound text frame to the hub.
    pub fn push_text(&self, text: impl Into<String>) -> Result<()> {
        self.commands
            .send(HubCommand::Inbound { client_id: self.client_id, text: text.into() })
            .map_err(|_| RelayError::Disconnected)
    }

    pub fn push(&self, message: &Message) -> Result<()> {
        self.push_text(message.encode()?)
    }

    /// Next thing the hub wants sent. `None` once the hub dropped this client.
    pub async fn recv(&mut self) -> Option<Outgoing> {
        self.outbound.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Outgoing> {
        self.outbound.try_recv().ok()
    }

    pub fn detach(&mut self) {
        if !self.detached {
            self.detached = true;
            debug!(client_id = self.client_id, "Detaching connection");
            let _ = self.commands.send(HubCommand::Detach { client_id: self.client_id });
        }
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        self.detach();
    }
}
