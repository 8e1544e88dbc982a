//! Publish/subscribe registry for inbound messages and local events

use futures::{Stream, StreamExt, future};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, trace, warn};

use crate::Result;
use crate::protocol::Message;

/// Callback invoked with every message of the type it was registered for.
pub type Listener = Arc<dyn Fn(&Message) -> Result<()> + Send + Sync>;

/// Stream of messages of one type, see [`EventRegistry::subscribe`].
pub type MessageStream = Pin<Box<dyn Stream<Item = Message> + Send>>;

/// Handle returned by [`EventRegistry::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

const STREAM_CAPACITY: usize = 256;

/// Listener lists keyed by message type.
///
/// Dispatch works on a snapshot of the list, so listeners may register or
/// unregister (themselves included) while being called. Each listener is
/// isolated: an `Err` or a panic is logged and the remaining listeners
/// still run.
pub struct EventRegistry {
    listeners: RwLock<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
    streams: broadcast::Sender<Message>,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        let (streams, _) = broadcast::channel(STREAM_CAPACITY);
        Self { listeners: RwLock::new(HashMap::new()), next_id: AtomicU64::new(1), streams }
    }

    pub fn on<F>(&self, kind: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Message) -> Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.entry(kind.into()).or_default().push((id, Arc::new(listener)));
        id
    }

    /// Unregister a listener. Returns whether it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = false;
        for list in listeners.values_mut() {
            let before = list.len();
            list.retain(|(existing, _)| *existing != id);
            removed |= list.len() != before;
        }
        listeners.retain(|_, list| !list.is_empty());
        removed
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        listeners.get(kind).map_or(0, Vec::len)
    }

    /// Messages of one type as a stream. A subscriber that falls more than
    /// the channel capacity behind skips the messages it missed.
    pub fn subscribe(&self, kind: impl Into<String>) -> MessageStream {
        let kind = kind.into();
        let stream = BroadcastStream::new(self.streams.subscribe()).filter_map(move |item| {
            let matched = match item {
                Ok(message) if message.kind() == kind => Some(message),
                Ok(_) => None,
                Err(e) => {
                    warn!(kind = %kind, "Subscriber lagged: {}", e);
                    None
                }
            };
            future::ready(matched)
        });
        Box::pin(stream)
    }

    /// Deliver one message to its listeners and subscribers.
    /// Returns the number of listeners that completed without error.
    pub fn dispatch(&self, message: &Message) -> usize {
        let snapshot: Vec<(ListenerId, Listener)> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            listeners.get(message.kind()).cloned().unwrap_or_default()
        };
        trace!(kind = message.kind(), listeners = snapshot.len(), "Dispatching");

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(message))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    error!(kind = message.kind(), listener = id.0, "Listener failed: {}", e)
                }
                Err(_) => error!(kind = message.kind(), listener = id.0, "Listener panicked"),
            }
        }

        // No subscribers is not an error.
        let _ = self.streams.send(message.clone());
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RelayError;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn message(kind: &str) -> Message {
        Message::new(kind, serde_json::json!({}))
    }

    #[test]
    fn failing_listeners_do_not_block_others() {
        let registry = EventRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        registry.on("robot_state_update", |_| Err(RelayError::protocol("test", "boom")));
        registry.on("robot_state_update", |_| panic!("listener bug"));
        let counter = calls.clone();
        registry.on("robot_state_update", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let delivered = registry.dispatch(&message("robot_state_update"));
        assert_eq!(delivered, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_is_keyed_by_type() {
        let registry = EventRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.on("reset_robot", move |m| {
            sink.lock().unwrap().push(m.kind().to_string());
            Ok(())
        });

        registry.dispatch(&message("emergency_stop"));
        registry.dispatch(&message("reset_robot"));
        assert_eq!(*seen.lock().unwrap(), vec!["reset_robot"]);
    }

    #[test]
    fn listener_can_unregister_itself_mid_dispatch() {
        let registry = Arc::new(EventRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let own_id = Arc::new(Mutex::new(None));

        let (reg, counter, slot) = (registry.clone(), calls.clone(), own_id.clone());
        let id = registry.on("sequence_frame", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *slot.lock().unwrap() {
                reg.off(id);
            }
            Ok(())
        });
        *own_id.lock().unwrap() = Some(id);

        registry.dispatch(&message("sequence_frame"));
        registry.dispatch(&message("sequence_frame"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.listener_count("sequence_frame"), 0);
    }

    #[test]
    fn off_reports_unknown_ids() {
        let registry = EventRegistry::new();
        let id = registry.on("connected", |_| Ok(()));
        assert!(registry.off(id));
        assert!(!registry.off(id));
    }

    #[tokio::test]
    async fn subscribe_filters_by_type() {
        let registry = EventRegistry::new();
        let mut stream = registry.subscribe("sequence_complete");

        registry.dispatch(&message("sequence_frame"));
        registry.dispatch(&message("sequence_complete"));

        let next = stream.next().await.unwrap();
        assert_eq!(next.kind(), "sequence_complete");
    }
}
