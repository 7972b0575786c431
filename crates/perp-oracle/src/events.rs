//! Event bus for store notifications.
//!
//! Every subscriber gets its own bounded buffer; a slow subscriber lags and
//! loses the oldest events, it never blocks a push.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use perp_types::OracleEvent;
use tokio::sync::broadcast;

/// Default per-subscriber buffer.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Broadcasts [`OracleEvent`]s to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<OracleEvent>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: OracleEvent) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(event = event.name(), instrument = %event.instrument(), "emit");
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OracleEvent> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("sequence", &self.sequence())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
