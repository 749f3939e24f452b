//! In-process event broadcast.
//!
//! Single producer side shared by all components; any number of consumers.
//! Subscribers receive each event at least once while subscribed; late
//! subscribers do not replay history.

use tokio::sync::broadcast;

use crate::event::BusEvent;

const BUS_CAPACITY: usize = 256;

/// Broadcast bus for core lifecycle events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<BusEvent>,
}

impl Bus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Emit an event. A send error only means no subscriber is listening.
    pub fn emit(&self, event: BusEvent) {
        tracing::trace!(?event, "bus emit");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
