//! Typed publish/subscribe channel for monitor events
//!
//! Every subscriber gets its own unbounded queue, so no event is dropped for
//! a slow reader. Closed subscribers are pruned on the next publish.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use shared::MonitorEvent;

#[derive(Clone, Default)]
pub struct EventChannel {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<MonitorEvent>>>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<MonitorEvent>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MonitorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: MonitorEvent) {
        self.lock().retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
