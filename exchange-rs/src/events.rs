//! Exchange event channel
//!
//! Observers (an operator console, a log tailer, tests) subscribe to a
//! broadcast channel and receive every accept, stop, reload and committed
//! mailbox mutation. Publishing never blocks and is a no-op without
//! subscribers.

use std::net::SocketAddr;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    Started { addr: SocketAddr },
    Accepted { peer: SocketAddr },
    /// Connection turned away because the worker pool was saturated
    Rejected { peer: SocketAddr },
    Closed { peer: SocketAddr },
    Unauthorized { address: String },
    MailAdded { owner: String, id: String },
    MailRemoved { owner: String, id: String },
    Reloaded { users: usize },
    Stopped,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ExchangeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: ExchangeEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
