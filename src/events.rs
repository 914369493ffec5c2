/// file: src/events.rs
/// description: Lifecycle event bus decoupling the connection manager from the UI
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    Connecting { url: String },
    Connected { connection_id: String },
    Disconnected { reason: String },
    ConnectFailed { error: String },
    ReconnectScheduled { attempt: u32, delay: Duration },
    ReconnectExhausted { attempts: u32 },
    SessionJoined { session_id: u64 },
    SessionLeft { session_id: u64 },
    CommandSent { name: String },
}

// Lifecycle traffic is low volume; a full buffer means nobody is reading.
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

pub type EventSender = mpsc::Sender<ManagerEvent>;
pub type EventReceiver = mpsc::Receiver<ManagerEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Publishes without waiting; dropped events are only logged.
pub fn publish(sender: &EventSender, event: ManagerEvent) {
    if let Err(e) = sender.try_send(event) {
        debug!("Lifecycle event dropped: {}", e);
    }
}
