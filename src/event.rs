//! Lifecycle events and their delivery.

use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Something that happened to a client's connection.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// The socket is open; registration is about to start.
    SocketConnect,
    /// Registration completed.
    Connect,
    /// The client shut down without reconnecting.
    Disconnect,
    /// A reconnect was attempted.
    Reconnect {
        /// Whether the reconnect succeeded.
        success: bool,
        /// Why it failed.
        cause: Option<String>,
    },
}

/// Receives lifecycle events from a client.
pub trait EventBus: Send + Sync {
    /// Deliver one event.
    fn dispatch(&self, event: Event);

    /// Stop delivering events. Called once at the end of every shutdown.
    fn shutdown(&self) {}
}

/// Event bus that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogBus;

impl EventBus for LogBus {
    fn dispatch(&self, event: Event) {
        debug!(?event, "event");
    }
}

/// Event bus backed by an unbounded tokio channel.
///
/// Events sent after the receiver is dropped are discarded.
#[derive(Clone, Debug)]
pub struct ChannelBus {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelBus {
    /// A bus and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventBus for ChannelBus {
    fn dispatch(&self, event: Event) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            trace!(?event, "event receiver dropped");
        }
    }

    fn shutdown(&self) {
        // the sender lives as long as the client; a reconnect keeps using it
        debug!("event bus shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bus_delivers_in_order() {
        let (bus, mut rx) = ChannelBus::new();
        bus.dispatch(Event::SocketConnect);
        bus.dispatch(Event::Connect);

        assert_eq!(rx.recv().await, Some(Event::SocketConnect));
        assert_eq!(rx.recv().await, Some(Event::Connect));
    }

    #[test]
    fn test_dispatch_after_receiver_dropped() {
        let (bus, rx) = ChannelBus::new();
        drop(rx);
        bus.dispatch(Event::Disconnect);
        bus.shutdown();
    }
}
