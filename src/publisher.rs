//! Publish seam towards the MQTT transport

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::command::OutboundMessage;

/// Fire-and-forget publish primitive supplied by the host
pub trait CommandPublisher: Send + Sync {
    fn publish(&self, message: OutboundMessage);
}

/// Publisher that hands messages to a channel drained by the host loop
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end for the transport task
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CommandPublisher for ChannelPublisher {
    fn publish(&self, message: OutboundMessage) {
        debug!("Publishing to {}", message.topic);
        if let Err(e) = self.tx.send(message) {
            warn!("Publish dropped, transport closed: {}", e.0.topic);
        }
    }
}
