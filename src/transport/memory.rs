//! In-process transport backed by tokio channels.

use super::Transport;
use crate::error::TransportError;
use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

/// A transport whose broker is a pair of channels.
///
/// Useful for embedding the core in another process and for tests.
pub struct MemoryTransport {
    inbound: Mutex<mpsc::Receiver<Vec<u8>>>,
    published: mpsc::UnboundedSender<(String, Vec<u8>)>,
}

/// The broker side of a [`MemoryTransport`].
pub struct MemoryBroker {
    /// Deliver a raw payload to the transport's `receive`.
    pub inbound: mpsc::Sender<Vec<u8>>,
    /// Everything the transport published, as `(channel, payload)`.
    pub published: mpsc::UnboundedReceiver<(String, Vec<u8>)>,
}

impl MemoryTransport {
    pub fn new(capacity: usize) -> (Self, MemoryBroker) {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
        let (published_tx, published_rx) = mpsc::unbounded_channel();
        (
            Self {
                inbound: Mutex::new(inbound_rx),
                published: published_tx,
            },
            MemoryBroker {
                inbound: inbound_tx,
                published: published_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn receive(&self) -> Option<Vec<u8>> {
        self.inbound.lock().await.recv().await
    }

    async fn publish(&self, channel: &str, raw: Vec<u8>) -> Result<(), TransportError> {
        self.published
            .send((channel.to_string(), raw))
            .map_err(|_| TransportError::Closed)
    }
}
