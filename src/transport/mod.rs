//! Pub/sub transport seam.
//!
//! The broker link itself is someone else's problem. The core only needs a
//! stream of raw payloads in, a way to publish raw payloads out, and a way to
//! find the outbound queue of a named IRC connection.

mod codec;
mod connection;
mod memory;
mod stdio;

pub use connection::{Connection, ConnectionLookup, ConnectionMap, EnqueueError, Enqueued};
pub use memory::{MemoryBroker, MemoryTransport};
pub use codec::RawLineCodec;
pub use stdio::{LineTransport, StdioTransport};

use crate::dispatch::Dispatcher;
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A publish/subscribe link to the broker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Next inbound payload, or `None` once the link is closed.
    async fn receive(&self) -> Option<Vec<u8>>;

    /// Publish a payload on a broker channel.
    async fn publish(&self, channel: &str, raw: Vec<u8>) -> Result<(), TransportError>;
}

/// Feed every inbound payload to the dispatcher until the transport closes or
/// `shutdown` fires.
///
/// Payloads are handed over one at a time; `dispatch` returns as soon as the
/// handlers for a payload are launched.
pub async fn run_receive_loop(
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
) {
    let mut received: u64 = 0;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(received, "Receive loop stopping");
                break;
            }
            raw = transport.receive() => match raw {
                Some(raw) => {
                    received += 1;
                    debug!(bytes = raw.len(), "Robot <- broker");
                    dispatcher.dispatch(&raw).await;
                }
                None => {
                    info!(received, "Transport closed");
                    break;
                }
            },
        }
    }
}
