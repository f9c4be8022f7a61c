//! Service heartbeat.
//!
//! Periodically broadcasts a PING envelope to the services channel and stamps
//! `last_ping` on every online service. Replies come back as PONG envelopes
//! and are handled by the dispatcher. Deciding that a silent service is dead
//! is left to whoever reads the timestamps.

use crate::envelope::Envelope;
use crate::registry::ServiceRegistry;
use crate::transport::Transport;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Send one heartbeat. Returns the number of services pinged.
pub async fn send_heartbeat(
    services: &ServiceRegistry,
    transport: &dyn Transport,
    channel: &str,
) -> usize {
    let now = Utc::now();
    let online = services.online();
    for service in &online {
        services.record_ping(&service.name, now);
    }

    if let Err(e) = transport.publish(channel, Envelope::ping().encode()).await {
        warn!(channel = %channel, error = %e, "Failed to publish heartbeat");
    } else {
        debug!(channel = %channel, services = online.len(), "Heartbeat sent");
    }
    online.len()
}

/// Spawn the heartbeat task. It runs every `interval` until `shutdown` fires.
pub fn spawn_heartbeat_task(
    services: Arc<ServiceRegistry>,
    transport: Arc<dyn Transport>,
    channel: String,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so services get a
        // chance to register first.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    send_heartbeat(&services, transport.as_ref(), &channel).await;
                }
            }
        }
    })
}

/// Wait for the heartbeat task to end. A panicked or aborted task is
/// logged and reported as `false`.
pub async fn join_heartbeat(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Heartbeat task failed");
            false
        }
    }
}
