//! Command handler registry.
//!
//! Maps a command name to the handlers bound to it. Handlers are registered
//! when plugins load and are read on every dispatch, so the map sits behind a
//! read-mostly lock.

use super::service::ServiceRegistry;
use crate::envelope::Envelope;
use crate::error::HandlerResult;
use crate::transport::ConnectionLookup;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared state handed to every handler invocation.
#[derive(Clone)]
pub struct HandlerContext {
    pub services: Arc<ServiceRegistry>,
    pub connections: Arc<dyn ConnectionLookup>,
    /// Cancelled when the dispatcher shuts down.
    pub cancel: CancellationToken,
}

/// A callback bound to a command name.
///
/// Handlers run on the dispatcher's worker pool. Several may run at once for
/// the same or different envelopes, so any state they share must bring its
/// own synchronization.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn handle(&self, ctx: HandlerContext, envelope: Arc<Envelope>) -> HandlerResult;
}

/// Registry of command handlers.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn Handler>>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `command`. Handlers for a command keep their
    /// registration order.
    pub fn register(&self, command: impl Into<String>, handler: Arc<dyn Handler>) {
        let command = command.into();
        debug!(command = %command, handler = %handler.name(), "Registering handler");
        self.handlers.write().entry(command).or_default().push(handler);
    }

    /// Handlers bound to `command`, in registration order.
    ///
    /// Matching is case-sensitive.
    pub fn handlers_for(&self, command: &str) -> Vec<Arc<dyn Handler>> {
        self.handlers
            .read()
            .get(command)
            .cloned()
            .unwrap_or_default()
    }

    /// Command names with at least one handler, sorted.
    pub fn commands(&self) -> Vec<String> {
        let mut commands: Vec<String> = self.handlers.read().keys().cloned().collect();
        commands.sort();
        commands
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
