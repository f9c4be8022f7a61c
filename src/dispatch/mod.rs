//! Envelope dispatch.
//!
//! One call to [`Dispatcher::dispatch`] per inbound broker payload:
//!
//! 1. Decode the envelope. Failures are logged and dropped.
//! 2. Outbound text (`PRIVMSG`, `NOTICE`) is formatted as an IRC line and
//!    queued on the named connection.
//! 3. Anything else fans out to every handler bound to the command, each on
//!    its own worker task.
//! 4. Service lifecycle commands (`REGISTER`, `PONG`) also update the service
//!    registry.
//!
//! Nothing is ever reported back to the sender.

mod pool;

pub use pool::WorkerPool;

use crate::config::DispatchConfig;
use crate::envelope::{self, Envelope, Meta};
use crate::error::DispatchError;
use crate::registry::{CommandRegistry, HandlerContext, RegisterOutcome, Service, ServiceRegistry};
use crate::transport::{ConnectionLookup, EnqueueError, Enqueued};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What a successfully routed envelope turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// A line was queued on an IRC connection. `deferred` lines wait behind
    /// a full queue and are fed to it in order by a background task.
    Outbound {
        connection: String,
        line: String,
        deferred: bool,
    },
    /// Handlers were launched and/or the service registry was updated.
    Dispatched {
        handlers: usize,
        lifecycle: Option<Lifecycle>,
    },
}

/// Service registry update performed for a lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Registered {
        service: String,
        outcome: RegisterOutcome,
    },
    Pong {
        service: String,
        known: bool,
    },
}

pub struct Dispatcher {
    commands: Arc<CommandRegistry>,
    services: Arc<ServiceRegistry>,
    connections: Arc<dyn ConnectionLookup>,
    pool: WorkerPool,
}

impl Dispatcher {
    pub fn new(
        config: &DispatchConfig,
        commands: Arc<CommandRegistry>,
        services: Arc<ServiceRegistry>,
        connections: Arc<dyn ConnectionLookup>,
    ) -> Self {
        Self {
            commands,
            services,
            connections,
            pool: WorkerPool::new(config.max_workers, config.handler_timeout()),
        }
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Handle one raw broker payload. Never fails and never panics on bad
    /// input; every drop is logged.
    pub async fn dispatch(&self, raw: &[u8]) {
        match self.route(raw).await {
            Ok(routed) => trace!(?routed, "Envelope routed"),
            Err(DispatchError::UnknownCommand(command)) => {
                debug!(command = %command, "No handlers for command");
            }
            Err(error) => {
                warn!(code = error.error_code(), error = %error, "Dropping envelope");
            }
        }
    }

    /// Route one raw payload and report what happened.
    pub async fn route(&self, raw: &[u8]) -> Result<Routed, DispatchError> {
        let envelope = Envelope::decode(raw)?;

        if envelope::is_outbound_text(&envelope.command) {
            return self.relay(&envelope);
        }

        let envelope = Arc::new(envelope);
        let handlers = self.launch_handlers(&envelope).await;
        let lifecycle = self.apply_lifecycle(&envelope)?;

        if handlers == 0 && lifecycle.is_none() {
            return Err(DispatchError::UnknownCommand(envelope.command.clone()));
        }
        Ok(Routed::Dispatched {
            handlers,
            lifecycle,
        })
    }

    /// Wait for every handler launched so far to finish.
    pub async fn wait_idle(&self) {
        self.pool.wait_idle().await;
    }

    /// Cancel in-flight handlers and refuse new ones.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    fn relay(&self, envelope: &Envelope) -> Result<Routed, DispatchError> {
        let Some(connection) = self.connections.connection_by_name(&envelope.connection) else {
            return Err(DispatchError::UnresolvedConnection(
                envelope.connection.clone(),
            ));
        };

        let line = envelope.outbound_line();
        debug!(connection = %connection.name(), line = %line, "Robot -> IRC");
        let deferred = match connection.enqueue(line.clone()) {
            Ok(Enqueued::Sent) => false,
            Ok(Enqueued::Deferred { start_flush }) => {
                if start_flush {
                    debug!(connection = %connection.name(), "Outbound queue full, deferring");
                    let flusher = connection.clone();
                    self.pool.spawn_background("flush_outbound", async move {
                        if let Err(e) = flusher.flush_overflow().await {
                            warn!(connection = %flusher.name(), error = %e, "Outbound backlog discarded");
                        }
                    });
                }
                true
            }
            Err(EnqueueError::Closed) => {
                return Err(DispatchError::OutboundClosed(envelope.connection.clone()));
            }
            Err(EnqueueError::Backlogged) => {
                return Err(DispatchError::OutboundBacklog(envelope.connection.clone()));
            }
        };

        Ok(Routed::Outbound {
            connection: envelope.connection.clone(),
            line,
            deferred,
        })
    }

    async fn launch_handlers(&self, envelope: &Arc<Envelope>) -> usize {
        let handlers = self.commands.handlers_for(&envelope.command);
        let mut launched = 0;
        for handler in handlers {
            let ctx = self.context();
            let task_envelope = Arc::clone(envelope);
            let name = handler.name().to_string();
            let task = async move { handler.handle(ctx, task_envelope).await };
            if self.pool.launch(&name, &envelope.command, task).await {
                launched += 1;
            } else {
                debug!(handler = %name, "Dispatcher shutting down, handler not launched");
            }
        }
        if launched > 0 {
            debug!(command = %envelope.command, launched, "Dispatched handlers");
        }
        launched
    }

    fn apply_lifecycle(&self, envelope: &Envelope) -> Result<Option<Lifecycle>, DispatchError> {
        if !envelope::requires_service_identity(&envelope.command) {
            return Ok(None);
        }
        let Some(identity) = envelope.meta.as_ref().and_then(Meta::service) else {
            return Err(DispatchError::Registration(format!(
                "{} without a service identity",
                envelope.command
            )));
        };

        let lifecycle = match envelope.command.as_str() {
            envelope::REGISTER => {
                let outcome = self.services.register(Service::from(identity));
                Lifecycle::Registered {
                    service: identity.name.clone(),
                    outcome,
                }
            }
            _ => {
                let known = self.services.record_pong(&identity.name, Utc::now());
                if known {
                    self.services.increment_responded(&identity.name);
                }
                Lifecycle::Pong {
                    service: identity.name.clone(),
                    known,
                }
            }
        };
        Ok(Some(lifecycle))
    }

    fn context(&self) -> HandlerContext {
        HandlerContext {
            services: Arc::clone(&self.services),
            connections: Arc::clone(&self.connections),
            cancel: self.pool.cancel_token().child_token(),
        }
    }
}
