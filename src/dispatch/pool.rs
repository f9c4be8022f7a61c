//! Bounded worker pool for handler tasks.
//!
//! Each handler invocation runs as its own tokio task, but at most
//! `max_workers` run at once. Launching waits for a free slot, never for the
//! handler to finish. Every task is tracked so shutdown can cancel the
//! stragglers and wait for them to unwind.

use crate::error::HandlerResult;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info_span, trace, warn};

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    handler_timeout: Option<Duration>,
}

impl WorkerPool {
    pub fn new(max_workers: usize, handler_timeout: Option<Duration>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            handler_timeout,
        }
    }

    /// Token cancelled on shutdown. Handlers get a child of it.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Launch `task` once a worker slot is free.
    ///
    /// Returns `false` if the pool is shutting down and the task was dropped
    /// without running.
    pub async fn launch<F>(&self, handler: &str, command: &str, task: F) -> bool
    where
        F: Future<Output = HandlerResult> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return false;
        }
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return false;
        };

        let cancel = self.cancel.clone();
        let timeout = self.handler_timeout;
        let span = info_span!("handler", handler = %handler, command = %command);

        self.tracker.spawn(
            async move {
                let _permit = permit;
                let bounded = async move {
                    match timeout {
                        Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| limit),
                        None => Ok(task.await),
                    }
                };

                tokio::select! {
                    _ = cancel.cancelled() => debug!("Handler cancelled"),
                    outcome = bounded => match outcome {
                        Ok(Ok(())) => trace!("Handler finished"),
                        Ok(Err(error)) => warn!(error = %error, "Handler failed"),
                        Err(limit) => warn!(timeout_secs = limit.as_secs(), "Handler timed out"),
                    },
                }
            }
            .instrument(span),
        );
        true
    }

    /// Run housekeeping work, such as draining a connection's overflow, on
    /// the tracker without taking a worker slot. Cancelled on shutdown.
    pub fn spawn_background<F>(&self, label: &'static str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return false;
        }
        let cancel = self.cancel.clone();
        self.tracker.spawn(
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => debug!("Background task cancelled"),
                    () = task => trace!("Background task finished"),
                }
            }
            .instrument(info_span!("background", task = label)),
        );
        true
    }

    /// Number of handler tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every handler launched so far has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel outstanding handlers and wait for them to unwind. Launches after
    /// this point are refused.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.permits.close();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
