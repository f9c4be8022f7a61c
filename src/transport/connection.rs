//! Outbound IRC connections as seen by the dispatcher.
//!
//! The dispatcher never touches sockets. It only needs a named queue of raw
//! lines; whoever owns the socket drains the other end.
//!
//! When the queue is full, lines park in a per-connection overflow and a
//! single flush task feeds them to the writer in order. The dispatcher itself
//! never waits on a slow connection.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendError, TrySendError};

/// What happened to a line handed to [`Connection::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The line is in the writer's queue.
    Sent,
    /// The queue was full; the line waits in the overflow.
    ///
    /// `start_flush` is set for exactly one caller per backlog, which must
    /// run [`Connection::flush_overflow`] on a background task.
    Deferred { start_flush: bool },
}

/// Why a line could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The writer has gone away.
    Closed,
    /// Queue and overflow are both full.
    Backlogged,
}

/// Handle to one IRC connection's outbound queue.
#[derive(Debug, Clone)]
pub struct Connection {
    name: String,
    outbound: mpsc::Sender<String>,
    overflow: Arc<Mutex<VecDeque<String>>>,
    overflow_limit: usize,
}

impl Connection {
    /// Create a connection handle with a bounded outbound queue.
    ///
    /// The receiver is handed to the task that writes to the socket. The
    /// overflow holds at most `capacity` more lines.
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let capacity = capacity.max(1);
        let (outbound, rx) = mpsc::channel(capacity);
        (
            Self {
                name: name.into(),
                outbound,
                overflow: Arc::new(Mutex::new(VecDeque::new())),
                overflow_limit: capacity,
            },
            rx,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a raw line, waiting for room if the writer is behind.
    ///
    /// Fails only if the writer has gone away.
    pub async fn send_line(&self, line: String) -> Result<(), SendError<String>> {
        self.outbound.send(line).await
    }

    /// Queue a raw line without waiting.
    ///
    /// Lines keep their order: once anything sits in the overflow, later
    /// lines join it instead of jumping ahead into the queue.
    pub fn enqueue(&self, line: String) -> Result<Enqueued, EnqueueError> {
        let mut overflow = self.overflow.lock();
        if !overflow.is_empty() {
            if overflow.len() >= self.overflow_limit {
                return Err(EnqueueError::Backlogged);
            }
            overflow.push_back(line);
            return Ok(Enqueued::Deferred { start_flush: false });
        }
        match self.outbound.try_send(line) {
            Ok(()) => Ok(Enqueued::Sent),
            Err(TrySendError::Closed(_)) => Err(EnqueueError::Closed),
            Err(TrySendError::Full(line)) => {
                overflow.push_back(line);
                Ok(Enqueued::Deferred { start_flush: true })
            }
        }
    }

    /// Move overflowed lines into the queue as the writer makes room.
    ///
    /// Returns once the overflow is empty. If the writer goes away the
    /// remaining lines are discarded.
    pub async fn flush_overflow(&self) -> Result<usize, SendError<()>> {
        let mut flushed = 0;
        loop {
            let permit = match self.outbound.reserve().await {
                Ok(permit) => permit,
                Err(e) => {
                    self.overflow.lock().clear();
                    return Err(e);
                }
            };
            let drained = {
                let mut overflow = self.overflow.lock();
                // Pop only once the slot is held so a concurrent enqueue
                // still sees a backlog and keeps its place in line.
                if let Some(line) = overflow.pop_front() {
                    permit.send(line);
                    flushed += 1;
                }
                overflow.is_empty()
            };
            if drained {
                return Ok(flushed);
            }
        }
    }

    /// Lines waiting in the overflow.
    pub fn backlog(&self) -> usize {
        self.overflow.lock().len()
    }
}

/// Resolves a connection by the name carried in an envelope.
pub trait ConnectionLookup: Send + Sync {
    fn connection_by_name(&self, name: &str) -> Option<Connection>;
}

/// Connection lookup backed by a concurrent map.
#[derive(Debug, Default)]
pub struct ConnectionMap {
    connections: DashMap<String, Connection>,
}

impl ConnectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, replacing any previous one with the same name.
    pub fn insert(&self, connection: Connection) -> Option<Connection> {
        self.connections
            .insert(connection.name.clone(), connection)
    }

    pub fn remove(&self, name: &str) -> Option<Connection> {
        self.connections.remove(name).map(|(_, connection)| connection)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl ConnectionLookup for ConnectionMap {
    fn connection_by_name(&self, name: &str) -> Option<Connection> {
        // Clone out so the shard guard drops before the caller awaits a send.
        self.connections.get(name).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_returns_working_handle() {
        let map = ConnectionMap::new();
        let (conn, mut rx) = Connection::new("freenode", 4);
        map.insert(conn);

        let found = map.connection_by_name("freenode").expect("connection");
        assert_eq!(found.name(), "freenode");
        found.send_line("PRIVMSG #test :hi".into()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("PRIVMSG #test :hi"));
    }

    #[test]
    fn unknown_name_resolves_to_none() {
        let map = ConnectionMap::new();
        assert!(map.connection_by_name("bogus").is_none());
    }

    #[test]
    fn insert_replaces_and_remove_forgets() {
        let map = ConnectionMap::new();
        let (first, _rx1) = Connection::new("efnet", 1);
        let (second, _rx2) = Connection::new("efnet", 1);
        assert!(map.insert(first).is_none());
        assert!(map.insert(second).is_some());
        assert_eq!(map.len(), 1);
        assert!(map.remove("efnet").is_some());
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn send_fails_once_writer_is_gone() {
        let (conn, rx) = Connection::new("freenode", 1);
        drop(rx);
        assert!(conn.send_line("QUIT".into()).await.is_err());
        assert_eq!(conn.enqueue("QUIT".into()), Err(EnqueueError::Closed));
    }

    #[test]
    fn full_queue_defers_instead_of_waiting() {
        let (conn, _rx) = Connection::new("slow", 1);
        assert_eq!(conn.enqueue("one".into()), Ok(Enqueued::Sent));
        assert_eq!(
            conn.enqueue("two".into()),
            Ok(Enqueued::Deferred { start_flush: true })
        );
        assert_eq!(
            conn.enqueue("three".into()),
            Err(EnqueueError::Backlogged)
        );
        assert_eq!(conn.backlog(), 1);
    }

    #[tokio::test]
    async fn overflow_drains_in_order() {
        let (conn, mut rx) = Connection::new("slow", 2);
        assert_eq!(conn.enqueue("a".into()), Ok(Enqueued::Sent));
        assert_eq!(conn.enqueue("b".into()), Ok(Enqueued::Sent));
        assert_eq!(
            conn.enqueue("c".into()),
            Ok(Enqueued::Deferred { start_flush: true })
        );
        assert_eq!(
            conn.enqueue("d".into()),
            Ok(Enqueued::Deferred { start_flush: false })
        );

        let flusher = conn.clone();
        let flush = tokio::spawn(async move { flusher.flush_overflow().await });

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(rx.recv().await.unwrap());
        }
        assert_eq!(seen, ["a", "b", "c", "d"]);
        assert_eq!(flush.await.unwrap(), Ok(2));
        assert_eq!(conn.backlog(), 0);

        // Backlog gone, so the next line goes straight to the queue.
        assert_eq!(conn.enqueue("e".into()), Ok(Enqueued::Sent));
    }

    #[tokio::test]
    async fn flush_discards_backlog_when_writer_leaves() {
        let (conn, rx) = Connection::new("slow", 1);
        conn.enqueue("one".into()).unwrap();
        conn.enqueue("two".into()).unwrap();
        drop(rx);
        assert!(conn.flush_overflow().await.is_err());
        assert_eq!(conn.backlog(), 0);
    }
}
