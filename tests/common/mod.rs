//! Integration test common infrastructure.
//!
//! Spins up a dispatcher behind an in-memory broker with one IRC connection
//! named `freenode`.

use std::sync::Arc;
use std::time::Duration;
use tenyks::config::DispatchConfig;
use tenyks::transport::{
    Connection, ConnectionMap, MemoryBroker, MemoryTransport, Transport, run_receive_loop,
};
use tenyks::{CommandRegistry, Dispatcher, ServiceRegistry};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const WEATHER_ID: &str = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";

pub struct TestBot {
    pub dispatcher: Arc<Dispatcher>,
    pub services: Arc<ServiceRegistry>,
    pub broker: MemoryBroker,
    pub freenode: mpsc::Receiver<String>,
    pub transport: Arc<dyn Transport>,
    pub shutdown: CancellationToken,
    receive_loop: JoinHandle<()>,
}

impl TestBot {
    pub fn spawn(commands: CommandRegistry) -> Self {
        let connections = ConnectionMap::new();
        let (freenode, freenode_rx) = Connection::new("freenode", 16);
        connections.insert(freenode);

        let services = Arc::new(ServiceRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            &DispatchConfig::default(),
            Arc::new(commands),
            Arc::clone(&services),
            Arc::new(connections),
        ));

        let (transport, broker) = MemoryTransport::new(16);
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let shutdown = CancellationToken::new();
        let receive_loop = tokio::spawn(run_receive_loop(
            Arc::clone(&dispatcher),
            Arc::clone(&transport),
            shutdown.clone(),
        ));

        Self {
            dispatcher,
            services,
            broker,
            freenode: freenode_rx,
            transport,
            shutdown,
            receive_loop,
        }
    }

    /// Push a raw payload onto the robot channel.
    pub async fn send(&self, raw: impl Into<Vec<u8>>) {
        self.broker
            .inbound
            .send(raw.into())
            .await
            .expect("receive loop alive");
    }

    /// Wait for the next line queued on `freenode`.
    pub async fn next_line(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), self.freenode.recv())
            .await
            .ok()
            .flatten()
    }

    /// Stop the receive loop and wait for handlers to unwind.
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.receive_loop.await.expect("receive loop panicked");
        self.dispatcher.shutdown().await;
    }
}

pub fn register_json(name: &str) -> String {
    format!(r#"{{"command":"REGISTER","meta":{{"name":"{name}","version":"1.0","UUID":"{WEATHER_ID}"}}}}"#)
}
