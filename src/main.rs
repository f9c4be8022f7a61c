//! tenyks - service coordination daemon.
//!
//! Reads envelopes as JSON lines on stdin, publishes to services as
//! `<channel>\t<json>` lines on stdout, and logs the IRC lines it would write
//! to each configured connection.

use std::sync::Arc;
use tenyks::config::Config;
use tenyks::heartbeat::{join_heartbeat, spawn_heartbeat_task};
use tenyks::transport::{Connection, ConnectionMap, StdioTransport, Transport, run_receive_loop};
use tenyks::{CommandRegistry, Dispatcher, ServiceRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries published envelopes, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tenyks.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        connections = config.connections.len(),
        services_channel = %config.broker.services_channel,
        robot_channel = %config.broker.robot_channel,
        max_workers = config.dispatch.max_workers,
        "Starting tenyks"
    );

    let connections = Arc::new(ConnectionMap::new());
    for (name, block) in &config.connections {
        let (connection, mut outbound) =
            Connection::new(name.clone(), config.dispatch.outbound_capacity);
        connections.insert(connection);

        for join in block.joins() {
            info!(connection = %name, line = %join.join_line(), "Channel configured");
        }

        let name = name.clone();
        let host = block.host.clone();
        tokio::spawn(async move {
            while let Some(line) = outbound.recv().await {
                info!(connection = %name, host = %host, line = %line, "Robot -> IRC");
            }
        });
    }

    let services = Arc::new(ServiceRegistry::new());
    let commands = Arc::new(CommandRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(
        &config.dispatch,
        commands,
        Arc::clone(&services),
        connections,
    ));
    let transport: Arc<dyn Transport> = Arc::new(StdioTransport::new());
    let shutdown = CancellationToken::new();

    let heartbeat = config.heartbeat.enabled.then(|| {
        spawn_heartbeat_task(
            Arc::clone(&services),
            Arc::clone(&transport),
            config.broker.services_channel.clone(),
            config.heartbeat.interval(),
            shutdown.clone(),
        )
    });

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down: user disconnect");
                shutdown.cancel();
            }
        });
    }

    run_receive_loop(Arc::clone(&dispatcher), transport, shutdown.clone()).await;

    shutdown.cancel();
    dispatcher.shutdown().await;
    if let Some(task) = heartbeat {
        join_heartbeat(task).await;
    }
    info!(services = services.len(), "Bye.");
    Ok(())
}
