//! TCP server implementation.

use crate::broadcast::BroadcastHub;
use crate::config::Config;
use crate::connection::handle_connection;
use crate::coordinator::{ClientEvent, Coordinator};
use crate::error::ServerError;
use crate::lobby::PromotionPolicy;
use broadside_core::MatchConfig;
use broadside_protocol::ChecksumKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

/// Capacity of the channel from connection handlers to the coordinator.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Runtime server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Checksum trailer width on the wire.
    pub checksum: ChecksumKind,
    /// Messages per second per connection.
    pub rate_limit: f64,
    /// Consecutive over-budget messages tolerated before closing.
    pub rate_limit_hard_cap: u32,
    /// Consecutive bad frames tolerated before closing.
    pub max_strikes: u32,
    /// Per-connection outbox size.
    pub outbox_capacity: usize,
    /// How the next players are chosen.
    pub promotion_policy: PromotionPolicy,
    /// Deadline sweep period.
    pub sweep_interval: Duration,
    /// Countdown announced before each match starts.
    pub start_countdown: Duration,
    /// Fleet and timing for every match.
    pub match_config: MatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builds the runtime form of a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            max_connections: config.network.max_connections,
            checksum: config.protocol.checksum,
            rate_limit: config.limits.rate_limit_per_sec,
            rate_limit_hard_cap: config.limits.rate_limit_hard_cap,
            max_strikes: config.limits.max_strikes,
            outbox_capacity: config.limits.outbox_capacity,
            promotion_policy: config.game.promotion_policy,
            sweep_interval: config.game.sweep_interval(),
            start_countdown: config.game.start_countdown(),
            match_config: MatchConfig {
                fleet: config.game.fleet.clone(),
                turn_timeout: config.game.turn_timeout(),
                placement_timeout: config.game.placement_timeout(),
                reconnect_grace: config.game.reconnect_grace(),
                max_skipped_turns: config.game.max_skipped_turns,
            },
        }
    }

    /// Sets the match rules.
    pub fn with_match_config(mut self, match_config: MatchConfig) -> Self {
        self.match_config = match_config;
        self
    }

    /// Sets the per-connection message rate.
    pub fn with_rate_limit(mut self, per_sec: f64) -> Self {
        self.rate_limit = per_sec;
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for broadside.
pub struct Server {
    config: ServerConfig,
    hub: Arc<BroadcastHub>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            hub: Arc::new(BroadcastHub::new()),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let coordinator_shutdown = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            "Server listening on {} (max {} connections, {:?} checksum)",
            listener.local_addr()?,
            self.config.max_connections,
            self.config.checksum
        );

        let (events_tx, events_rx) = mpsc::channel::<ClientEvent>(EVENT_CHANNEL_CAPACITY);
        let coordinator = Coordinator::new(
            self.hub.clone(),
            self.config.match_config.clone(),
            self.config.max_connections,
            self.config.promotion_policy,
            self.config.sweep_interval,
            self.config.start_countdown,
        );
        let coordinator_task = tokio::spawn(coordinator.run(events_rx, coordinator_shutdown));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let stats = self.stats.clone();
                            let config = self.config.clone();
                            let events = events_tx.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let result =
                                    handle_connection(stream, addr, config, events, &mut conn_shutdown)
                                        .await;

                                match result {
                                    Ok(()) => {}
                                    Err(ServerError::Lobby(e)) => {
                                        tracing::debug!("Connection {} rejected: {}", addr, e);
                                        stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                                    }
                                    Err(ServerError::ShuttingDown) => {}
                                    Err(e) => {
                                        tracing::debug!("Connection {} error: {}", addr, e);
                                        stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                    }
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        drop(events_tx);
        if let Err(e) = coordinator_task.await {
            tracing::error!("Coordinator task failed: {}", e);
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Connections currently registered for broadcasts.
    pub fn connected(&self) -> usize {
        self.hub.len()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
