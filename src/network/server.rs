//! Game Server
//!
//! Accepts TCP connections and runs one [`ConnectionSession`] per connection
//! on a bounded worker pool. The pool size caps concurrent sessions; what
//! happens to connections beyond the cap is set by [`OverflowPolicy`].

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use crate::core::position::Position;
use crate::game::spawn::{SpawnError, SpawnPool};
use crate::game::state::PlayerStore;
use crate::network::hub::BroadcastHub;
use crate::network::session::ConnectionSession;

/// What to do with a connection that arrives while every worker is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Stop accepting until a worker frees up; new peers wait in the
    /// listen backlog.
    #[default]
    Queue,
    /// Accept and immediately drop the connection.
    Reject,
}

impl FromStr for OverflowPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(OverflowPolicy::Queue),
            "reject" => Ok(OverflowPolicy::Reject),
            _ => Err(ConfigError::InvalidValue {
                name: "SKIRMISH_OVERFLOW",
                value: s.to_string(),
            }),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Worker pool size (maximum concurrent sessions).
    pub max_connections: usize,
    /// Behaviour when the pool is exhausted.
    pub overflow: OverflowPolicy,
    /// Frames queued per connection before it is evicted.
    pub outbound_buffer: usize,
    /// Spawn points in assignment order.
    pub spawn_points: SpawnPool,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], crate::DEFAULT_PORT)),
            max_connections: 64,
            overflow: OverflowPolicy::Queue,
            outbound_buffer: 256,
            spawn_points: SpawnPool::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("SKIRMISH_BIND_ADDR") {
            config.bind_addr = parse_var("SKIRMISH_BIND_ADDR", &v)?;
        }
        if let Some(v) = lookup("SKIRMISH_MAX_CONNECTIONS") {
            config.max_connections = parse_var("SKIRMISH_MAX_CONNECTIONS", &v)?;
            if config.max_connections == 0 {
                return Err(ConfigError::InvalidValue { name: "SKIRMISH_MAX_CONNECTIONS", value: v });
            }
        }
        if let Some(v) = lookup("SKIRMISH_OVERFLOW") {
            config.overflow = v.parse()?;
        }
        if let Some(v) = lookup("SKIRMISH_OUTBOUND_BUFFER") {
            config.outbound_buffer = parse_var("SKIRMISH_OUTBOUND_BUFFER", &v)?;
        }
        if let Some(v) = lookup("SKIRMISH_SPAWN_POINTS") {
            config.spawn_points = parse_spawn_points(&v)?;
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

/// Parse `x,y,z;x,y,z;...` into a spawn pool.
fn parse_spawn_points(value: &str) -> Result<SpawnPool, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        name: "SKIRMISH_SPAWN_POINTS",
        value: value.to_string(),
    };

    let mut points = Vec::new();
    for point in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let coords: Vec<f64> = point.split(',')
            .map(|c| c.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;
        match coords.as_slice() {
            [x, y, z] => points.push(Position::new(*x, *y, *z)),
            _ => return Err(invalid()),
        }
    }

    Ok(SpawnPool::new(points)?)
}

/// Pause after a failed `accept`, e.g. on file descriptor exhaustion.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

async fn accept_backoff(err: &std::io::Error) {
    error!("Accept error: {}, retrying in {:?}", err, ACCEPT_ERROR_BACKOFF);
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable could not be parsed.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// Spawn point list is unusable.
    #[error("Invalid spawn points: {0}")]
    Spawn(#[from] SpawnError),
}

/// Game server errors.
#[derive(Debug, Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Broadcast hub over the shared player store.
    hub: BroadcastHub,
    /// Worker pool permits.
    workers: Arc<Semaphore>,
    /// Shutdown signal.
    shutdown_tx: watch::Sender<bool>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(PlayerStore::new(config.spawn_points.clone()));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            workers: Arc::new(Semaphore::new(config.max_connections)),
            hub: BroadcastHub::new(store),
            config,
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    ///
    /// Sessions still running when this returns are left to drain.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            let reserved = match self.config.overflow {
                OverflowPolicy::Queue => {
                    tokio::select! {
                        permit = self.workers.clone().acquire_owned() => match permit {
                            Ok(p) => Some(p),
                            Err(_) => break,
                        },
                        _ = shutdown_rx.changed() => continue,
                    }
                }
                OverflowPolicy::Reject => None,
            };

            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let permit = match reserved {
                                Some(p) => p,
                                None => match self.workers.clone().try_acquire_owned() {
                                    Ok(p) => p,
                                    Err(_) => {
                                        warn!("Worker pool full, rejecting {}", addr);
                                        continue;
                                    }
                                },
                            };

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr, permit);
                        }
                        Err(e) => accept_backoff(&e).await,
                    }
                }
                _ = shutdown_rx.changed() => {}
            }
        }

        info!("Listener closed, letting active sessions drain");
        Ok(())
    }

    /// Run a session for a new connection on a pooled worker.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, permit: OwnedSemaphorePermit) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let mut session = ConnectionSession::new(addr, self.hub.clone(), self.config.outbound_buffer);

        tokio::spawn(async move {
            session.run(stream).await;
            drop(permit);
            debug!("Worker for {} released", addr);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The shared player store.
    pub fn store(&self) -> &Arc<PlayerStore> {
        self.hub.store()
    }

    /// Number of sessions currently holding a worker.
    pub fn active_sessions(&self) -> usize {
        self.config.max_connections - self.workers.available_permits()
    }

    /// Number of registered players.
    pub async fn player_count(&self) -> usize {
        self.hub.store().len().await
    }
}
