//! Broadcast Hub
//!
//! Serializes server messages once and queues the text to one, all, or
//! all-but-one live connections. Each connection drains its own queue through
//! the frame codec on a dedicated writer task, which keeps per-connection
//! order and means a slow or dead peer never stalls delivery to the others.
//!
//! A connection whose queue is full is evicted: its session and writer stop
//! and the player is deregistered. A peer therefore either receives every
//! broadcast in order or is disconnected.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use crate::game::state::{PlayerId, PlayerStore};
use crate::network::frame::write_text_frame;
use crate::network::protocol::ServerMessage;

/// Serialized message text shared by every recipient.
pub type Outbound = Arc<str>;

/// Per-connection delivery errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Outbound queue is full. The connection has been evicted.
    #[error("Outbound queue full, connection evicted")]
    Backlogged,

    /// Writer task has stopped.
    #[error("Connection closed")]
    Disconnected,
}

/// Sending side of one connection's outbound queue.
///
/// The player store keeps a clone for broadcasts; the writer task that owns
/// the socket stops once every clone is dropped or the connection is evicted.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    peer: SocketAddr,
    tx: mpsc::Sender<Outbound>,
    evicted: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    /// Wrap an existing queue sender.
    pub fn new(peer: SocketAddr, tx: mpsc::Sender<Outbound>) -> Self {
        let (evicted, _) = watch::channel(false);
        Self { peer, tx, evicted: Arc::new(evicted) }
    }

    /// Create a handle together with the queue it feeds.
    pub fn channel(peer: SocketAddr, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(peer, tx), rx)
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Check whether the writer has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Check whether the connection has been evicted.
    pub fn is_evicted(&self) -> bool {
        *self.evicted.borrow()
    }

    /// Mark the connection for teardown.
    pub fn evict(&self) {
        self.evicted.send_replace(true);
    }

    /// Resolve once the connection is evicted.
    pub async fn evicted(&self) {
        let mut rx = self.evicted.subscribe();
        let _ = rx.wait_for(|evicted| *evicted).await;
    }

    /// Eviction signal for the writer task, which must not hold a handle.
    pub fn eviction_watch(&self) -> watch::Receiver<bool> {
        self.evicted.subscribe()
    }

    /// Queue text without waiting.
    ///
    /// A full queue evicts the connection instead of skipping the message.
    pub fn deliver(&self, text: Outbound) -> Result<(), DeliveryError> {
        if self.is_evicted() {
            return Err(DeliveryError::Backlogged);
        }
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                self.evict();
                DeliveryError::Backlogged
            }
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }
}

/// Drain a connection's queue into its socket until the queue closes.
///
/// Each message is written as one text frame and flushed.
pub async fn write_outbound<W>(writer: &mut W, rx: &mut mpsc::Receiver<Outbound>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(text) = rx.recv().await {
        write_text_frame(writer, text.as_bytes()).await?;
    }
    Ok(())
}

/// Fan-out of server messages over the player store's connections.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    store: Arc<PlayerStore>,
}

impl BroadcastHub {
    /// Create a hub over the given store.
    pub fn new(store: Arc<PlayerStore>) -> Self {
        Self { store }
    }

    /// The underlying player store.
    pub fn store(&self) -> &Arc<PlayerStore> {
        &self.store
    }

    /// Send a message to every registered connection.
    ///
    /// Returns the number of connections it was queued to.
    pub async fn broadcast_all(&self, message: &ServerMessage) -> usize {
        let Some(text) = Self::encode(message) else {
            return 0;
        };
        let targets = self.store.connections(None).await;
        Self::fan_out(&targets, &text)
    }

    /// Send raw text to every connection except the sender's.
    pub async fn broadcast_except(&self, text: &str, sender: &PlayerId) -> usize {
        let targets = self.store.connections(Some(sender)).await;
        Self::fan_out(&targets, &Outbound::from(text))
    }

    /// Send a message to a single connection.
    pub fn send_one(&self, handle: &ConnectionHandle, message: &ServerMessage) -> bool {
        let Some(text) = Self::encode(message) else {
            return false;
        };
        match handle.deliver(text) {
            Ok(()) => true,
            Err(e) => {
                warn!("Delivery to {} failed: {}", handle.peer(), e);
                false
            }
        }
    }

    /// Broadcast the current roster to everyone.
    pub async fn broadcast_roster(&self) -> usize {
        let roster = self.store.snapshot().await;
        self.broadcast_all(&ServerMessage::player_list(&roster)).await
    }

    fn encode(message: &ServerMessage) -> Option<Outbound> {
        match message.to_json() {
            Ok(json) => Some(Outbound::from(json)),
            Err(e) => {
                error!("Failed to serialize message: {}", e);
                None
            }
        }
    }

    fn fan_out(targets: &[(PlayerId, ConnectionHandle)], text: &Outbound) -> usize {
        let mut delivered = 0;
        for (player_id, handle) in targets {
            match handle.deliver(text.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Delivery to player {} ({}) failed: {}", player_id, handle.peer(), e),
            }
        }
        debug!("Queued {} bytes to {}/{} connections", text.len(), delivered, targets.len());
        delivered
    }
}
