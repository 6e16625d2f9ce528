//! Connection Session
//!
//! Drives one accepted connection through its lifecycle:
//!
//! ```text
//! AwaitingHandshake ──ok──▶ Connected ──close / decode fault / io error──▶ Closed
//!         │                  ▲     │
//!         └──failed──────────┼─────┼──────────────────────────────────────▶ Closed
//!                            └─────┘ one frame decoded, dispatched, broadcast
//! ```
//!
//! Frames from one connection are handled strictly in arrival order.

use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, instrument, warn};

use crate::game::state::PlayerId;
use crate::network::frame::{read_frame, FrameError};
use crate::network::handshake::negotiate;
use crate::network::hub::{write_outbound, BroadcastHub, ConnectionHandle};
use crate::network::protocol::{ClientMessage, Field, HitReport, MovementReport, ServerMessage};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the HTTP upgrade request.
    AwaitingHandshake,
    /// Registered and exchanging frames.
    Connected,
    /// Terminal.
    Closed,
}

/// One connection's session.
pub struct ConnectionSession {
    peer: SocketAddr,
    hub: BroadcastHub,
    outbound_capacity: usize,
    state: SessionState,
    player_id: Option<PlayerId>,
}

impl ConnectionSession {
    /// Create a session for a freshly accepted connection.
    pub fn new(peer: SocketAddr, hub: BroadcastHub, outbound_capacity: usize) -> Self {
        Self {
            peer,
            hub,
            outbound_capacity,
            state: SessionState::AwaitingHandshake,
            player_id: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Player registered by this session, once connected.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    /// Run the session to completion over `stream`.
    #[instrument(skip_all, fields(peer = %self.peer))]
    pub async fn run<S>(&mut self, stream: S) -> SessionState
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        if self.state != SessionState::AwaitingHandshake {
            return self.state;
        }

        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        if let Err(e) = negotiate(&mut reader, &mut write_half).await {
            warn!("Closing {}: {}", self.peer, e);
            self.state = SessionState::Closed;
            return self.state;
        }
        debug!("Handshake completed with {}", self.peer);

        let (handle, mut outbound) = ConnectionHandle::channel(self.peer, self.outbound_capacity);
        let mut evicted = handle.eviction_watch();
        let peer = self.peer;
        tokio::spawn(async move {
            tokio::select! {
                result = write_outbound(&mut write_half, &mut outbound) => {
                    if let Err(e) = result {
                        debug!("Writer for {} stopped: {}", peer, e);
                    }
                    let _ = write_half.shutdown().await;
                }
                _ = async { let _ = evicted.wait_for(|evicted| *evicted).await; } => {
                    debug!("Writer for {} evicted", peer);
                }
            }
        });

        // init is queued before the record is visible to other sessions.
        let store = self.hub.store().clone();
        let hub = &self.hub;
        let (player_id, spawn) = store.register_with(handle.clone(), |handle, id, spawn| {
            hub.send_one(handle, &ServerMessage::init(id, spawn));
        }).await;
        self.player_id = Some(player_id);
        self.state = SessionState::Connected;
        info!("Player {} joined from {} at {:?}", player_id, self.peer, spawn);

        self.hub.broadcast_roster().await;

        loop {
            let frame = tokio::select! {
                frame = read_frame(&mut reader) => frame,
                _ = handle.evicted() => {
                    warn!("Dropping player {}: outbound queue full", player_id);
                    break;
                }
            };

            match frame {
                Ok(text) => self.dispatch(player_id, &text).await,
                Err(FrameError::ConnectionClosed) => {
                    debug!("Player {} closed the connection", player_id);
                    break;
                }
                Err(e) => {
                    warn!("Dropping player {}: {}", player_id, e);
                    break;
                }
            }
        }

        store.deregister(&player_id).await;
        self.hub.broadcast_roster().await;
        drop(handle);
        self.state = SessionState::Closed;
        info!("Player {} left", player_id);

        self.state
    }

    /// Classify one decoded payload and act on it.
    async fn dispatch(&self, player_id: PlayerId, text: &str) {
        let message = match ClientMessage::from_json(text) {
            Ok(m) => m,
            Err(e) => {
                debug!("Ignoring malformed payload from {}: {}", player_id, e);
                return;
            }
        };

        match message {
            ClientMessage::PlayerMovement(report) => {
                self.handle_movement(player_id, report).await;
            }
            ClientMessage::PlayerShoot => {
                self.hub.broadcast_except(text, &player_id).await;
            }
            ClientMessage::PlayerHit(hit) => {
                self.handle_hit(hit).await;
            }
            ClientMessage::Unknown => {
                debug!("Ignoring unknown message type from {}", player_id);
            }
        }
    }

    async fn handle_movement(&self, player_id: PlayerId, report: MovementReport) {
        let store = self.hub.store();

        if let Some(flags) = report.movement_flags() {
            store.apply_movement(&player_id, flags).await;
        } else if report.player_movement.is_some() {
            debug!("Skipping malformed movement flags from {}", player_id);
        }

        match report.rotation {
            Some(Field::Valid(rotation)) => {
                store.apply_rotation(&player_id, rotation).await;
            }
            Some(Field::Malformed) => debug!("Skipping malformed rotation from {}", player_id),
            None => {}
        }

        match report.position {
            Some(Field::Valid(position)) => {
                store.apply_position(&player_id, Some(position)).await;
            }
            Some(Field::Malformed) => {
                debug!("Skipping malformed position from {}", player_id);
                store.apply_position(&player_id, None).await;
            }
            None => {}
        }

        if let Some(view) = store.player_view(&player_id).await {
            self.hub.broadcast_all(&ServerMessage::player_update(view)).await;
        }
    }

    async fn handle_hit(&self, hit: HitReport) {
        let store = self.hub.store();
        let shooter = PlayerId::from_uuid_str(&hit.shooter_id);
        let target = PlayerId::from_uuid_str(&hit.target_id);

        let valid = match (shooter, target) {
            (Some(s), Some(t)) => store.contains(&s).await && store.contains(&t).await,
            _ => false,
        };

        if valid {
            debug!("Player {} hit {} for {}", hit.shooter_id, hit.target_id, hit.damage);
            self.hub.broadcast_all(&ServerMessage::PlayerHit(hit)).await;
        } else {
            debug!("Dropping hit {} -> {}: unknown player", hit.shooter_id, hit.target_id);
        }
    }
}
