//! # Skirmish Server
//!
//! Hand-rolled WebSocket endpoint and authoritative state hub for Skirmish
//! multiplayer sessions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SKIRMISH SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Plain value types                        │
//! │  └── position.rs  - Position (x, y, z) and Rotation          │
//! │                                                              │
//! │  game/            - Authoritative player state               │
//! │  ├── state.rs     - Concurrent player store                  │
//! │  └── spawn.rs     - Spawn point allocation                   │
//! │                                                              │
//! │  network/         - Wire protocol and connection handling    │
//! │  ├── frame.rs     - WebSocket frame codec                    │
//! │  ├── handshake.rs - HTTP upgrade negotiation                 │
//! │  ├── protocol.rs  - Message types                            │
//! │  ├── hub.rs       - Broadcast fan-out                        │
//! │  ├── session.rs   - Per-connection state machine             │
//! │  └── server.rs    - Listener and bounded worker pool         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! Every player lives in exactly one record of the [`game::state::PlayerStore`],
//! together with the outbound handle used to reach it. Registration and
//! removal touch that single record, so peers never see a player whose
//! connection is already gone. Roster and update broadcasts are best-effort
//! over a copied view and may briefly lag concurrent joins or leaves.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::position::{Position, Rotation};
pub use game::spawn::SpawnPool;
pub use game::state::{PlayerId, PlayerStore};
pub use network::server::{GameServer, ServerConfig, GameServerError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9090;
