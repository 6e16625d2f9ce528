//! Game State Module
//!
//! Authoritative player state shared by every connection.
//!
//! ## Module Structure
//!
//! - `state`: Concurrent player store (movement, rotation, position, connection)
//! - `spawn`: Spawn point pool and allocation

pub mod state;
pub mod spawn;

// Re-export key types
pub use state::{PlayerStore, PlayerId, PlayerView, RosterEntry, MovementFlags};
pub use spawn::{SpawnPool, SpawnError, DEFAULT_SPAWN_POINTS};
