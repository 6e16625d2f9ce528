//! Core value types.
//!
//! Plain geometric types shared by the game state and the wire protocol.

pub mod position;

// Re-export core types
pub use position::{Position, Rotation};
