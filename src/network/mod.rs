//! Network Layer
//!
//! Hand-rolled WebSocket endpoint: upgrade handshake, frame codec, typed
//! messages, broadcast fan-out and the per-connection session loop.

pub mod frame;
pub mod handshake;
pub mod protocol;
pub mod hub;
pub mod session;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use frame::{FrameError, encode_text_frame, read_frame, write_text_frame};
pub use handshake::{HandshakeError, derive_accept_key, negotiate};
pub use protocol::{ClientMessage, ServerMessage, HitReport, MovementReport};
pub use hub::{BroadcastHub, ConnectionHandle, DeliveryError};
pub use session::{ConnectionSession, SessionState};
pub use server::{GameServer, ServerConfig, OverflowPolicy, ConfigError, GameServerError};
