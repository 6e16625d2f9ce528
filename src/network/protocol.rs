//! Protocol Messages
//!
//! JSON documents carried in WebSocket text frames. Every document has a
//! `type` discriminator; keys are camelCase.
//!
//! Client reports are decoded leniently: a sub-field with the wrong shape
//! becomes [`Field::Malformed`] instead of failing the whole message, so the
//! rest of the report can still be applied.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::core::position::{Position, Rotation};
use crate::game::state::{MovementFlags, PlayerId, PlayerView, RosterEntry};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Movement, rotation and/or position report.
    PlayerMovement(MovementReport),

    /// Weapon fired. Forwarded verbatim to the other players.
    PlayerShoot,

    /// One player claims to have hit another.
    PlayerHit(HitReport),

    /// Any other `type`. Ignored.
    #[serde(other)]
    Unknown,
}

/// A sub-field that was present in a client report.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    /// Decoded successfully.
    Valid(T),
    /// Present but with the wrong shape or types.
    Malformed,
}

impl<T> Field<T> {
    /// The decoded value, if any.
    pub fn valid(self) -> Option<T> {
        match self {
            Field::Valid(v) => Some(v),
            Field::Malformed => None,
        }
    }
}

/// Body of a `playerMovement` report. Every sub-field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementReport {
    /// Wrapper holding the movement flags.
    #[serde(default, deserialize_with = "reported")]
    pub player_movement: Option<Field<MovementControls>>,
    /// New view rotation.
    #[serde(default, deserialize_with = "reported")]
    pub rotation: Option<Field<Rotation>>,
    /// New position.
    #[serde(default, deserialize_with = "reported")]
    pub position: Option<Field<Position>>,
}

/// Contents of `playerMovement.playerMovement`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MovementControls {
    /// Flags to merge into the player's movement map.
    #[serde(default, deserialize_with = "reported")]
    pub movement: Option<Field<MovementFlags>>,
}

impl MovementReport {
    /// Movement flags, if they were present and well formed.
    pub fn movement_flags(&self) -> Option<&MovementFlags> {
        match &self.player_movement {
            Some(Field::Valid(MovementControls { movement: Some(Field::Valid(flags)) })) => Some(flags),
            _ => None,
        }
    }
}

/// `playerHit` body, used in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitReport {
    /// Player who fired.
    pub shooter_id: String,
    /// Player who was hit.
    pub target_id: String,
    /// Damage dealt.
    pub damage: i64,
}

/// Decode a present field, turning shape errors into [`Field::Malformed`].
fn reported<'de, D, T>(deserializer: D) -> Result<Option<Field<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Some(match serde_json::from_value(value) {
        Ok(v) => Field::Valid(v),
        Err(_) => Field::Malformed,
    }))
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Identity and spawn point, sent only to the joining connection.
    Init(InitInfo),

    /// Full roster, sent to everyone on every join and leave.
    PlayerList(PlayerList),

    /// One player's current movement state.
    PlayerUpdate(PlayerUpdate),

    /// Confirmed hit.
    PlayerHit(HitReport),
}

/// `init` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitInfo {
    /// Identity assigned to this connection.
    pub player_id: PlayerId,
    /// Spawn position.
    pub position: Position,
}

/// `playerList` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerList {
    /// Registered players in join order.
    pub players: Vec<RosterPlayer>,
}

/// Roster line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterPlayer {
    /// Player identifier.
    pub id: PlayerId,
    /// Current position.
    pub position: Position,
}

/// `playerUpdate` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    /// Player the update is about.
    pub player_id: PlayerId,
    /// Full merged movement map.
    pub player_movement: MovementFlags,
    /// Last reported rotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Rotation>,
    /// Current position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl ServerMessage {
    /// Build an `init` message.
    pub fn init(player_id: PlayerId, position: Position) -> Self {
        ServerMessage::Init(InitInfo { player_id, position })
    }

    /// Build a `playerList` message from a roster snapshot.
    pub fn player_list(roster: &[RosterEntry]) -> Self {
        ServerMessage::PlayerList(PlayerList {
            players: roster.iter()
                .map(|e| RosterPlayer { id: e.id, position: e.position })
                .collect(),
        })
    }

    /// Build a `playerUpdate` message from a player view.
    pub fn player_update(view: PlayerView) -> Self {
        ServerMessage::PlayerUpdate(PlayerUpdate {
            player_id: view.id,
            player_movement: view.movement,
            rotation: view.rotation,
            position: view.position,
        })
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
