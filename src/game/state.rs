//! Player State Store
//!
//! Single source of truth for every registered player. Each player owns one
//! composite record (movement, rotation, position, outbound connection), so
//! registration and removal are atomic from any observer's point of view.
//!
//! Operations take the lock exactly once. There is no cross-player
//! transaction: a snapshot may interleave with joins and leaves on other
//! players.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};
use tokio::sync::RwLock;

use crate::core::position::{Position, Rotation};
use crate::game::spawn::SpawnPool;
use crate::network::hub::ConnectionHandle;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier (random UUID, never reused).
///
/// Serialized as the hyphenated UUID string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub uuid::Uuid);

impl PlayerId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse from a UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl fmt::Debug for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerId({})", self.0.hyphenated())
    }
}

// =============================================================================
// PLAYER RECORD
// =============================================================================

/// Control name to active flag. Absent keys mean "not active".
pub type MovementFlags = BTreeMap<String, bool>;

/// Everything the server knows about one player.
#[derive(Debug)]
struct PlayerRecord {
    /// Registration order, for stable roster ordering.
    join_seq: u64,
    movement: MovementFlags,
    rotation: Option<Rotation>,
    position: Option<Position>,
    connection: ConnectionHandle,
}

/// Copy of one player's mutable state.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerView {
    /// Player identifier
    pub id: PlayerId,
    /// Merged movement flags
    pub movement: MovementFlags,
    /// Last reported rotation
    pub rotation: Option<Rotation>,
    /// Current position
    pub position: Option<Position>,
}

/// One roster line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RosterEntry {
    /// Player identifier
    pub id: PlayerId,
    /// Current position
    pub position: Position,
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Debug, Default)]
struct StoreInner {
    players: BTreeMap<PlayerId, PlayerRecord>,
    next_join_seq: u64,
}

/// Concurrent player registry.
#[derive(Debug)]
pub struct PlayerStore {
    inner: RwLock<StoreInner>,
    spawns: SpawnPool,
}

impl PlayerStore {
    /// Create an empty store using the given spawn pool.
    pub fn new(spawns: SpawnPool) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            spawns,
        }
    }

    /// Register a new player behind `connection`.
    ///
    /// The spawn point is chosen from the number of players registered at
    /// this moment; counting and inserting happen under the same write lock.
    pub async fn register(&self, connection: ConnectionHandle) -> (PlayerId, Position) {
        self.register_with(connection, |_, _, _| {}).await
    }

    /// Register a new player, running `admit` before the record becomes
    /// visible to any other reader of the store.
    ///
    /// `admit` runs under the write lock and must not touch the store.
    pub async fn register_with<F>(&self, connection: ConnectionHandle, admit: F) -> (PlayerId, Position)
    where
        F: FnOnce(&ConnectionHandle, PlayerId, Position),
    {
        let mut inner = self.inner.write().await;

        let id = loop {
            let candidate = PlayerId::generate();
            if !inner.players.contains_key(&candidate) {
                break candidate;
            }
        };

        let spawn = self.spawns.assign(inner.players.len());
        let join_seq = inner.next_join_seq;
        inner.next_join_seq += 1;

        admit(&connection, id, spawn);
        inner.players.insert(id, PlayerRecord {
            join_seq,
            movement: MovementFlags::new(),
            rotation: None,
            position: Some(spawn),
            connection,
        });

        (id, spawn)
    }

    /// Merge movement flags into the player's map.
    ///
    /// Keys not present in `flags` keep their previous value.
    pub async fn apply_movement(&self, id: &PlayerId, flags: &MovementFlags) -> bool {
        let mut inner = self.inner.write().await;
        match inner.players.get_mut(id) {
            Some(record) => {
                record.movement.extend(flags.iter().map(|(k, v)| (k.clone(), *v)));
                true
            }
            None => false,
        }
    }

    /// Replace the player's rotation.
    pub async fn apply_rotation(&self, id: &PlayerId, rotation: Rotation) -> bool {
        let mut inner = self.inner.write().await;
        match inner.players.get_mut(id) {
            Some(record) => {
                record.rotation = Some(rotation);
                true
            }
            None => false,
        }
    }

    /// Replace the player's position.
    ///
    /// `None` stands for a reported position that could not be decoded: the
    /// prior position is kept, or the origin is used if there is none.
    pub async fn apply_position(&self, id: &PlayerId, position: Option<Position>) -> bool {
        let mut inner = self.inner.write().await;
        match inner.players.get_mut(id) {
            Some(record) => {
                match position {
                    Some(p) => record.position = Some(p),
                    None => {
                        record.position.get_or_insert(Position::ORIGIN);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Remove the player and its connection handle.
    ///
    /// Unknown identifiers are a no-op.
    pub async fn deregister(&self, id: &PlayerId) -> bool {
        let mut inner = self.inner.write().await;
        inner.players.remove(id).is_some()
    }

    /// Check whether a player is registered.
    pub async fn contains(&self, id: &PlayerId) -> bool {
        self.inner.read().await.players.contains_key(id)
    }

    /// Number of registered players.
    pub async fn len(&self) -> usize {
        self.inner.read().await.players.len()
    }

    /// Check if no players are registered.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.players.is_empty()
    }

    /// Roster of all players in join order.
    pub async fn snapshot(&self) -> Vec<RosterEntry> {
        let inner = self.inner.read().await;
        let mut entries: Vec<(u64, RosterEntry)> = inner.players.iter()
            .map(|(id, record)| {
                (record.join_seq, RosterEntry {
                    id: *id,
                    position: record.position.unwrap_or(Position::ORIGIN),
                })
            })
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Copy of one player's state.
    pub async fn player_view(&self, id: &PlayerId) -> Option<PlayerView> {
        let inner = self.inner.read().await;
        inner.players.get(id).map(|record| PlayerView {
            id: *id,
            movement: record.movement.clone(),
            rotation: record.rotation,
            position: record.position,
        })
    }

    /// Live connection handles, optionally skipping one player.
    pub async fn connections(&self, except: Option<&PlayerId>) -> Vec<(PlayerId, ConnectionHandle)> {
        let inner = self.inner.read().await;
        inner.players.iter()
            .filter(|(id, _)| Some(*id) != except)
            .map(|(id, record)| (*id, record.connection.clone()))
            .collect()
    }
}

impl Default for PlayerStore {
    fn default() -> Self {
        Self::new(SpawnPool::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    fn test_handle() -> ConnectionHandle {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        ConnectionHandle::channel(addr, 8).0
    }

    fn flags(pairs: &[(&str, bool)]) -> MovementFlags {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_player_id_roundtrip() {
        let id = PlayerId::generate();
        let text = id.to_string();
        assert_eq!(PlayerId::from_uuid_str(&text), Some(id));
        assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{}\"", text));
        assert_eq!(PlayerId::from_uuid_str("not-a-uuid"), None);
    }

    #[tokio::test]
    async fn test_register_assigns_spawn_by_count() {
        let store = PlayerStore::default();
        let (a, pos_a) = store.register(test_handle()).await;
        let (b, pos_b) = store.register(test_handle()).await;

        assert_ne!(a, b);
        assert_eq!(pos_a, Position::new(-8.0, 0.0, -8.0));
        assert_eq!(pos_b, Position::new(8.0, 0.0, -8.0));
        assert_eq!(store.len().await, 2);

        let view = store.player_view(&a).await.unwrap();
        assert!(view.movement.is_empty());
        assert_eq!(view.rotation, None);
        assert_eq!(view.position, Some(pos_a));
    }

    #[tokio::test]
    async fn test_spawn_reused_after_leave() {
        let store = PlayerStore::default();
        let (a, _) = store.register(test_handle()).await;
        let (_b, _) = store.register(test_handle()).await;
        store.deregister(&a).await;

        // One player left, so the next joiner gets index 1 again.
        let (_c, pos_c) = store.register(test_handle()).await;
        assert_eq!(pos_c, Position::new(8.0, 0.0, -8.0));
    }

    #[tokio::test]
    async fn test_movement_merge() {
        let store = PlayerStore::default();
        let (id, _) = store.register(test_handle()).await;

        assert!(store.apply_movement(&id, &flags(&[("forward", true)])).await);
        assert!(store.apply_movement(&id, &flags(&[("left", true)])).await);
        assert_eq!(
            store.player_view(&id).await.unwrap().movement,
            flags(&[("forward", true), ("left", true)]),
        );

        store.apply_movement(&id, &flags(&[("forward", false)])).await;
        assert_eq!(
            store.player_view(&id).await.unwrap().movement,
            flags(&[("forward", false), ("left", true)]),
        );
    }

    #[tokio::test]
    async fn test_rotation_and_position_replace() {
        let store = PlayerStore::default();
        let (id, _) = store.register(test_handle()).await;

        store.apply_rotation(&id, Rotation::new(0.1, 0.2)).await;
        store.apply_rotation(&id, Rotation::new(0.3, 0.4)).await;
        store.apply_position(&id, Some(Position::new(1.0, 2.0, 3.0))).await;

        let view = store.player_view(&id).await.unwrap();
        assert_eq!(view.rotation, Some(Rotation::new(0.3, 0.4)));
        assert_eq!(view.position, Some(Position::new(1.0, 2.0, 3.0)));
    }

    #[tokio::test]
    async fn test_malformed_position_keeps_prior() {
        let store = PlayerStore::default();
        let (id, spawn) = store.register(test_handle()).await;

        assert!(store.apply_position(&id, None).await);
        assert_eq!(store.player_view(&id).await.unwrap().position, Some(spawn));
    }

    #[tokio::test]
    async fn test_updates_on_unknown_player_ignored() {
        let store = PlayerStore::default();
        let ghost = PlayerId::generate();

        assert!(!store.apply_movement(&ghost, &flags(&[("forward", true)])).await);
        assert!(!store.apply_rotation(&ghost, Rotation::default()).await);
        assert!(!store.apply_position(&ghost, Some(Position::ORIGIN)).await);
        assert!(store.player_view(&ghost).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_deregister_idempotent() {
        let store = PlayerStore::default();
        let (id, _) = store.register(test_handle()).await;

        assert!(store.deregister(&id).await);
        assert!(!store.deregister(&id).await);
        assert!(!store.deregister(&PlayerId::generate()).await);
        assert!(!store.contains(&id).await);
        assert!(store.connections(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_in_join_order() {
        let store = PlayerStore::default();
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(store.register(test_handle()).await.0);
        }

        let roster: Vec<PlayerId> = store.snapshot().await.iter().map(|e| e.id).collect();
        assert_eq!(roster, ids);
    }

    #[tokio::test]
    async fn test_connections_except() {
        let store = PlayerStore::default();
        let (a, _) = store.register(test_handle()).await;
        let (b, _) = store.register(test_handle()).await;

        let all = store.connections(None).await;
        assert_eq!(all.len(), 2);

        let others: Vec<PlayerId> = store.connections(Some(&a)).await.into_iter().map(|(id, _)| id).collect();
        assert_eq!(others, vec![b]);
    }

    #[tokio::test]
    async fn test_concurrent_register_deregister() {
        let store = Arc::new(PlayerStore::default());

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let (id, _) = store.register(test_handle()).await;
                let _ = store.snapshot().await;
                store.deregister(&id).await
            }));
        }

        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert!(store.is_empty().await);
    }
}
