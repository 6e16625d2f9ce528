//! Spawn Point Allocation
//!
//! Maps a join index onto a fixed, ordered pool of spawn points.
//! The allocator keeps no per-player memory: the index is the number of
//! players registered at the moment of assignment, so spawn points are
//! reused once earlier players leave.

use thiserror::Error;

use crate::core::position::Position;

/// Default spawn pool: the four arena corners, then the four edge midpoints.
pub const DEFAULT_SPAWN_POINTS: [Position; 8] = [
    Position::new(-8.0, 0.0, -8.0),
    Position::new(8.0, 0.0, -8.0),
    Position::new(-8.0, 0.0, 8.0),
    Position::new(8.0, 0.0, 8.0),
    Position::new(0.0, 0.0, -8.0),
    Position::new(0.0, 0.0, 8.0),
    Position::new(-8.0, 0.0, 0.0),
    Position::new(8.0, 0.0, 0.0),
];

/// Spawn pool errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnError {
    /// A pool needs at least one point.
    #[error("Spawn pool must contain at least one point")]
    Empty,
}

/// Immutable, ordered spawn point pool.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnPool {
    points: Vec<Position>,
}

impl SpawnPool {
    /// Create a pool from an ordered list of points.
    pub fn new(points: Vec<Position>) -> Result<Self, SpawnError> {
        if points.is_empty() {
            return Err(SpawnError::Empty);
        }
        Ok(Self { points })
    }

    /// Spawn point for the given join index.
    #[inline]
    pub fn assign(&self, join_index: usize) -> Position {
        self.points[join_index % self.points.len()]
    }

    /// Number of distinct points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; an empty pool cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in assignment order.
    pub fn points(&self) -> &[Position] {
        &self.points
    }
}

impl Default for SpawnPool {
    fn default() -> Self {
        Self {
            points: DEFAULT_SPAWN_POINTS.to_vec(),
        }
    }
}
