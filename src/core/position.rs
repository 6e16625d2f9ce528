//! World Position and View Rotation
//!
//! Floating-point 3D position and pitch/yaw rotation as reported by clients.
//! `Position` travels on the wire as a bare `[x, y, z]` array.

use std::fmt;
use serde::{Serialize, Deserialize};

/// 3D world position.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Position {
    /// X coordinate
    pub x: f64,
    /// Y coordinate (up)
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Position {
    /// World origin
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    /// Create a new position.
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Components as an array.
    #[inline]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Position {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Position> for [f64; 3] {
    fn from(p: Position) -> Self {
        p.to_array()
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// View rotation in radians.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    /// Vertical look angle
    pub pitch: f64,
    /// Horizontal look angle
    pub yaw: f64,
}

impl Rotation {
    /// Create a new rotation.
    #[inline]
    pub const fn new(pitch: f64, yaw: f64) -> Self {
        Self { pitch, yaw }
    }
}
