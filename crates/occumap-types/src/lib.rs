//! `occumap-types` – plain data shared between the occupancy engine and its
//! collaborators (visualisation, scan ingestion).
//!
//! Everything in here is a read-only value: the engine hands these out as
//! snapshots and never exposes live node references.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A point (or vector) in 3-D world space, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    /// Create a new point.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The world origin.
    pub fn origin() -> Self {
        Self::default()
    }

    /// Coordinate along `axis` (0 = x, 1 = y, 2 = z).
    pub fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_array(a: [f64; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    /// Euclidean length of the vector.
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction; the zero vector stays zero.
    pub fn normalized(self) -> Self {
        let n = self.norm();
        if n > 0.0 { self.scale(1.0 / n) } else { self }
    }

    pub fn distance(&self, other: &Self) -> f64 {
        other.sub(*self).norm()
    }

    /// True when every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One occupied cell as reported by a map query: the cell centre and its
/// fused log-odds occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OccupiedCell {
    pub center: Point3,
    pub log_odds: f32,
}

/// Read-only snapshot of the occupied cells of a map at one query resolution.
///
/// This is the only thing a renderer needs from the engine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MapSnapshot {
    pub id: Uuid,
    pub taken_at: DateTime<Utc>,
    /// Edge length of the query cells (metres).
    pub resolution: f64,
    pub cells: Vec<OccupiedCell>,
}

impl MapSnapshot {
    /// Wrap `cells` with a fresh id and the current UTC time.
    pub fn new(resolution: f64, cells: Vec<OccupiedCell>) -> Self {
        Self {
            id: Uuid::new_v4(),
            taken_at: Utc::now(),
            resolution,
            cells,
        }
    }
}

/// Error taxonomy of the occupancy engine.
///
/// A lookup on an unexplored region is not an error; those return `None`.
#[derive(Error, Debug)]
pub enum MapError {
    #[error("coordinate ({x}, {y}, {z}) is outside the representable key range")]
    OutOfRange { x: f64, y: f64, z: f64 },

    #[error("corrupt map stream: {0}")]
    CorruptFormat(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("config file error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MapError {
    /// Build an [`MapError::OutOfRange`] for `p`.
    pub fn out_of_range(p: Point3) -> Self {
        MapError::OutOfRange {
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }
}

pub type Result<T> = std::result::Result<T, MapError>;
