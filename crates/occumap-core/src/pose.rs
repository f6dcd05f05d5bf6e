//! Rigid-body poses and sensor trajectories.
//!
//! A [`Pose6D`] is the pose of a frame B relative to a frame A: to map a point
//! expressed in B into A, rotate it by `rotation` then add `translation`.
//! Scans are recorded in the sensor frame and brought into the world with
//! `frame_pose ∘ sensor_pose`.
//!
//! # Example
//!
//! ```rust
//! use occumap_core::pose::{Pose6D, Quaternion};
//! use occumap_types::Point3;
//!
//! // Robot 1 m forward of the world origin, sensor 0.5 m forward of the robot.
//! let robot = Pose6D::new(Point3::new(1.0, 0.0, 0.0), Quaternion::identity());
//! let sensor = Pose6D::new(Point3::new(0.5, 0.0, 0.0), Quaternion::identity());
//!
//! let world = robot.compose(sensor).transform_point(Point3::origin());
//! assert!((world.x - 1.5).abs() < 1e-9);
//! ```

use chrono::{DateTime, Utc};
use occumap_types::{MapError, Point3, Result};
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Create a quaternion. The caller provides a unit quaternion.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation from roll (x), pitch (y) and yaw (z) in radians, applied in
    /// z-y-x order.
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll / 2.0).sin_cos();
        let (sp, cp) = (pitch / 2.0).sin_cos();
        let (sy, cy) = (yaw / 2.0).sin_cos();
        Self::new(
            cr * cp * cy + sr * sp * sy,
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
        )
    }

    /// Hamilton product: `self` followed by `rhs` in the body frame.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate, the inverse of a unit quaternion.
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Rotate a vector: `p' = q p q*`.
    pub fn rotate(self, v: Point3) -> Point3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let r = self.mul(p).mul(self.conjugate());
        Point3::new(r.x, r.y, r.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose6D
// ────────────────────────────────────────────────────────────────────────────

/// Translation plus rotation of one frame relative to another.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose6D {
    pub translation: Point3,
    pub rotation: Quaternion,
}

impl Pose6D {
    pub fn new(translation: Point3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    /// Compose two poses: if `self` = T_A_B and `other` = T_B_C, the result
    /// is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        Self::new(
            self.translation.add(self.rotation.rotate(other.translation)),
            self.rotation.mul(other.rotation),
        )
    }

    /// The pose of A relative to B.
    pub fn inverse(self) -> Self {
        let rotation = self.rotation.conjugate();
        Self::new(rotation.rotate(self.translation).scale(-1.0), rotation)
    }

    /// Map a point expressed in B into A.
    pub fn transform_point(&self, p: Point3) -> Point3 {
        self.rotation.rotate(p).add(self.translation)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trajectory
// ────────────────────────────────────────────────────────────────────────────

/// A pose observed at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StampedPose {
    pub stamp: DateTime<Utc>,
    pub pose: Pose6D,
}

/// Time-ordered sequence of sensor poses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    poses: Vec<StampedPose>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pose. Stamps must not go backwards.
    pub fn push(&mut self, stamp: DateTime<Utc>, pose: Pose6D) -> Result<()> {
        if let Some(last) = self.poses.last()
            && stamp < last.stamp
        {
            return Err(MapError::InvalidConfiguration(format!(
                "trajectory stamp {stamp} precedes last stamp {}",
                last.stamp
            )));
        }
        self.poses.push(StampedPose { stamp, pose });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StampedPose> {
        self.poses.iter()
    }

    pub fn last(&self) -> Option<&StampedPose> {
        self.poses.last()
    }

    /// Sensor positions in order, for rendering the path.
    pub fn positions(&self) -> Vec<Point3> {
        self.poses.iter().map(|p| p.pose.translation).collect()
    }

    /// Total path length through the recorded positions.
    pub fn length(&self) -> f64 {
        self.poses
            .windows(2)
            .map(|w| w[0].pose.translation.distance(&w[1].pose.translation))
            .sum()
    }
}
