//! Coordinate ↔ key codec.
//!
//! Every cell of the finest grid is addressed by an [`OcTreeKey`]: one
//! unsigned integer per axis. The key of a world coordinate `v` is
//!
//! ```text
//! key = floor(v / resolution) + 2^(max_depth − 1)
//! ```
//!
//! so the world origin sits on the boundary between the two halves of the key
//! space and negative coordinates map to non-negative keys. A key at a
//! coarser depth `d` is the finest key with its low `max_depth − d` bits
//! cleared: the cell it addresses is the union of all its descendants.
//!
//! # Example
//!
//! ```rust
//! use occumap_core::key::KeyCodec;
//! use occumap_types::Point3;
//!
//! let codec = KeyCodec::new(0.1, 16).unwrap();
//! let key = codec.coord_to_key(Point3::new(-0.25, 0.05, 0.05)).unwrap();
//! assert_eq!(key.0, [32765, 32768, 32768]);
//!
//! let centre = codec.key_to_coord(key);
//! assert!((centre.x + 0.25).abs() < 1e-9);
//! ```

use occumap_types::{MapError, Point3, Result};

/// Deepest tree supported by the 16-bit keys.
pub const MAX_TREE_DEPTH: u8 = 16;

/// Integer address of a cell at the finest resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct OcTreeKey(pub [u16; 3]);

impl OcTreeKey {
    pub fn new(x: u16, y: u16, z: u16) -> Self {
        Self([x, y, z])
    }

    /// The key of the ancestor cell at `depth`, with the low-order bits that
    /// finer levels would select cleared.
    pub fn at_depth(self, depth: u8, max_depth: u8) -> Self {
        let shift = max_depth.saturating_sub(depth);
        if shift == 0 {
            return self;
        }
        let mask = !((1u32 << shift) - 1);
        Self(self.0.map(|k| (u32::from(k) & mask) as u16))
    }
}

/// Octant of `key` below a node whose children are selected by bit `level`.
///
/// Bit 0 of the result is the x bit, bit 1 the y bit, bit 2 the z bit.
pub fn child_index(key: &OcTreeKey, level: u8) -> usize {
    let [x, y, z] = key.0.map(|k| ((k >> level) & 1) as usize);
    (z << 2) | (y << 1) | x
}

/// Key of child `octant` of the node whose key is `parent`, where the child
/// occupies bit `level`.
pub(crate) fn child_key(parent: &OcTreeKey, octant: usize, level: u8) -> OcTreeKey {
    let mut key = *parent;
    for (axis, k) in key.0.iter_mut().enumerate() {
        if octant & (1 << axis) != 0 {
            *k |= 1 << level;
        }
    }
    key
}

/// Converts between world coordinates and keys for one resolution/depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyCodec {
    resolution: f64,
    max_depth: u8,
    /// Key of the first cell on the positive side of the origin.
    center: i64,
}

impl KeyCodec {
    /// Create a codec for `resolution` metres per finest cell and a tree of
    /// `max_depth` levels below the root.
    pub fn new(resolution: f64, max_depth: u8) -> Result<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(MapError::InvalidConfiguration(format!(
                "resolution must be positive and finite, got {resolution}"
            )));
        }
        if max_depth == 0 || max_depth > MAX_TREE_DEPTH {
            return Err(MapError::InvalidConfiguration(format!(
                "max_depth must be in 1..={MAX_TREE_DEPTH}, got {max_depth}"
            )));
        }
        Ok(Self {
            resolution,
            max_depth,
            center: 1i64 << (max_depth - 1),
        })
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Edge length of a node at `depth` (the root is depth 0).
    pub fn node_size(&self, depth: u8) -> f64 {
        let shift = self.max_depth.saturating_sub(depth);
        self.resolution * f64::from(1u32 << shift)
    }

    /// Number of keys per axis.
    fn key_span(&self) -> i64 {
        self.center * 2
    }

    /// Key of one coordinate, or `None` when it falls outside the key range.
    pub fn coord_to_axis_key(&self, v: f64) -> Option<u16> {
        if !v.is_finite() {
            return None;
        }
        let scaled = (v / self.resolution).floor();
        // Far outside the range; keep the cast below well defined.
        if scaled.abs() > self.key_span() as f64 {
            return None;
        }
        let k = scaled as i64 + self.center;
        (0..self.key_span()).contains(&k).then_some(k as u16)
    }

    /// Key of the finest cell containing `p`.
    pub fn coord_to_key(&self, p: Point3) -> Result<OcTreeKey> {
        match (
            self.coord_to_axis_key(p.x),
            self.coord_to_axis_key(p.y),
            self.coord_to_axis_key(p.z),
        ) {
            (Some(x), Some(y), Some(z)) => Ok(OcTreeKey([x, y, z])),
            _ => Err(MapError::out_of_range(p)),
        }
    }

    /// Key of the cell at `depth` containing `p`.
    pub fn coord_to_key_at_depth(&self, p: Point3, depth: u8) -> Result<OcTreeKey> {
        Ok(self.coord_to_key(p)?.at_depth(depth, self.max_depth))
    }

    /// Centre coordinate along one axis of the cell addressed by `key` at
    /// `depth`.
    pub fn axis_key_to_coord(&self, key: u16, depth: u8) -> f64 {
        let shift = self.max_depth.saturating_sub(depth);
        // At depth 0 the single root cell is centred on the origin.
        if shift >= self.max_depth {
            return 0.0;
        }
        let index = i64::from(key >> shift);
        let offset = self.center >> shift;
        ((index - offset) as f64 + 0.5) * self.node_size(depth)
    }

    /// Centre of the finest cell addressed by `key`.
    pub fn key_to_coord(&self, key: OcTreeKey) -> Point3 {
        self.key_to_coord_at_depth(key, self.max_depth)
    }

    /// Centre of the cell addressed by `key` at `depth`.
    pub fn key_to_coord_at_depth(&self, key: OcTreeKey, depth: u8) -> Point3 {
        Point3::new(
            self.axis_key_to_coord(key.0[0], depth),
            self.axis_key_to_coord(key.0[1], depth),
            self.axis_key_to_coord(key.0[2], depth),
        )
    }

    /// Lowest representable coordinate on every axis.
    pub fn metric_min(&self) -> f64 {
        -(self.center as f64) * self.resolution
    }

    /// Upper bound (exclusive) of the representable coordinates on every axis.
    pub fn metric_max(&self) -> f64 {
        self.center as f64 * self.resolution
    }

    /// True when `p` can be addressed by a key.
    pub fn in_range(&self, p: Point3) -> bool {
        self.coord_to_key(p).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> KeyCodec {
        KeyCodec::new(0.1, 16).unwrap()
    }

    // ── construction ────────────────────────────────────────────────────────

    #[test]
    fn rejects_non_positive_resolution() {
        assert!(KeyCodec::new(0.0, 16).is_err());
        assert!(KeyCodec::new(-0.1, 16).is_err());
        assert!(KeyCodec::new(f64::NAN, 16).is_err());
    }

    #[test]
    fn rejects_bad_depth() {
        assert!(KeyCodec::new(0.1, 0).is_err());
        assert!(KeyCodec::new(0.1, 17).is_err());
        assert!(KeyCodec::new(0.1, 1).is_ok());
    }

    // ── coordinate → key ────────────────────────────────────────────────────

    #[test]
    fn origin_splits_key_space() {
        let c = codec();
        assert_eq!(c.coord_to_axis_key(0.0), Some(32768));
        assert_eq!(c.coord_to_axis_key(-0.0001), Some(32767));
        assert_eq!(c.coord_to_axis_key(0.05), Some(32768));
        assert_eq!(c.coord_to_axis_key(0.15), Some(32769));
    }

    #[test]
    fn out_of_range_coordinates_fail() {
        let c = codec();
        let limit = c.metric_max();
        assert!(c.coord_to_key(Point3::new(limit + 0.01, 0.0, 0.0)).is_err());
        assert!(c.coord_to_key(Point3::new(0.0, c.metric_min() - 0.01, 0.0)).is_err());
        assert!(c.coord_to_key(Point3::new(0.0, 0.0, f64::INFINITY)).is_err());
        assert!(c.coord_to_key(Point3::new(limit - 0.01, c.metric_min() + 0.01, 0.0)).is_ok());
    }

    #[test]
    fn out_of_range_error_carries_point() {
        let err = codec().coord_to_key(Point3::new(1e7, 1.0, 2.0)).unwrap_err();
        match err {
            MapError::OutOfRange { x, y, z } => {
                assert_eq!((x, y, z), (1e7, 1.0, 2.0));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    // ── round trips ─────────────────────────────────────────────────────────

    #[test]
    fn decoded_centre_within_half_resolution() {
        let c = codec();
        let samples = [-3276.7, -12.345, -0.05, 0.0, 0.0999, 1.0, 42.42, 3276.7];
        for &x in &samples {
            for &y in &samples {
                let p = Point3::new(x, y, -x);
                let back = c.key_to_coord(c.coord_to_key(p).unwrap());
                assert!((back.x - p.x).abs() <= 0.05 + 1e-9, "{p:?} -> {back:?}");
                assert!((back.y - p.y).abs() <= 0.05 + 1e-9, "{p:?} -> {back:?}");
                assert!((back.z - p.z).abs() <= 0.05 + 1e-9, "{p:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn key_survives_decode_encode() {
        let c = codec();
        for k in [0u16, 1, 1000, 32767, 32768, 40000, 65535] {
            let key = OcTreeKey::new(k, 65535 - k, k / 2);
            assert_eq!(c.coord_to_key(c.key_to_coord(key)).unwrap(), key);
        }
    }

    // ── depth handling ──────────────────────────────────────────────────────

    #[test]
    fn node_size_doubles_per_level() {
        let c = codec();
        assert!((c.node_size(16) - 0.1).abs() < 1e-12);
        assert!((c.node_size(15) - 0.2).abs() < 1e-12);
        assert!((c.node_size(14) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn coarse_key_clears_low_bits() {
        let key = OcTreeKey::new(0x7FFD, 0x8002, 0x8000);
        assert_eq!(key.at_depth(14, 16), OcTreeKey::new(0x7FFC, 0x8000, 0x8000));
        assert_eq!(key.at_depth(16, 16), key);
        assert_eq!(key.at_depth(0, 16), OcTreeKey::new(0, 0, 0));
    }

    #[test]
    fn coarse_cell_contains_fine_cells() {
        let c = codec();
        let p = Point3::new(-0.25, 0.25, 0.05);
        let coarse = c.coord_to_key_at_depth(p, 14).unwrap();
        let centre = c.key_to_coord_at_depth(coarse, 14);
        assert!((centre.x + 0.2).abs() < 1e-9);
        assert!((centre.y - 0.2).abs() < 1e-9);
        assert!((centre.z - 0.2).abs() < 1e-9);
        // Every fine cell of that coarse cell decodes into it.
        let half = c.node_size(14) / 2.0;
        assert!((p.x - centre.x).abs() <= half);
        assert!((p.y - centre.y).abs() <= half);
    }

    #[test]
    fn root_centre_is_origin() {
        let c = codec();
        let key = c.coord_to_key(Point3::new(5.0, -5.0, 1.0)).unwrap();
        assert_eq!(c.key_to_coord_at_depth(key, 0), Point3::origin());
    }

    #[test]
    fn child_index_orders_x_then_y_then_z() {
        let key = OcTreeKey::new(0b01, 0b10, 0b11);
        assert_eq!(child_index(&key, 0), 0b101);
        assert_eq!(child_index(&key, 1), 0b110);
        let parent = OcTreeKey::new(0, 0, 0);
        assert_eq!(child_key(&parent, 0b101, 0), OcTreeKey::new(1, 0, 1));
    }
}
