//! Ray caster.
//!
//! Enumerates the grid cells a segment passes through with the
//! Amanatides–Woo voxel traversal. For each axis we keep `t_max`, the ray
//! parameter of the next cell boundary, and `t_delta`, the parameter span of
//! one cell; every step advances the axis with the smallest `t_max`. The
//! number of steps along each axis is fixed up front from the origin and end
//! cells, so the walk always stops exactly on the end cell no matter how the
//! floating-point comparisons fall.
//!
//! Ties on `t_max` are broken towards the lowest axis (x, then y, then z).

use occumap_types::{MapError, Point3, Result};

use crate::key::{KeyCodec, OcTreeKey};
use crate::octree::OcTree;

/// Lazy iterator over the keys of the cells between two points, origin and
/// end cell included.
#[derive(Debug, Clone)]
pub struct RayTraversal {
    /// Cell indices at the traversal depth.
    current: [i64; 3],
    step: [i64; 3],
    t_max: [f64; 3],
    t_delta: [f64; 3],
    remaining: [u32; 3],
    shift: u8,
    started: bool,
}

impl RayTraversal {
    fn key(&self) -> OcTreeKey {
        OcTreeKey(self.current.map(|i| (i << self.shift) as u16))
    }

    /// Cells still to be yielded, the current one included if not yet yielded.
    fn pending(&self) -> usize {
        let steps: u32 = self.remaining.iter().sum();
        steps as usize + usize::from(!self.started)
    }
}

impl Iterator for RayTraversal {
    type Item = OcTreeKey;

    fn next(&mut self) -> Option<OcTreeKey> {
        if !self.started {
            self.started = true;
            return Some(self.key());
        }
        let mut axis = None;
        for a in 0..3 {
            if self.remaining[a] == 0 {
                continue;
            }
            match axis {
                Some(best) if self.t_max[a] >= self.t_max[best] => {}
                _ => axis = Some(a),
            }
        }
        let a = axis?;
        self.current[a] += self.step[a];
        self.t_max[a] += self.t_delta[a];
        self.remaining[a] -= 1;
        Some(self.key())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.pending();
        (n, Some(n))
    }
}

impl ExactSizeIterator for RayTraversal {}

impl KeyCodec {
    /// Cells at `depth` crossed by the segment `origin → end`.
    ///
    /// Both endpoints must be inside the key range.
    pub fn trace(&self, origin: Point3, end: Point3, depth: u8) -> Result<RayTraversal> {
        let depth = depth.min(self.max_depth());
        let shift = self.max_depth() - depth;
        let start_key = self.coord_to_key(origin)?;
        let end_key = self.coord_to_key(end)?;
        let size = self.node_size(depth);

        let o = origin.to_array();
        let d = end.sub(origin).to_array();

        let mut traversal = RayTraversal {
            current: [0; 3],
            step: [0; 3],
            t_max: [f64::INFINITY; 3],
            t_delta: [f64::INFINITY; 3],
            remaining: [0; 3],
            shift,
            started: false,
        };
        for a in 0..3 {
            let from = i64::from(start_key.0[a] >> shift);
            let to = i64::from(end_key.0[a] >> shift);
            traversal.current[a] = from;
            traversal.remaining[a] = from.abs_diff(to) as u32;
            if from == to {
                continue;
            }
            let step = if to > from { 1 } else { -1 };
            let centre = self.axis_key_to_coord(start_key.0[a], depth);
            let boundary = centre + step as f64 * size / 2.0;
            traversal.step[a] = step;
            traversal.t_max[a] = (boundary - o[a]) / d[a];
            traversal.t_delta[a] = size / d[a].abs();
        }
        Ok(traversal)
    }
}

/// Outcome of [`OcTree::cast_ray`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayCast {
    /// Centre of the first occupied cell along the ray.
    Occupied(Point3),
    /// Centre of the first never-observed cell along the ray.
    Unknown(Point3),
    /// Nothing occupied within range or before the edge of the map.
    Clear,
}

impl OcTree {
    /// Finest-depth keys crossed by the segment `origin → end`, both endpoint
    /// cells included.
    pub fn compute_ray_keys(&self, origin: Point3, end: Point3) -> Result<Vec<OcTreeKey>> {
        Ok(self.codec().trace(origin, end, self.max_depth())?.collect())
    }

    /// Walk from `origin` along `direction` until the first occupied cell.
    ///
    /// Unless `ignore_unknown` is set, the walk also stops at the first cell
    /// that was never observed. `max_range <= 0` walks to the edge of the key
    /// space. The origin cell is tested too.
    pub fn cast_ray(
        &self,
        origin: Point3,
        direction: Point3,
        ignore_unknown: bool,
        max_range: f64,
    ) -> Result<RayCast> {
        let codec = self.codec();
        codec.coord_to_key(origin)?;
        let dir = direction.normalized();
        if !dir.is_finite() || dir.norm() == 0.0 {
            return Err(MapError::InvalidConfiguration(
                "ray direction must be a non-zero finite vector".to_string(),
            ));
        }

        let range = match max_range {
            r if r > 0.0 => r.min(distance_to_edge(codec, origin, dir)),
            _ => distance_to_edge(codec, origin, dir),
        };
        let end = origin.add(dir.scale(range));

        for key in codec.trace(origin, end, self.max_depth())? {
            match self.search_key(key, None) {
                Some(node) if self.is_node_occupied(node) => {
                    return Ok(RayCast::Occupied(codec.key_to_coord(key)));
                }
                Some(_) => {}
                None if ignore_unknown => {}
                None => return Ok(RayCast::Unknown(codec.key_to_coord(key))),
            }
        }
        Ok(RayCast::Clear)
    }
}

/// Distance along the unit vector `dir` from `origin` to just inside the
/// boundary of the representable extent.
fn distance_to_edge(codec: &KeyCodec, origin: Point3, dir: Point3) -> f64 {
    let margin = codec.resolution() * 1e-3;
    let lo = codec.metric_min() + margin;
    let hi = codec.metric_max() - margin;
    let o = origin.to_array();
    let d = dir.to_array();
    (0..3)
        .filter(|&a| d[a] != 0.0)
        .map(|a| {
            let bound = if d[a] > 0.0 { hi } else { lo };
            ((bound - o[a]) / d[a]).max(0.0)
        })
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> KeyCodec {
        KeyCodec::new(0.1, 16).unwrap()
    }

    /// Consecutive keys differ by exactly one step along exactly one axis.
    fn assert_face_connected(keys: &[OcTreeKey], step: i32) {
        for pair in keys.windows(2) {
            let diffs: Vec<i32> = (0..3)
                .map(|a| i32::from(pair[1].0[a]) - i32::from(pair[0].0[a]))
                .collect();
            let moved: Vec<&i32> = diffs.iter().filter(|d| **d != 0).collect();
            assert_eq!(moved.len(), 1, "{:?} -> {:?}", pair[0], pair[1]);
            assert_eq!(moved[0].abs(), step);
        }
    }

    // ── traversal ───────────────────────────────────────────────────────────

    #[test]
    fn zero_length_ray_yields_origin_cell() {
        let c = codec();
        let p = Point3::new(0.42, -1.3, 2.0);
        let keys: Vec<_> = c.trace(p, p, 16).unwrap().collect();
        assert_eq!(keys, vec![c.coord_to_key(p).unwrap()]);
    }

    #[test]
    fn axis_aligned_ray_visits_every_cell() {
        let c = codec();
        let keys: Vec<_> = c
            .trace(Point3::new(0.05, 0.05, 0.05), Point3::new(1.05, 0.05, 0.05), 16)
            .unwrap()
            .collect();
        assert_eq!(keys.len(), 11);
        assert_eq!(keys[0].0, [32768, 32768, 32768]);
        assert_eq!(keys[10].0, [32778, 32768, 32768]);
        assert_face_connected(&keys, 1);
    }

    #[test]
    fn negative_direction_walks_backwards() {
        let c = codec();
        let keys: Vec<_> = c
            .trace(Point3::new(0.05, 0.05, 0.05), Point3::new(0.05, -0.45, 0.05), 16)
            .unwrap()
            .collect();
        assert_eq!(keys.len(), 6);
        assert_eq!(keys.last().unwrap().0[1], 32768 - 5);
    }

    #[test]
    fn diagonal_ray_is_connected_and_ends_on_end_cell() {
        let c = codec();
        let origin = Point3::new(-0.33, 0.12, 0.71);
        let end = Point3::new(2.47, -1.91, 1.38);
        let keys: Vec<_> = c.trace(origin, end, 16).unwrap().collect();
        assert_eq!(keys.first(), Some(&c.coord_to_key(origin).unwrap()));
        assert_eq!(keys.last(), Some(&c.coord_to_key(end).unwrap()));
        assert_face_connected(&keys, 1);

        let (o, e) = (c.coord_to_key(origin).unwrap(), c.coord_to_key(end).unwrap());
        let manhattan: u32 = (0..3).map(|a| u32::from(o.0[a].abs_diff(e.0[a]))).sum();
        assert_eq!(keys.len() as u32, manhattan + 1);
    }

    #[test]
    fn size_hint_is_exact() {
        let c = codec();
        let mut t = c
            .trace(Point3::new(0.0, 0.0, 0.0), Point3::new(0.33, 0.21, 0.0), 16)
            .unwrap();
        let n = t.len();
        assert_eq!(n, 6);
        t.next();
        assert_eq!(t.len(), n - 1);
        assert_eq!(t.count(), n - 1);
    }

    #[test]
    fn coarse_depth_steps_in_coarse_cells() {
        let c = codec();
        let keys: Vec<_> = c
            .trace(Point3::new(0.05, 0.05, 0.05), Point3::new(1.55, 0.05, 0.05), 14)
            .unwrap()
            .collect();
        // 0.4 m cells: [0, 0.4), [0.4, 0.8), [0.8, 1.2), [1.2, 1.6)
        assert_eq!(keys.len(), 4);
        assert_face_connected(&keys, 4);
        assert!(keys.iter().all(|k| k.0[0] % 4 == 0));
    }

    #[test]
    fn out_of_range_endpoint_fails() {
        let c = codec();
        let far = Point3::new(1e6, 0.0, 0.0);
        assert!(matches!(
            c.trace(Point3::origin(), far, 16),
            Err(MapError::OutOfRange { .. })
        ));
    }

    // ── cast_ray ────────────────────────────────────────────────────────────

    #[test]
    fn cast_ray_finds_first_occupied_cell() {
        let mut tree = OcTree::with_resolution(0.1).unwrap();
        for i in 0..10 {
            let x = 0.05 + 0.1 * f64::from(i);
            tree.update_node(Point3::new(x, 0.05, 0.05), false).unwrap();
        }
        tree.update_node(Point3::new(0.65, 0.05, 0.05), true).unwrap();
        tree.update_node(Point3::new(0.65, 0.05, 0.05), true).unwrap();
        tree.set_node_value(Point3::new(0.85, 0.05, 0.05), 2.0).unwrap();

        let hit = tree
            .cast_ray(Point3::new(0.05, 0.05, 0.05), Point3::new(1.0, 0.0, 0.0), false, 5.0)
            .unwrap();
        match hit {
            RayCast::Occupied(p) => assert!((p.x - 0.65).abs() < 1e-9),
            other => panic!("expected a hit, got {other:?}"),
        }
    }

    #[test]
    fn cast_ray_stops_at_unknown_unless_ignored() {
        let mut tree = OcTree::with_resolution(0.1).unwrap();
        tree.update_node(Point3::new(0.05, 0.05, 0.05), false).unwrap();
        tree.update_node(Point3::new(0.15, 0.05, 0.05), false).unwrap();
        let origin = Point3::new(0.05, 0.05, 0.05);
        let dir = Point3::new(1.0, 0.0, 0.0);

        match tree.cast_ray(origin, dir, false, 1.0).unwrap() {
            RayCast::Unknown(p) => assert!((p.x - 0.25).abs() < 1e-9),
            other => panic!("expected unknown, got {other:?}"),
        }
        assert_eq!(tree.cast_ray(origin, dir, true, 1.0).unwrap(), RayCast::Clear);
    }

    #[test]
    fn cast_ray_unbounded_reaches_the_edge() {
        let mut tree = OcTree::new(crate::OcTreeConfig {
            max_depth: 8,
            ..crate::OcTreeConfig::with_resolution(0.1)
        })
        .unwrap();
        // Extent is [-12.8, 12.8); the wall sits near the +x edge.
        tree.set_node_value(Point3::new(12.75, 0.05, 0.05), 2.0).unwrap();
        let hit = tree
            .cast_ray(Point3::new(0.05, 0.05, 0.05), Point3::new(1.0, 0.0, 0.0), true, -1.0)
            .unwrap();
        assert!(matches!(hit, RayCast::Occupied(p) if (p.x - 12.75).abs() < 1e-9));
    }

    #[test]
    fn cast_ray_rejects_zero_direction() {
        let tree = OcTree::with_resolution(0.1).unwrap();
        assert!(tree.cast_ray(Point3::origin(), Point3::origin(), true, 1.0).is_err());
    }

    #[test]
    fn compute_ray_keys_matches_trace() {
        let tree = OcTree::with_resolution(0.1).unwrap();
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(0.35, 0.35, 0.35);
        let keys = tree.compute_ray_keys(a, b).unwrap();
        assert_eq!(keys.len(), 10);
        assert_eq!(keys, tree.codec().trace(a, b, 16).unwrap().collect::<Vec<_>>());
    }
}
