//! Multi-resolution occupied-cell queries.
//!
//! The walk stops at the shallowest depth whose node edge is no larger than
//! the requested resolution and reports each occupied node there with its
//! aggregated value. A pruned leaf above that depth stands in for every node
//! it covers there, so pruning never changes the answer. Nodes finer than the
//! request are snapped onto the requested grid, and nodes landing in the same
//! requested cell are merged keeping the largest value.

use std::collections::HashMap;

use occumap_types::{MapSnapshot, OccupiedCell, Point3};

use crate::key::{KeyCodec, OcTreeKey, child_key};
use crate::octree::OcTree;

impl OcTree {
    /// Depth whose nodes best match `resolution`: the shallowest one with an
    /// edge no larger than it, or the finest depth when none is.
    pub fn query_depth(&self, resolution: f64) -> u8 {
        let codec = self.codec();
        (0..=self.max_depth())
            .find(|&d| codec.node_size(d) <= resolution * (1.0 + 1e-9))
            .unwrap_or(self.max_depth())
    }

    /// Occupied cells at `resolution` (`None` = the tree's own resolution),
    /// depth first in octant order.
    pub fn occupied_cells(&self, resolution: Option<f64>) -> Vec<OccupiedCell> {
        let requested = self.requested_resolution(resolution);
        let depth = self.query_depth(requested);
        let mut grid = CellGrid::new(self.codec(), requested);
        for leaf in self.leaves(Some(depth)) {
            if !self.params().is_occupied(leaf.log_odds) {
                continue;
            }
            if leaf.depth < depth {
                for key in descendants(leaf.key, leaf.depth, depth, self.max_depth()) {
                    grid.push(key, depth, leaf.log_odds);
                }
            } else {
                grid.push(leaf.key, leaf.depth, leaf.log_odds);
            }
        }
        grid.cells
    }

    /// Read-only snapshot of the occupied cells for a renderer.
    pub fn snapshot(&self, resolution: Option<f64>) -> MapSnapshot {
        let requested = self.requested_resolution(resolution);
        MapSnapshot::new(requested, self.occupied_cells(Some(requested)))
    }

    /// Positive finite request capped at the root edge, else the tree's own
    /// resolution.
    fn requested_resolution(&self, resolution: Option<f64>) -> f64 {
        resolution
            .filter(|r| r.is_finite() && *r > 0.0)
            .map_or(self.resolution(), |r| r.min(self.codec().node_size(0)))
    }
}

/// Keys of every node at `target` under the node `key` at `depth`, depth
/// first in octant order.
fn descendants(
    key: OcTreeKey,
    depth: u8,
    target: u8,
    max_depth: u8,
) -> impl Iterator<Item = OcTreeKey> {
    let levels = target - depth;
    (0..1u64 << (3 * u32::from(levels))).map(move |i| {
        (0..levels).fold(key, |k, step| {
            let octant = ((i >> (3 * (levels - 1 - step))) & 7) as usize;
            child_key(&k, octant, max_depth - 1 - depth - step)
        })
    })
}

/// Occupied cells collected onto one requested grid.
struct CellGrid<'a> {
    codec: &'a KeyCodec,
    requested: f64,
    cells: Vec<OccupiedCell>,
    merged: HashMap<[i64; 3], usize>,
}

impl<'a> CellGrid<'a> {
    fn new(codec: &'a KeyCodec, requested: f64) -> Self {
        Self {
            codec,
            requested,
            cells: Vec::new(),
            merged: HashMap::new(),
        }
    }

    fn push(&mut self, key: OcTreeKey, depth: u8, log_odds: f32) {
        let center = self.codec.key_to_coord_at_depth(key, depth);
        if self.codec.node_size(depth) >= self.requested * (1.0 - 1e-9) {
            self.cells.push(OccupiedCell { center, log_odds });
            return;
        }
        let r = self.requested;
        let index = center.to_array().map(|c| (c / r).floor() as i64);
        match self.merged.get(&index) {
            Some(&i) => {
                self.cells[i].log_odds = self.cells[i].log_odds.max(log_odds);
            }
            None => {
                self.merged.insert(index, self.cells.len());
                self.cells.push(OccupiedCell {
                    center: Point3::from_array(index.map(|i| (i as f64 + 0.5) * r)),
                    log_odds,
                });
            }
        }
    }
}
