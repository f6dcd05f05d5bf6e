//! Scan integration.
//!
//! A batch is a sensor origin plus the measured endpoints of its beams. Each
//! beam is traced from the origin to its endpoint: the cells strictly before
//! the endpoint cell are observed free, the endpoint cell is observed
//! occupied. Beams longer than `max_range` are cut at that range and only
//! contribute free space.
//!
//! Within one batch
//!
//! * every distinct free cell is updated once, in first-seen order;
//! * a cell that is the endpoint of some beam is never also updated as free;
//! * every measured endpoint applies its own hit, duplicates included.
//!
//! Tracing is pure and runs in parallel over the beams; the updates are then
//! applied on the calling thread.

use std::collections::HashSet;

use occumap_types::{Point3, Result};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::key::OcTreeKey;
use crate::octree::OcTree;
use crate::pose::Pose6D;

/// A beam that could not be integrated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RejectedBeam {
    /// Position of the beam in the batch.
    pub index: usize,
    pub endpoint: Point3,
}

/// Key sets a batch resolves to, before anything is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanUpdate {
    /// Distinct free cells in first-seen order.
    pub free: Vec<OcTreeKey>,
    /// One entry per accepted, untruncated measurement.
    pub hits: Vec<OcTreeKey>,
    pub truncated: usize,
    pub rejected: Vec<RejectedBeam>,
}

/// Summary of one [`OcTree::insert_batch`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub beams: usize,
    pub truncated: usize,
    pub hits_applied: usize,
    pub misses_applied: usize,
    pub rejected: Vec<RejectedBeam>,
}

enum Beam {
    Measured { free: Vec<OcTreeKey>, hit: OcTreeKey },
    Truncated { free: Vec<OcTreeKey> },
    Rejected(RejectedBeam),
}

impl OcTree {
    /// Resolve a batch into free and hit keys without modifying the tree.
    ///
    /// `max_range` of `None` or a negative value leaves beams untruncated. An
    /// origin outside the key range fails the whole batch; an endpoint that
    /// cannot be traced only rejects its own beam.
    pub fn compute_update(
        &self,
        origin: Point3,
        endpoints: &[Point3],
        max_range: Option<f64>,
    ) -> Result<ScanUpdate> {
        self.codec().coord_to_key(origin)?;
        let max_range = max_range.filter(|r| *r >= 0.0);

        let beams: Vec<Beam> = endpoints
            .par_iter()
            .enumerate()
            .map(|(index, &endpoint)| self.trace_beam(index, origin, endpoint, max_range))
            .collect();

        let mut update = ScanUpdate::default();
        let mut free_seen = HashSet::new();
        let mut free_order = Vec::new();
        for beam in beams {
            let keys = match beam {
                Beam::Measured { free, hit } => {
                    update.hits.push(hit);
                    free
                }
                Beam::Truncated { free } => {
                    update.truncated += 1;
                    free
                }
                Beam::Rejected(rejected) => {
                    update.rejected.push(rejected);
                    continue;
                }
            };
            for key in keys {
                if free_seen.insert(key) {
                    free_order.push(key);
                }
            }
        }
        let hit_set: HashSet<OcTreeKey> = update.hits.iter().copied().collect();
        update.free = free_order
            .into_iter()
            .filter(|k| !hit_set.contains(k))
            .collect();
        Ok(update)
    }

    fn trace_beam(
        &self,
        index: usize,
        origin: Point3,
        endpoint: Point3,
        max_range: Option<f64>,
    ) -> Beam {
        let offset = endpoint.sub(origin);
        let length = offset.norm();
        let (end, truncated) = match max_range {
            Some(range) if length > range => (origin.add(offset.scale(range / length)), true),
            _ => (endpoint, false),
        };
        let Ok(traversal) = self.codec().trace(origin, end, self.max_depth()) else {
            return Beam::Rejected(RejectedBeam { index, endpoint });
        };
        let mut free: Vec<OcTreeKey> = traversal.collect();
        // The traversal ends on the endpoint cell.
        let last = free.pop();
        match (truncated, last) {
            (false, Some(hit)) => Beam::Measured { free, hit },
            _ => Beam::Truncated { free },
        }
    }

    /// Integrate one batch of measurements taken from `origin`.
    ///
    /// Misses are applied before hits. Call [`OcTree::prune`] afterwards to
    /// compact the map.
    pub fn insert_batch(
        &mut self,
        origin: Point3,
        endpoints: &[Point3],
        max_range: Option<f64>,
    ) -> Result<BatchReport> {
        let update = self.compute_update(origin, endpoints, max_range)?;
        for &key in &update.free {
            self.update_node_key(key, false);
        }
        for &key in &update.hits {
            self.update_node_key(key, true);
        }

        if !update.rejected.is_empty() {
            warn!(
                rejected = update.rejected.len(),
                beams = endpoints.len(),
                "beams outside the map extent were skipped"
            );
        }
        let report = BatchReport {
            beams: endpoints.len(),
            truncated: update.truncated,
            hits_applied: update.hits.len(),
            misses_applied: update.free.len(),
            rejected: update.rejected,
        };
        debug!(
            beams = report.beams,
            hits = report.hits_applied,
            misses = report.misses_applied,
            truncated = report.truncated,
            "integrated scan batch"
        );
        Ok(report)
    }

    /// Integrate a scan expressed in the sensor frame.
    ///
    /// The sensor sits at `sensor_pose` relative to the robot frame, and the
    /// robot frame at `frame_pose` in the world.
    pub fn insert_scan(
        &mut self,
        scan: &[Point3],
        sensor_pose: Pose6D,
        frame_pose: Pose6D,
        max_range: Option<f64>,
    ) -> Result<BatchReport> {
        let world = frame_pose.compose(sensor_pose);
        let origin = world.transform_point(Point3::origin());
        let endpoints: Vec<Point3> = scan.iter().map(|&p| world.transform_point(p)).collect();
        self.insert_batch(origin, &endpoints, max_range)
    }
}
