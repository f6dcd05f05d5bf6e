//! Probabilistic occupancy octree.
//!
//! Sparse hierarchical store of log-odds occupancy keyed by [`OcTreeKey`].
//! Nodes are created on the first write to a path; unexplored space simply
//! has no node and reads back as `None` (unknown).
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`OcTree`]     | The map: configuration, key codec, root node.        |
//! | [`LeafVisit`]  | One node reported by [`OcTree::leaves`].             |
//! | [`Leaves`]     | Depth-first leaf iterator in octant order.           |
//!
//! # Example
//!
//! ```rust
//! use occumap_core::OcTree;
//! use occumap_types::Point3;
//!
//! let mut tree = OcTree::with_resolution(0.1).unwrap();
//! let p = Point3::new(1.0, 2.0, 3.0);
//!
//! tree.update_node(p, true).unwrap();
//! let node = tree.search(p, None).unwrap().expect("observed");
//! assert!(tree.is_node_occupied(node));
//!
//! // Never observed: unknown.
//! assert!(tree.search(Point3::new(-1.0, 0.0, 0.0), None).unwrap().is_none());
//! ```

use occumap_types::{MapError, Point3, Result};
use tracing::debug;

use crate::config::OcTreeConfig;
use crate::key::{KeyCodec, OcTreeKey, child_index, child_key};
use crate::node::OcTreeNode;
use crate::policy::{OccupancyParams, validate_threshold};

// ────────────────────────────────────────────────────────────────────────────
// OcTree
// ────────────────────────────────────────────────────────────────────────────

/// Occupancy map over a sparse octree.
///
/// Writers take `&mut self` and readers `&self`, so the borrow checker
/// enforces the single-writer discipline; wrap the tree in a lock to share it
/// between threads.
#[derive(Debug, Clone)]
pub struct OcTree {
    config: OcTreeConfig,
    codec: KeyCodec,
    root: Option<OcTreeNode>,
}

impl OcTree {
    /// Create an empty tree. Fails on an invalid configuration.
    pub fn new(config: OcTreeConfig) -> Result<Self> {
        config.validate()?;
        let codec = KeyCodec::new(config.resolution, config.max_depth)?;
        Ok(Self {
            config,
            codec,
            root: None,
        })
    }

    /// Create an empty tree at `resolution` with default parameters.
    pub fn with_resolution(resolution: f64) -> Result<Self> {
        Self::new(OcTreeConfig::with_resolution(resolution))
    }

    pub fn config(&self) -> &OcTreeConfig {
        &self.config
    }

    pub fn params(&self) -> &OccupancyParams {
        &self.config.occupancy
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn resolution(&self) -> f64 {
        self.codec.resolution()
    }

    pub fn max_depth(&self) -> u8 {
        self.codec.max_depth()
    }

    pub fn root(&self) -> Option<&OcTreeNode> {
        self.root.as_ref()
    }

    pub(crate) fn set_root(&mut self, root: Option<OcTreeNode>) {
        self.root = root;
    }

    /// Change the probability at or above which a node counts as occupied.
    pub fn set_occupancy_threshold(&mut self, probability: f64) -> Result<()> {
        validate_threshold(probability)?;
        self.config.occupancy.occupancy_threshold = probability;
        Ok(())
    }

    pub fn is_node_occupied(&self, node: &OcTreeNode) -> bool {
        self.config.occupancy.is_occupied(node.log_odds())
    }

    /// True when the node's value sits on a clamp bound.
    pub fn is_node_at_threshold(&self, node: &OcTreeNode) -> bool {
        self.config.occupancy.is_at_threshold(node.log_odds())
    }

    // ── writes ──────────────────────────────────────────────────────────────

    /// Set the log-odds of the finest cell containing `point`.
    ///
    /// The value is clamped into the configured bounds; the stored value is
    /// returned. Out-of-range points and non-finite values fail without
    /// touching the tree.
    pub fn set_node_value(&mut self, point: Point3, log_odds: f32) -> Result<f32> {
        let key = self.codec.coord_to_key(point)?;
        self.set_node_value_key(key, log_odds)
    }

    pub fn set_node_value_key(&mut self, key: OcTreeKey, log_odds: f32) -> Result<f32> {
        if !log_odds.is_finite() {
            return Err(MapError::InvalidConfiguration(format!(
                "node value must be finite, got {log_odds}"
            )));
        }
        let value = self.config.occupancy.clamp(log_odds);
        Ok(self.write_leaf(key, |_| value))
    }

    /// Fuse one hit or miss observation into the cell containing `point`.
    pub fn update_node(&mut self, point: Point3, hit: bool) -> Result<f32> {
        let key = self.codec.coord_to_key(point)?;
        Ok(self.update_node_key(key, hit))
    }

    pub fn update_node_key(&mut self, key: OcTreeKey, hit: bool) -> f32 {
        let params = self.config.occupancy;
        self.write_leaf(key, |current| params.apply(current, hit))
    }

    /// Descend to the finest node of `key`, creating or expanding nodes on
    /// the way, replace its value with `f(old)` and refresh the inner values
    /// along the path.
    fn write_leaf(&mut self, key: OcTreeKey, f: impl FnOnce(f32) -> f32) -> f32 {
        let max_depth = self.codec.max_depth();
        let root = self.root.get_or_insert_with(OcTreeNode::empty_inner);
        write_recurs(root, &key, 0, max_depth, f)
    }

    // ── reads ───────────────────────────────────────────────────────────────

    /// Node covering `point` at `depth` (`None` = finest).
    ///
    /// A pruned leaf above `depth` answers for its whole span. Returns
    /// `Ok(None)` when the region was never observed.
    pub fn search(&self, point: Point3, depth: Option<u8>) -> Result<Option<&OcTreeNode>> {
        let key = self.codec.coord_to_key(point)?;
        Ok(self.search_key(key, depth))
    }

    pub fn search_key(&self, key: OcTreeKey, depth: Option<u8>) -> Option<&OcTreeNode> {
        let max_depth = self.codec.max_depth();
        let depth = depth.unwrap_or(max_depth).min(max_depth);
        let mut node = self.root.as_ref()?;
        for d in 0..depth {
            if node.is_leaf() {
                break;
            }
            node = node.child(child_index(&key, max_depth - 1 - d))?;
        }
        Some(node)
    }

    // ── structure ───────────────────────────────────────────────────────────

    /// Collapse every inner node whose eight children are equal leaves.
    ///
    /// Bottom-up, so one call reaches the fixed point; calling it again is a
    /// no-op.
    pub fn prune(&mut self) -> usize {
        let Some(root) = self.root.as_mut() else {
            return 0;
        };
        let pruned = prune_recurs(root);
        debug!(pruned, size = self.size(), "pruned octree");
        pruned
    }

    /// Re-expand every pruned leaf down to the finest depth.
    pub fn expand(&mut self) {
        let max_depth = self.codec.max_depth();
        if let Some(root) = self.root.as_mut() {
            expand_recurs(root, 0, max_depth);
        }
    }

    /// Remove the node covering `point` at `depth` (`None` = finest) together
    /// with its subtree. Ancestors left without children are removed too.
    pub fn delete_node(&mut self, point: Point3, depth: Option<u8>) -> Result<bool> {
        let key = self.codec.coord_to_key(point)?;
        Ok(self.delete_node_key(key, depth))
    }

    pub fn delete_node_key(&mut self, key: OcTreeKey, depth: Option<u8>) -> bool {
        let max_depth = self.codec.max_depth();
        let depth = depth.unwrap_or(max_depth).min(max_depth);
        if depth == 0 {
            return self.root.take().is_some();
        }
        let Some(root) = self.root.as_mut() else {
            return false;
        };
        match delete_recurs(root, &key, 0, depth, max_depth) {
            Deleted::No => false,
            Deleted::Yes => true,
            Deleted::AndEmptied => {
                self.root = None;
                true
            }
        }
    }

    /// Drop every node.
    pub fn clear(&mut self) {
        self.root = None;
    }

    // ── statistics ──────────────────────────────────────────────────────────

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        self.root.as_ref().map_or(0, OcTreeNode::subtree_size)
    }

    /// Number of leaves (pruned leaves count once).
    pub fn leaf_count(&self) -> usize {
        self.leaves(None).count()
    }

    /// Axis-aligned bounds `(min, max)` of every leaf's span.
    pub fn bounding_box(&self) -> Option<(Point3, Point3)> {
        let mut bounds: Option<([f64; 3], [f64; 3])> = None;
        for leaf in self.leaves(None) {
            let centre = self.codec.key_to_coord_at_depth(leaf.key, leaf.depth).to_array();
            let half = self.codec.node_size(leaf.depth) / 2.0;
            let (lo, hi) = bounds.get_or_insert((centre, centre));
            for axis in 0..3 {
                lo[axis] = lo[axis].min(centre[axis] - half);
                hi[axis] = hi[axis].max(centre[axis] + half);
            }
        }
        bounds.map(|(lo, hi)| (Point3::from_array(lo), Point3::from_array(hi)))
    }

    /// Depth-first walk over the leaves, children in octant order.
    ///
    /// With `Some(depth)`, nodes at that depth are reported as if they were
    /// leaves (with their aggregated inner value).
    pub fn leaves(&self, max_depth: Option<u8>) -> Leaves<'_> {
        let tree_depth = self.codec.max_depth();
        let limit = max_depth.unwrap_or(tree_depth).min(tree_depth);
        let stack = self
            .root
            .as_ref()
            .map(|root| {
                vec![StackEntry {
                    node: root,
                    key: OcTreeKey::default(),
                    depth: 0,
                }]
            })
            .unwrap_or_default();
        Leaves {
            stack,
            tree_depth,
            limit,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Leaf iteration
// ────────────────────────────────────────────────────────────────────────────

/// One node reported by [`OcTree::leaves`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafVisit {
    /// Key of the node at `depth` (low-order bits cleared).
    pub key: OcTreeKey,
    pub depth: u8,
    pub log_odds: f32,
}

struct StackEntry<'a> {
    node: &'a OcTreeNode,
    key: OcTreeKey,
    depth: u8,
}

/// Iterator returned by [`OcTree::leaves`].
pub struct Leaves<'a> {
    stack: Vec<StackEntry<'a>>,
    tree_depth: u8,
    limit: u8,
}

impl Iterator for Leaves<'_> {
    type Item = LeafVisit;

    fn next(&mut self) -> Option<LeafVisit> {
        while let Some(entry) = self.stack.pop() {
            if entry.node.is_leaf() || entry.depth >= self.limit {
                return Some(LeafVisit {
                    key: entry.key,
                    depth: entry.depth,
                    log_odds: entry.node.log_odds(),
                });
            }
            let level = self.tree_depth - 1 - entry.depth;
            // Reverse push so octant 0 is popped first.
            for octant in (0..8).rev() {
                if let Some(child) = entry.node.child(octant) {
                    self.stack.push(StackEntry {
                        node: child,
                        key: child_key(&entry.key, octant, level),
                        depth: entry.depth + 1,
                    });
                }
            }
        }
        None
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Recursive helpers
// ────────────────────────────────────────────────────────────────────────────

fn write_recurs(
    node: &mut OcTreeNode,
    key: &OcTreeKey,
    depth: u8,
    max_depth: u8,
    f: impl FnOnce(f32) -> f32,
) -> f32 {
    if depth == max_depth {
        let value = f(node.log_odds());
        node.set_log_odds(value);
        return value;
    }
    // A leaf above the finest depth is a pruned region.
    node.expand();
    let octant = child_index(key, max_depth - 1 - depth);
    let value = match node.children_mut() {
        Some(children) => {
            let child = children[octant].get_or_insert_with(|| {
                if depth + 1 == max_depth {
                    OcTreeNode::Leaf(0.0)
                } else {
                    OcTreeNode::empty_inner()
                }
            });
            write_recurs(child, key, depth + 1, max_depth, f)
        }
        None => unreachable!("expand() always leaves an inner node"),
    };
    node.update_inner_occupancy();
    value
}

fn prune_recurs(node: &mut OcTreeNode) -> usize {
    let Some(children) = node.children_mut() else {
        return 0;
    };
    let mut pruned = 0;
    for child in children.iter_mut().flatten() {
        pruned += prune_recurs(child);
    }
    if node.collapse() {
        pruned += 1;
    }
    pruned
}

fn expand_recurs(node: &mut OcTreeNode, depth: u8, max_depth: u8) {
    if depth >= max_depth {
        return;
    }
    node.expand();
    if let Some(children) = node.children_mut() {
        for child in children.iter_mut().flatten() {
            expand_recurs(child, depth + 1, max_depth);
        }
    }
}

enum Deleted {
    No,
    Yes,
    /// Deleted, and the node passed in has no children left.
    AndEmptied,
}

fn delete_recurs(
    node: &mut OcTreeNode,
    key: &OcTreeKey,
    depth: u8,
    target: u8,
    max_depth: u8,
) -> Deleted {
    node.expand();
    let octant = child_index(key, max_depth - 1 - depth);
    let Some(children) = node.children_mut() else {
        return Deleted::No;
    };
    let Some(child) = children[octant].as_mut() else {
        return Deleted::No;
    };
    if depth + 1 < target {
        match delete_recurs(child, key, depth + 1, target, max_depth) {
            Deleted::No => return Deleted::No,
            Deleted::Yes => {}
            Deleted::AndEmptied => children[octant] = None,
        }
    } else {
        children[octant] = None;
    }
    if node.child_count() == 0 {
        Deleted::AndEmptied
    } else {
        node.update_inner_occupancy();
        Deleted::Yes
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
