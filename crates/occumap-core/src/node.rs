//! Occupancy octree node.
//!
//! A node is either a [`OcTreeNode::Leaf`] holding a log-odds estimate for
//! its whole span, or an [`OcTreeNode::Inner`] owning up to eight children.
//! Leaves above the finest depth are pruned regions. An inner node's value is
//! the maximum of its children's values, so a coarse look at the tree is
//! conservative: a region is as occupied as its most occupied part.

/// Child slots of an inner node, indexed by octant.
pub type Children = [Option<OcTreeNode>; 8];

#[derive(Debug, Clone, PartialEq)]
pub enum OcTreeNode {
    Leaf(f32),
    Inner { log_odds: f32, children: Box<Children> },
}

impl OcTreeNode {
    /// An inner node with no children yet, used while creating a path.
    pub(crate) fn empty_inner() -> Self {
        OcTreeNode::Inner {
            log_odds: 0.0,
            children: Box::default(),
        }
    }

    pub fn log_odds(&self) -> f32 {
        match self {
            OcTreeNode::Leaf(v) => *v,
            OcTreeNode::Inner { log_odds, .. } => *log_odds,
        }
    }

    pub(crate) fn set_log_odds(&mut self, value: f32) {
        match self {
            OcTreeNode::Leaf(v) => *v = value,
            OcTreeNode::Inner { log_odds, .. } => *log_odds = value,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, OcTreeNode::Leaf(_))
    }

    pub fn child(&self, octant: usize) -> Option<&OcTreeNode> {
        match self {
            OcTreeNode::Leaf(_) => None,
            OcTreeNode::Inner { children, .. } => children[octant].as_ref(),
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Children> {
        match self {
            OcTreeNode::Leaf(_) => None,
            OcTreeNode::Inner { children, .. } => Some(children),
        }
    }

    /// Existing children with their octant index, in octant order.
    pub fn children(&self) -> impl Iterator<Item = (usize, &OcTreeNode)> {
        let slots: &[Option<OcTreeNode>] = match self {
            OcTreeNode::Leaf(_) => &[],
            OcTreeNode::Inner { children, .. } => &children[..],
        };
        slots
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i, c)))
    }

    pub fn child_count(&self) -> usize {
        self.children().count()
    }

    /// Bitmap of existing children, bit `i` set when octant `i` exists.
    pub fn child_bitmap(&self) -> u8 {
        self.children().fold(0u8, |acc, (i, _)| acc | (1 << i))
    }

    /// Maximum log-odds among existing children, if any.
    pub fn max_child_log_odds(&self) -> Option<f32> {
        self.children()
            .map(|(_, c)| c.log_odds())
            .reduce(f32::max)
    }

    /// Recompute an inner node's value from its children.
    pub(crate) fn update_inner_occupancy(&mut self) {
        if let Some(max) = self.max_child_log_odds()
            && let OcTreeNode::Inner { log_odds, .. } = self
        {
            *log_odds = max;
        }
    }

    /// Replace a leaf by an inner node whose eight children carry the leaf's
    /// value. Inner nodes are left alone.
    pub(crate) fn expand(&mut self) {
        if let OcTreeNode::Leaf(v) = self {
            let v = *v;
            *self = OcTreeNode::Inner {
                log_odds: v,
                children: Box::new(std::array::from_fn(|_| Some(OcTreeNode::Leaf(v)))),
            };
        }
    }

    /// True when all eight children exist, are leaves, and hold the same value.
    pub fn is_collapsible(&self) -> bool {
        let OcTreeNode::Inner { children, .. } = self else {
            return false;
        };
        let Some(OcTreeNode::Leaf(first)) = &children[0] else {
            return false;
        };
        children
            .iter()
            .all(|c| matches!(c, Some(OcTreeNode::Leaf(v)) if v == first))
    }

    /// Collapse a collapsible inner node into a leaf. Returns whether it did.
    pub(crate) fn collapse(&mut self) -> bool {
        if !self.is_collapsible() {
            return false;
        }
        let value = self.max_child_log_odds().unwrap_or_else(|| self.log_odds());
        *self = OcTreeNode::Leaf(value);
        true
    }

    /// Number of nodes in this subtree, this one included.
    pub fn subtree_size(&self) -> usize {
        1 + self
            .children()
            .map(|(_, c)| c.subtree_size())
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inner_with(values: &[(usize, f32)]) -> OcTreeNode {
        let mut node = OcTreeNode::empty_inner();
        if let Some(children) = node.children_mut() {
            for &(i, v) in values {
                children[i] = Some(OcTreeNode::Leaf(v));
            }
        }
        node.update_inner_occupancy();
        node
    }

    #[test]
    fn leaf_has_no_children() {
        let leaf = OcTreeNode::Leaf(0.4);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.child_count(), 0);
        assert_eq!(leaf.child_bitmap(), 0);
        assert_eq!(leaf.max_child_log_odds(), None);
    }

    #[test]
    fn inner_value_is_max_of_children() {
        let node = inner_with(&[(0, -1.0), (3, 0.7), (7, 0.2)]);
        assert_eq!(node.log_odds(), 0.7);
        assert_eq!(node.child_bitmap(), 0b1000_1001);
        assert_eq!(node.child_count(), 3);
    }

    #[test]
    fn expand_copies_value_into_eight_leaves() {
        let mut node = OcTreeNode::Leaf(1.5);
        node.expand();
        assert!(!node.is_leaf());
        assert_eq!(node.child_count(), 8);
        assert!(node.children().all(|(_, c)| c.log_odds() == 1.5));
        assert!(node.is_collapsible());
    }

    #[test]
    fn collapse_requires_all_eight_equal_leaves() {
        let mut partial = inner_with(&[(0, 1.0), (1, 1.0)]);
        assert!(!partial.collapse());

        let all: Vec<(usize, f32)> = (0..8).map(|i| (i, 1.0)).collect();
        let mut full = inner_with(&all);
        assert!(full.collapse());
        assert_eq!(full, OcTreeNode::Leaf(1.0));

        let mut mixed: Vec<(usize, f32)> = (0..8).map(|i| (i, 1.0)).collect();
        mixed[5].1 = 0.5;
        let mut uneven = inner_with(&mixed);
        assert!(!uneven.collapse());
    }

    #[test]
    fn subtree_size_counts_all_nodes() {
        let mut node = OcTreeNode::Leaf(0.0);
        node.expand();
        assert_eq!(node.subtree_size(), 9);
    }
}
