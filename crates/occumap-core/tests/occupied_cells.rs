//! Occupied-cell extraction at several resolutions over a small patch of
//! directly set cells.

use occumap_core::{OcTree, OccupiedCell, Point3};

const CELLS: [(f64, f64, f64, f32); 18] = [
    (-0.25, 0.05, 0.05, 1.15),
    (-0.25, 0.15, 0.05, 1.16),
    (-0.15, 0.05, 0.05, 1.12),
    (-0.05, 0.05, 0.05, 1.09),
    (-0.15, 0.15, 0.05, 1.13),
    (-0.05, 0.15, 0.05, 1.10),
    (-0.25, 0.25, 0.05, 1.17),
    (-0.15, 0.25, 0.05, 1.14),
    (-0.05, 0.25, 0.05, 1.11),
    (0.05, 0.05, 0.05, 1.00),
    (0.15, 0.05, 0.05, 1.03),
    (0.05, 0.15, 0.05, 1.01),
    (0.15, 0.15, 0.05, 1.04),
    (0.25, 0.05, 0.05, 1.06),
    (0.25, 0.15, 0.05, 1.07),
    (0.05, 0.25, 0.05, 1.02),
    (0.15, 0.25, 0.05, 1.05),
    (0.25, 0.25, 0.05, 1.08),
];

fn patch() -> OcTree {
    let mut tree = OcTree::with_resolution(0.1).unwrap();
    tree.set_occupancy_threshold(0.5).unwrap();
    for &(x, y, z, v) in &CELLS {
        tree.set_node_value(Point3::new(x, y, z), v).unwrap();
    }
    tree
}

fn assert_cells(actual: &[OccupiedCell], expected: &[(f64, f64, f64, f32)]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?}");
    for (i, (cell, &(x, y, z, v))) in actual.iter().zip(expected).enumerate() {
        assert!((cell.center.x - x).abs() < 1e-6, "cell {i}: {cell:?}");
        assert!((cell.center.y - y).abs() < 1e-6, "cell {i}: {cell:?}");
        assert!((cell.center.z - z).abs() < 1e-6, "cell {i}: {cell:?}");
        assert!((cell.log_odds - v).abs() < 1e-6, "cell {i}: {cell:?}");
    }
}

#[test]
fn finest_resolution_returns_every_cell_in_order() {
    let tree = patch();
    assert_cells(&tree.occupied_cells(None), &CELLS);
    assert_cells(&tree.occupied_cells(Some(0.1)), &CELLS);
}

#[test]
fn request_finer_than_tree_returns_finest_cells() {
    let tree = patch();
    assert_cells(&tree.occupied_cells(Some(0.05)), &CELLS);
}

#[test]
fn coarse_request_aggregates_by_maximum() {
    let tree = patch();
    assert_cells(
        &tree.occupied_cells(Some(0.5)),
        &[(-0.25, 0.25, 0.25, 1.17), (0.25, 0.25, 0.25, 1.08)],
    );
}

#[test]
fn pruning_does_not_change_the_answer() {
    let mut tree = patch();
    let before = tree.occupied_cells(Some(0.5));
    tree.prune();
    assert_eq!(tree.occupied_cells(Some(0.5)), before);
    assert_cells(&tree.occupied_cells(None), &CELLS);
}
