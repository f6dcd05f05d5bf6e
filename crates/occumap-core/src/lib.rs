//! `occumap-core` – probabilistic 3-D occupancy mapping.
//!
//! Fuses noisy range observations into a sparse octree of log-odds occupancy
//! and answers occupied / free / unknown at any resolution up to the finest.
//!
//! # Modules
//!
//! - [`key`] – [`KeyCodec`][key::KeyCodec]: world coordinates ↔ integer
//!   [`OcTreeKey`][key::OcTreeKey]s at any depth.
//! - [`node`] – [`OcTreeNode`][node::OcTreeNode]: leaf or inner node holding
//!   a log-odds value.
//! - [`octree`] – [`OcTree`][octree::OcTree]: the map container (update,
//!   search, prune, expand, delete, leaf iteration).
//! - [`policy`] – [`OccupancyParams`][policy::OccupancyParams]: the log-odds
//!   fusion rule, clamps and occupancy threshold.
//! - [`ray`] – [`RayTraversal`][ray::RayTraversal]: exact 3-D grid traversal,
//!   plus ray casting against the map.
//! - [`scan`] – batch integration of range scans with free-space carving.
//! - [`io`] – the compact binary map format.
//! - [`query`] – occupied cells at a caller-chosen resolution.
//! - [`pose`] – rigid-body poses and sensor trajectories.
//! - [`config`] – TOML configuration with environment overrides.
//!
//! The library emits `tracing` events but never installs a subscriber.

pub mod config;
pub mod io;
pub mod key;
pub mod node;
pub mod octree;
pub mod policy;
pub mod pose;
pub mod query;
pub mod ray;
pub mod scan;

pub use config::OcTreeConfig;
pub use key::{KeyCodec, OcTreeKey};
pub use node::OcTreeNode;
pub use octree::{LeafVisit, OcTree};
pub use policy::OccupancyParams;
pub use pose::{Pose6D, Quaternion, Trajectory};
pub use ray::RayCast;
pub use scan::{BatchReport, RejectedBeam, ScanUpdate};

pub use occumap_types::{MapError, MapSnapshot, OccupiedCell, Point3, Result};
