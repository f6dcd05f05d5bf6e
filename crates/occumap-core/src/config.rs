//! Map configuration – reads/writes TOML files such as `occumap.toml`.
//!
//! ```toml
//! resolution = 0.05
//! max_depth = 16
//!
//! [occupancy]
//! occupancy_threshold = 0.5
//! hit_log_odds = 0.85
//! ```
//!
//! Missing fields fall back to their defaults. Values are validated when the
//! tree is built, never silently corrected.

use std::fs;
use std::path::Path;

use occumap_types::{MapError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::key::{KeyCodec, MAX_TREE_DEPTH};
use crate::policy::{OccupancyParams, log_odds};

/// Construction parameters of an [`OcTree`][crate::OcTree].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OcTreeConfig {
    /// Edge length of the finest cells (metres).
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    /// Levels below the root; the key space spans `2^max_depth` cells per axis.
    #[serde(default = "default_max_depth")]
    pub max_depth: u8,

    #[serde(default)]
    pub occupancy: OccupancyParams,
}

fn default_resolution() -> f64 {
    0.1
}
fn default_max_depth() -> u8 {
    MAX_TREE_DEPTH
}

impl Default for OcTreeConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            max_depth: default_max_depth(),
            occupancy: OccupancyParams::default(),
        }
    }
}

impl OcTreeConfig {
    /// Default configuration at `resolution`.
    pub fn with_resolution(resolution: f64) -> Self {
        Self {
            resolution,
            ..Self::default()
        }
    }

    /// Check every parameter; the first violation is returned.
    pub fn validate(&self) -> Result<()> {
        KeyCodec::new(self.resolution, self.max_depth)?;
        self.occupancy.validate()
    }
}

/// Parse a configuration from TOML text.
pub fn from_toml_str(raw: &str) -> Result<OcTreeConfig> {
    toml::from_str(raw).map_err(|e| MapError::Config(format!("failed to parse config: {e}")))
}

/// Load the config from `path`. Returns `None` if the file does not exist.
///
/// Environment overrides are applied on top of the file contents.
pub fn load_from(path: &Path) -> Result<Option<OcTreeConfig>> {
    let mut cfg = read_from(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Read the config stored at `path` as-is, without environment overrides.
pub fn read_from(path: &Path) -> Result<Option<OcTreeConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    from_toml_str(&raw).map(Some)
}

/// Apply `OCCUMAP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `OCCUMAP_RESOLUTION` | `resolution` |
/// | `OCCUMAP_MAX_DEPTH` | `max_depth` |
/// | `OCCUMAP_OCCUPANCY_THRESHOLD` | `occupancy.occupancy_threshold` |
/// | `OCCUMAP_PROB_HIT` | `occupancy.hit_log_odds` (given as a probability) |
/// | `OCCUMAP_PROB_MISS` | `occupancy.miss_log_odds` (given as a probability) |
///
/// Values that do not parse, or that are out of range for their field, are
/// ignored.
pub fn apply_env_overrides(cfg: &mut OcTreeConfig) {
    if let Some(v) = env_parse("OCCUMAP_RESOLUTION", |v: &f64| v.is_finite() && *v > 0.0) {
        cfg.resolution = v;
    }
    if let Some(v) = env_parse("OCCUMAP_MAX_DEPTH", |v: &u8| (1..=MAX_TREE_DEPTH).contains(v)) {
        cfg.max_depth = v;
    }
    if let Some(v) = env_parse("OCCUMAP_OCCUPANCY_THRESHOLD", is_open_probability) {
        cfg.occupancy.occupancy_threshold = v;
    }
    if let Some(p) = env_parse("OCCUMAP_PROB_HIT", is_open_probability) {
        cfg.occupancy.hit_log_odds = log_odds(p);
    }
    if let Some(p) = env_parse("OCCUMAP_PROB_MISS", is_open_probability) {
        cfg.occupancy.miss_log_odds = log_odds(p);
    }
}

fn is_open_probability(p: &f64) -> bool {
    *p > 0.0 && *p < 1.0
}

fn env_parse<T: std::str::FromStr>(var: &str, valid: impl Fn(&T) -> bool) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) if valid(&v) => Some(v),
        Ok(_) => {
            warn!(var, value = %raw, "ignoring out-of-range config override");
            None
        }
        Err(_) => {
            warn!(var, value = %raw, "ignoring unparsable config override");
            None
        }
    }
}

/// Save the config to `path`, creating parent directories if necessary.
pub fn save_to(cfg: &OcTreeConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| MapError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw)?;
    Ok(())
}
