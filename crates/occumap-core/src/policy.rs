//! Occupancy update policy.
//!
//! Occupancy is stored per node as log-odds `L = ln(p / (1 − p))`, which makes
//! fusing independent observations a plain addition:
//!
//! ```text
//! L' = clamp(L + (hit ? hit_log_odds : miss_log_odds), clamp_min, clamp_max)
//! ```
//!
//! The clamp bounds keep the map able to change its mind about a cell after
//! many consistent observations. A cell is occupied when
//! `probability(L) >= occupancy_threshold`.
//!
//! # Example
//!
//! ```rust
//! use occumap_core::policy::{OccupancyParams, log_odds};
//!
//! let params = OccupancyParams::default();
//! let l = params.apply(0.0, true);
//! assert!((l - log_odds(0.7)).abs() < 1e-6);
//! assert!(params.is_occupied(l));
//! assert!(!params.is_occupied(params.apply(0.0, false)));
//! ```

use occumap_types::{MapError, Result};
use serde::{Deserialize, Serialize};

/// Convert a probability into log-odds.
pub fn log_odds(probability: f64) -> f32 {
    (probability / (1.0 - probability)).ln() as f32
}

/// Convert log-odds back into a probability.
pub fn probability(log_odds: f32) -> f64 {
    1.0 - 1.0 / (1.0 + (log_odds as f64).exp())
}

fn default_hit() -> f32 {
    log_odds(0.7)
}
fn default_miss() -> f32 {
    log_odds(0.4)
}
fn default_clamp_min() -> f32 {
    log_odds(0.1192)
}
fn default_clamp_max() -> f32 {
    log_odds(0.971)
}
fn default_threshold() -> f64 {
    0.5
}

/// Sensor model and decision threshold of an occupancy map.
///
/// Increments and clamp bounds are in log-odds; the occupancy threshold is a
/// probability, as callers usually think of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OccupancyParams {
    /// Log-odds added to a cell that contains a measured endpoint.
    #[serde(default = "default_hit")]
    pub hit_log_odds: f32,
    /// Log-odds added to a cell a beam passes through. Negative.
    #[serde(default = "default_miss")]
    pub miss_log_odds: f32,
    #[serde(default = "default_clamp_min")]
    pub clamp_min_log_odds: f32,
    #[serde(default = "default_clamp_max")]
    pub clamp_max_log_odds: f32,
    /// Probability at or above which a cell counts as occupied.
    #[serde(default = "default_threshold")]
    pub occupancy_threshold: f64,
}

impl Default for OccupancyParams {
    fn default() -> Self {
        Self {
            hit_log_odds: default_hit(),
            miss_log_odds: default_miss(),
            clamp_min_log_odds: default_clamp_min(),
            clamp_max_log_odds: default_clamp_max(),
            occupancy_threshold: default_threshold(),
        }
    }
}

impl OccupancyParams {
    /// Build parameters from probabilities and validate them.
    pub fn from_probabilities(
        prob_hit: f64,
        prob_miss: f64,
        clamp_min: f64,
        clamp_max: f64,
        occupancy_threshold: f64,
    ) -> Result<Self> {
        for (name, p) in [
            ("prob_hit", prob_hit),
            ("prob_miss", prob_miss),
            ("clamp_min", clamp_min),
            ("clamp_max", clamp_max),
        ] {
            if !(p > 0.0 && p < 1.0) {
                return Err(MapError::InvalidConfiguration(format!(
                    "{name} must be a probability in (0, 1), got {p}"
                )));
            }
        }
        let params = Self {
            hit_log_odds: log_odds(prob_hit),
            miss_log_odds: log_odds(prob_miss),
            clamp_min_log_odds: log_odds(clamp_min),
            clamp_max_log_odds: log_odds(clamp_max),
            occupancy_threshold,
        };
        params.validate()?;
        Ok(params)
    }

    /// Reject parameter sets the update rule cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.hit_log_odds.is_finite() || !self.miss_log_odds.is_finite() {
            return Err(MapError::InvalidConfiguration(
                "hit/miss increments must be finite".to_string(),
            ));
        }
        if !self.clamp_min_log_odds.is_finite() || !self.clamp_max_log_odds.is_finite() {
            return Err(MapError::InvalidConfiguration(
                "clamp bounds must be finite".to_string(),
            ));
        }
        if self.clamp_min_log_odds >= self.clamp_max_log_odds {
            return Err(MapError::InvalidConfiguration(format!(
                "clamp_min ({}) must be below clamp_max ({})",
                self.clamp_min_log_odds, self.clamp_max_log_odds
            )));
        }
        validate_threshold(self.occupancy_threshold)
    }

    /// Threshold expressed in log-odds.
    pub fn threshold_log_odds(&self) -> f32 {
        log_odds(self.occupancy_threshold)
    }

    /// Clamp `value` into `[clamp_min, clamp_max]`.
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.clamp_min_log_odds, self.clamp_max_log_odds)
    }

    /// Fuse one observation into `current`.
    pub fn apply(&self, current: f32, hit: bool) -> f32 {
        let delta = if hit {
            self.hit_log_odds
        } else {
            self.miss_log_odds
        };
        self.clamp(current + delta)
    }

    pub fn is_occupied(&self, value: f32) -> bool {
        probability(value) >= self.occupancy_threshold
    }

    /// True when `value` sits on one of the clamp bounds.
    pub fn is_at_threshold(&self, value: f32) -> bool {
        value <= self.clamp_min_log_odds || value >= self.clamp_max_log_odds
    }
}

/// The occupancy threshold must be an open probability.
pub(crate) fn validate_threshold(p: f64) -> Result<()> {
    if p > 0.0 && p < 1.0 {
        Ok(())
    } else {
        Err(MapError::InvalidConfiguration(format!(
            "occupancy threshold must be in (0, 1), got {p}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_odds_probability_inverse() {
        for p in [0.12, 0.4, 0.5, 0.7, 0.97] {
            assert!((probability(log_odds(p)) - p).abs() < 1e-6, "p = {p}");
        }
        assert_eq!(log_odds(0.5), 0.0);
    }

    #[test]
    fn defaults_match_sensor_model() {
        let p = OccupancyParams::default();
        assert!((p.hit_log_odds - 0.847_298).abs() < 1e-5);
        assert!((p.miss_log_odds + 0.405_465).abs() < 1e-5);
        assert!((p.clamp_min_log_odds + 2.0).abs() < 1e-3);
        assert!((p.clamp_max_log_odds - 3.51).abs() < 1e-2);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn threshold_half_means_non_negative_is_occupied() {
        let p = OccupancyParams::default();
        assert!(p.is_occupied(0.0));
        assert!(p.is_occupied(1.17));
        assert!(!p.is_occupied(-0.01));
    }

    #[test]
    fn repeated_hits_saturate_at_clamp_max() {
        let p = OccupancyParams::default();
        let mut l = 0.0;
        for _ in 0..50 {
            l = p.apply(l, true);
        }
        assert_eq!(l, p.clamp_max_log_odds);
        assert_eq!(p.apply(l, true), p.clamp_max_log_odds);
        assert!(p.is_at_threshold(l));
    }

    #[test]
    fn repeated_misses_saturate_at_clamp_min() {
        let p = OccupancyParams::default();
        let mut l = 0.0;
        for _ in 0..50 {
            l = p.apply(l, false);
        }
        assert_eq!(l, p.clamp_min_log_odds);
        assert!(p.is_at_threshold(l));
    }

    #[test]
    fn validate_rejects_inverted_clamps() {
        let p = OccupancyParams {
            clamp_min_log_odds: 2.0,
            clamp_max_log_odds: 1.0,
            ..OccupancyParams::default()
        };
        assert!(matches!(p.validate(), Err(MapError::InvalidConfiguration(_))));
    }

    #[test]
    fn validate_rejects_threshold_outside_open_interval() {
        for t in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            let p = OccupancyParams {
                occupancy_threshold: t,
                ..OccupancyParams::default()
            };
            assert!(p.validate().is_err(), "threshold {t} must be rejected");
        }
    }

    #[test]
    fn from_probabilities_rejects_non_probability() {
        assert!(OccupancyParams::from_probabilities(1.2, 0.4, 0.12, 0.97, 0.5).is_err());
        let p = OccupancyParams::from_probabilities(0.7, 0.4, 0.12, 0.97, 0.6).unwrap();
        assert!((p.occupancy_threshold - 0.6).abs() < 1e-12);
        assert!(!p.is_occupied(0.0));
    }
}
