// ─────────────────────────────────────────────────────────────────────
// Thinkick — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::error::{TrackError, TrackResult};

/// Whether synchrotron-radiation physics takes part in the run at all.
/// `Disabled` removes the radiation path entirely: every element behaves as
/// if its radiation flag were 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadiationSupport {
    #[default]
    Enabled,
    Disabled,
}

/// Source of the `delta_taper` value handed to the kick primitive.
///
/// The two modes are mutually exclusive for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaperMode {
    /// Use the element's precomputed `delta_taper` reference, fixed for the lattice.
    #[default]
    Fixed,
    /// Use each particle's own live `delta` as its taper value.
    ParticleAdaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackDirection {
    #[default]
    Forward,
    Backtrack,
}

impl TrackDirection {
    /// Sign applied to lengths and asymmetric kick terms.
    pub fn sign(self) -> f64 {
        match self {
            TrackDirection::Forward => 1.0,
            TrackDirection::Backtrack => -1.0,
        }
    }
}

/// Run-wide tracking configuration, resolved once and read-only during tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub radiation: RadiationSupport,
    #[serde(default)]
    pub taper: TaperMode,
    #[serde(default)]
    pub direction: TrackDirection,
    /// Dispatch particles on the rayon pool instead of a sequential loop.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Global transverse aperture [m], checked at drifts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_xy_limit: Option<f64>,
    #[serde(default)]
    pub reset_s_at_end_turn: bool,
}

fn default_parallel() -> bool {
    true
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            radiation: RadiationSupport::default(),
            taper: TaperMode::default(),
            direction: TrackDirection::default(),
            parallel: default_parallel(),
            global_xy_limit: None,
            reset_s_at_end_turn: false,
        }
    }
}

impl TrackingConfig {
    /// Load from JSON file and validate.
    pub fn from_file(path: &str) -> TrackResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrackResult<()> {
        if let Some(limit) = self.global_xy_limit {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(TrackError::ConfigError(format!(
                    "global_xy_limit must be finite and > 0, got {limit}"
                )));
            }
        }
        Ok(())
    }

    /// Copy of this configuration with a different tracking direction.
    pub fn with_direction(&self, direction: TrackDirection) -> Self {
        TrackingConfig {
            direction,
            ..self.clone()
        }
    }

    pub fn radiation_enabled(&self) -> bool {
        self.radiation == RadiationSupport::Enabled
    }

    pub fn is_backtrack(&self) -> bool {
        self.direction == TrackDirection::Backtrack
    }
}
