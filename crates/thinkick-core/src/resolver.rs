//! Slice parameter resolution.
//!
//! Turns a [`SliceDescriptor`] and the run configuration into the scalar
//! parameters handed to the multipole kick. Nothing here can fail: weight
//! and length validity are enforced where slices are built.

use thinkick_physics::multipole::{KickParams, MultipoleTerms};
use thinkick_types::config::{TaperMode, TrackingConfig};
use thinkick_types::state::Particle;

use crate::element::SliceDescriptor;

/// Resolved kick parameters of one thin quadrupole slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceParameters {
    /// Normal strengths; index 0 (dipole) is always zero
    pub knl_quad: [f64; 2],
    /// Skew strengths; index 0 is always zero
    pub ksl_quad: [f64; 2],
    pub weight: f64,
    /// Signed length: negative when backtracking
    pub length: f64,
    pub backtrack_sign: f64,
    pub radiation_flag: i64,
    /// Fixed taper reference; unused under `TaperMode::ParticleAdaptive`
    pub delta_taper: f64,
    pub taper_mode: TaperMode,
    radiation_enabled: bool,
}

impl SliceParameters {
    pub fn resolve(descriptor: &SliceDescriptor, config: &TrackingConfig) -> Self {
        let backtrack_sign = config.direction.sign();
        let length = backtrack_sign * descriptor.length;
        let radiation_enabled = config.radiation_enabled();

        let (radiation_flag, delta_taper) = if radiation_enabled {
            (descriptor.radiation_flag, descriptor.delta_taper)
        } else {
            (0, 0.0)
        };

        // length is already scaled by the weight
        let weight = descriptor.weight;
        SliceParameters {
            knl_quad: [0.0, descriptor.k1 * length / weight],
            ksl_quad: [0.0, descriptor.k1s * length / weight],
            weight,
            length,
            backtrack_sign,
            radiation_flag,
            delta_taper,
            taper_mode: config.taper,
            radiation_enabled,
        }
    }

    /// Taper value for one particle under the configured mode.
    pub fn taper_for(&self, particle: &Particle) -> f64 {
        match self.taper_mode {
            TaperMode::Fixed => self.delta_taper,
            TaperMode::ParticleAdaptive if self.radiation_enabled => particle.delta,
            TaperMode::ParticleAdaptive => 0.0,
        }
    }

    /// Whether the kernel should look for a radiation record.
    pub fn wants_record(&self) -> bool {
        self.radiation_flag == 2
    }

    pub fn kick_params(&self, delta_taper: f64) -> KickParams<'_> {
        KickParams {
            hxl: 0.0,
            hyl: 0.0,
            length: self.length,
            weight: self.weight,
            secondary: None,
            terms: MultipoleTerms {
                knl: &self.knl_quad,
                ksl: &self.ksl_quad,
                order: 1,
            },
            backtrack_sign: self.backtrack_sign,
            delta_taper,
            radiation_flag: self.radiation_flag,
        }
    }
}
