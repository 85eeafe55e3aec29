// ─────────────────────────────────────────────────────────────────────
// Thinkick — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use ndarray::Array2;

use crate::error::{TrackError, TrackResult};

/// Number of phase-space columns: x, px, y, py, zeta, delta.
pub const N_COORDS: usize = 6;

/// Reference particle shared by every particle of a set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceParticle {
    /// Rest energy [eV]
    pub mass0_ev: f64,
    /// Charge in units of the elementary charge
    pub q0: f64,
    /// Reference momentum times c [eV]
    pub p0c_ev: f64,
}

impl ReferenceParticle {
    pub fn new(mass0_ev: f64, q0: f64, p0c_ev: f64) -> TrackResult<Self> {
        if !mass0_ev.is_finite() || mass0_ev <= 0.0 {
            return Err(TrackError::InvalidParticle(
                "mass0_ev must be finite and > 0".to_string(),
            ));
        }
        if !q0.is_finite() || q0 == 0.0 {
            return Err(TrackError::InvalidParticle(
                "q0 must be finite and non-zero".to_string(),
            ));
        }
        if !p0c_ev.is_finite() || p0c_ev <= 0.0 {
            return Err(TrackError::InvalidParticle(
                "p0c_ev must be finite and > 0".to_string(),
            ));
        }
        Ok(ReferenceParticle {
            mass0_ev,
            q0,
            p0c_ev,
        })
    }

    /// Total reference energy [eV].
    pub fn energy0_ev(&self) -> f64 {
        (self.p0c_ev * self.p0c_ev + self.mass0_ev * self.mass0_ev).sqrt()
    }

    pub fn beta0(&self) -> f64 {
        self.p0c_ev / self.energy0_ev()
    }

    pub fn gamma0(&self) -> f64 {
        self.energy0_ev() / self.mass0_ev
    }
}

/// One tracked macro-particle in accelerator coordinates.
///
/// `px`/`py` are normalized to the reference momentum, `delta` is the
/// relative momentum deviation. `ptau`, `rpp` and `rvv` are kept
/// consistent with `delta` by [`Particle::update_delta`].
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub x: f64,
    pub px: f64,
    pub y: f64,
    pub py: f64,
    pub zeta: f64,
    pub delta: f64,
    pub ptau: f64,
    /// 1 / (1 + delta)
    pub rpp: f64,
    /// beta / beta0
    pub rvv: f64,
    /// Charge-over-mass ratio relative to the reference
    pub chi: f64,
    /// > 0 active, <= 0 lost
    pub state: i64,
    pub particle_id: usize,
    pub at_element: i64,
    pub at_turn: i64,
    pub s: f64,
    pub rng_seed: u64,
    pub rng_counter: u64,
}

impl Particle {
    /// Build a particle from phase-space coordinates.
    pub fn new(coords: [f64; N_COORDS], particle_id: usize, beta0: f64) -> Self {
        let [x, px, y, py, zeta, delta] = coords;
        let mut particle = Particle {
            x,
            px,
            y,
            py,
            zeta,
            delta: 0.0,
            ptau: 0.0,
            rpp: 1.0,
            rvv: 1.0,
            chi: 1.0,
            state: 1,
            particle_id,
            at_element: 0,
            at_turn: 0,
            s: 0.0,
            rng_seed: particle_id as u64,
            rng_counter: 0,
        };
        particle.update_delta(delta, beta0);
        particle
    }

    pub fn is_active(&self) -> bool {
        self.state > 0
    }

    /// Mark as lost with the given (non-positive) state code.
    pub fn mark_lost(&mut self, code: i64) {
        self.state = code.min(0);
    }

    /// Set `delta` and refresh the dependent longitudinal variables.
    pub fn update_delta(&mut self, delta: f64, beta0: f64) {
        let delta_beta0 = delta * beta0;
        let ptau_beta0 =
            (delta_beta0 * delta_beta0 + 2.0 * delta_beta0 * beta0 + 1.0).sqrt() - 1.0;
        let one_plus_delta = 1.0 + delta;
        self.delta = delta;
        self.rvv = one_plus_delta / (1.0 + ptau_beta0);
        self.rpp = 1.0 / one_plus_delta;
        self.ptau = ptau_beta0 / beta0;
    }

    /// Total energy [eV].
    pub fn energy_ev(&self, reference: &ReferenceParticle) -> f64 {
        reference.energy0_ev() * (1.0 + reference.beta0() * self.ptau)
    }

    /// Relativistic gamma of this particle.
    pub fn gamma(&self, reference: &ReferenceParticle) -> f64 {
        self.energy_ev(reference) / reference.mass0_ev
    }

    /// Change the particle energy by `delta_energy_ev`.
    ///
    /// Unless `pz_only` is set, `px` and `py` are rescaled so the transverse
    /// angles are preserved.
    pub fn add_to_energy(
        &mut self,
        delta_energy_ev: f64,
        reference: &ReferenceParticle,
        pz_only: bool,
    ) {
        let beta0 = reference.beta0();
        let ptau_beta0 = self.ptau * beta0 + delta_energy_ev / reference.energy0_ev();
        let ptau = ptau_beta0 / beta0;
        let new_delta = (ptau * ptau + 2.0 * ptau / beta0 + 1.0).sqrt() - 1.0;
        let old_rpp = self.rpp;
        self.update_delta(new_delta, beta0);
        if !pz_only {
            let scale = old_rpp / self.rpp;
            self.px *= scale;
            self.py *= scale;
        }
    }

    pub fn coords(&self) -> [f64; N_COORDS] {
        [self.x, self.px, self.y, self.py, self.zeta, self.delta]
    }
}

/// A set of particles sharing one reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSet {
    pub reference: ReferenceParticle,
    pub particles: Vec<Particle>,
}

impl ParticleSet {
    /// Build from rows of `[x, px, y, py, zeta, delta]`.
    pub fn from_coordinates(
        reference: ReferenceParticle,
        coords: &Array2<f64>,
    ) -> TrackResult<Self> {
        if coords.ncols() != N_COORDS {
            return Err(TrackError::InvalidParticle(format!(
                "coordinate array must have {N_COORDS} columns, got {}",
                coords.ncols()
            )));
        }
        let beta0 = reference.beta0();
        let mut particles = Vec::with_capacity(coords.nrows());
        for (idx, row) in coords.outer_iter().enumerate() {
            let mut values = [0.0; N_COORDS];
            for (slot, v) in values.iter_mut().zip(row.iter()) {
                *slot = *v;
            }
            particles.push(Particle::new(values, idx, beta0));
        }
        let set = ParticleSet {
            reference,
            particles,
        };
        set.validate()?;
        Ok(set)
    }

    /// Convenience constructor for a single particle.
    pub fn single(reference: ReferenceParticle, coords: [f64; N_COORDS]) -> TrackResult<Self> {
        let set = ParticleSet {
            reference,
            particles: vec![Particle::new(coords, 0, reference.beta0())],
        };
        set.validate()?;
        Ok(set)
    }

    /// Re-seed every particle's random stream from `base_seed`.
    pub fn with_rng_seeds(mut self, base_seed: u64) -> Self {
        for p in self.particles.iter_mut() {
            p.rng_seed = base_seed
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                .wrapping_add(p.particle_id as u64);
            p.rng_counter = 0;
        }
        self
    }

    pub fn validate(&self) -> TrackResult<()> {
        for (idx, particle) in self.particles.iter().enumerate() {
            validate_particle_state(particle, &format!("particle[{idx}]"))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn num_active(&self) -> usize {
        self.particles.iter().filter(|p| p.is_active()).count()
    }

    /// Phase-space coordinates as an `[n, 6]` array.
    pub fn coordinates(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.particles.len(), N_COORDS));
        for (i, p) in self.particles.iter().enumerate() {
            for (j, v) in p.coords().iter().enumerate() {
                out[[i, j]] = *v;
            }
        }
        out
    }
}

fn validate_particle_state(particle: &Particle, label: &str) -> TrackResult<()> {
    if particle.coords().iter().any(|v| !v.is_finite()) {
        return Err(TrackError::InvalidParticle(format!(
            "{label} phase-space coordinates must be finite"
        )));
    }
    if !particle.chi.is_finite() || particle.chi == 0.0 {
        return Err(TrackError::InvalidParticle(format!(
            "{label}.chi must be finite and non-zero"
        )));
    }
    if particle.delta <= -1.0 {
        return Err(TrackError::InvalidParticle(format!(
            "{label}.delta must be > -1"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationSummary {
    pub count: usize,
    pub active: usize,
    pub mean_delta: f64,
    pub rms_x: f64,
    pub rms_y: f64,
}

/// Moments over the active particles of a set.
pub fn summarize_population(set: &ParticleSet) -> PopulationSummary {
    let active: Vec<&Particle> = set.particles.iter().filter(|p| p.is_active()).collect();
    let n = active.len();
    if n == 0 {
        return PopulationSummary {
            count: set.len(),
            active: 0,
            mean_delta: 0.0,
            rms_x: 0.0,
            rms_y: 0.0,
        };
    }
    let nf = n as f64;
    let mean_delta = active.iter().map(|p| p.delta).sum::<f64>() / nf;
    let rms_x = (active.iter().map(|p| p.x * p.x).sum::<f64>() / nf).sqrt();
    let rms_y = (active.iter().map(|p| p.y * p.y).sum::<f64>() / nf).sqrt();
    PopulationSummary {
        count: set.len(),
        active: n,
        mean_delta,
        rms_x,
        rms_y,
    }
}
