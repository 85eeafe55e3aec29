//! Synchrotron radiation applied over a half path of a thin kick.
//!
//! Two models are available: a deterministic mean energy loss (`flag == 1`)
//! and a stochastic photon emission (`flag == 2`). Both act on the particle
//! energy only; transverse angles are preserved.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma, Poisson};
use thinkick_types::constants::{ALPHA_EM, ELECTRON_MASS_EV, HBAR_C_EV_M, R_CLASSICAL_ELECTRON};
use thinkick_types::state::{Particle, ReferenceParticle};

/// Mean photon energy in units of the critical energy: 8 / (15 sqrt 3).
const MEAN_PHOTON_OVER_CRITICAL: f64 = 0.307_920_143_567_800_3;
/// Shape of the Gamma approximation to the photon energy spectrum.
const PHOTON_SPECTRUM_SHAPE: f64 = 1.0 / 3.0;

/// One recorded radiation event: everything a kick emitted for one particle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RadiationRecordEntry {
    pub particle_id: usize,
    pub at_element: i64,
    pub at_turn: i64,
    pub n_photons: u64,
    /// Total emitted photon energy [eV]
    pub photon_energy_ev: f64,
    pub dp_entry: f64,
    pub dpx_entry: f64,
    pub dpy_entry: f64,
    pub dp_exit: f64,
    pub dpx_exit: f64,
    pub dpy_exit: f64,
}

/// Destination for radiation record entries.
///
/// Implementations must hand out each slot at most once so concurrent
/// kicks never write the same entry.
pub trait RadiationRecordSink: Sync {
    /// Reserve a slot, `None` when the sink is full or inactive.
    fn reserve_slot(&self) -> Option<usize>;
    /// Store `entry` into a slot previously obtained from `reserve_slot`.
    fn write(&self, slot: usize, entry: RadiationRecordEntry);
}

/// Momentum changes produced by one radiation half step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RadiationDelta {
    pub dp: f64,
    pub dpx: f64,
    pub dpy: f64,
    pub n_photons: u64,
    pub photon_energy_ev: f64,
}

/// Classical radius of the tracked species [m].
fn classical_radius_m(particle: &Particle, reference: &ReferenceParticle) -> f64 {
    let q = reference.q0 * particle.chi;
    R_CLASSICAL_ELECTRON * q * q * ELECTRON_MASS_EV / reference.mass0_ev
}

/// Per-particle random stream, independent of iteration order.
fn particle_rng(particle: &mut Particle) -> StdRng {
    let mut z = particle
        .rng_seed
        .wrapping_add(particle.rng_counter.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    particle.rng_counter = particle.rng_counter.wrapping_add(1);
    StdRng::seed_from_u64(z)
}

/// Mean energy loss over `path_length` at curvature `curvature`.
///
/// With `backtrack_sign < 0` the forward loss factor is undone instead.
pub fn synrad_average_kick(
    particle: &mut Particle,
    reference: &ReferenceParticle,
    curvature: f64,
    path_length: f64,
    backtrack_sign: f64,
) -> RadiationDelta {
    if curvature == 0.0 || path_length <= 0.0 {
        return RadiationDelta::default();
    }
    let gamma = particle.gamma(reference);
    let energy = particle.energy_ev(reference);
    let r0 = classical_radius_m(particle, reference);
    let loss_fraction =
        (2.0 / 3.0) * r0 * gamma.powi(3) * curvature * curvature * path_length;
    let loss_fraction = loss_fraction.min(1.0 - f64::EPSILON);
    let delta_energy = if backtrack_sign < 0.0 {
        energy * loss_fraction / (1.0 - loss_fraction)
    } else {
        -energy * loss_fraction
    };
    apply_energy_change(particle, reference, delta_energy, 0, 0.0)
}

/// Stochastic photon emission over `path_length`.
pub fn synrad_emit_photons(
    particle: &mut Particle,
    reference: &ReferenceParticle,
    curvature: f64,
    path_length: f64,
) -> RadiationDelta {
    if curvature == 0.0 || path_length <= 0.0 {
        return RadiationDelta::default();
    }
    let gamma = particle.gamma(reference);
    let q = reference.q0 * particle.chi;
    let mean_photons =
        5.0 * ALPHA_EM * q * q * gamma * curvature * path_length / (2.0 * 3f64.sqrt());
    if !mean_photons.is_finite() || mean_photons <= 0.0 {
        return RadiationDelta::default();
    }
    let critical_energy_ev = 1.5 * HBAR_C_EV_M * gamma.powi(3) * curvature;
    let scale = MEAN_PHOTON_OVER_CRITICAL * critical_energy_ev / PHOTON_SPECTRUM_SHAPE;

    let mut rng = particle_rng(particle);
    let (Ok(poisson), Ok(spectrum)) = (
        Poisson::new(mean_photons),
        Gamma::new(PHOTON_SPECTRUM_SHAPE, scale),
    ) else {
        return RadiationDelta::default();
    };
    let n_photons: f64 = poisson.sample(&mut rng);
    let n_photons = n_photons as u64;
    let energy = particle.energy_ev(reference);
    let mut emitted = 0.0;
    for _ in 0..n_photons {
        emitted += spectrum.sample(&mut rng);
    }
    // A particle cannot radiate more than it carries above rest energy.
    let emitted = emitted.min(energy - reference.mass0_ev);
    apply_energy_change(particle, reference, -emitted, n_photons, emitted)
}

fn apply_energy_change(
    particle: &mut Particle,
    reference: &ReferenceParticle,
    delta_energy_ev: f64,
    n_photons: u64,
    photon_energy_ev: f64,
) -> RadiationDelta {
    let (delta0, px0, py0) = (particle.delta, particle.px, particle.py);
    particle.add_to_energy(delta_energy_ev, reference, false);
    RadiationDelta {
        dp: particle.delta - delta0,
        dpx: particle.px - px0,
        dpy: particle.py - py0,
        n_photons,
        photon_energy_ev,
    }
}
