//! Expanded drift map.
//!
//! Exactly invertible: tracking with `-length` undoes tracking with `length`.

use thinkick_types::state::Particle;

/// Propagate one particle through a field-free region of `length` metres.
pub fn drift_single_particle_expanded(particle: &mut Particle, length: f64) {
    if !length.is_finite() || length == 0.0 {
        return;
    }
    let rpp = particle.rpp;
    let rv0v = 1.0 / particle.rvv;
    let xp = particle.px * rpp;
    let yp = particle.py * rpp;
    let dzeta = 1.0 - rv0v * (1.0 + 0.5 * (xp * xp + yp * yp));

    particle.x += xp * length;
    particle.y += yp * length;
    particle.s += length;
    particle.zeta += length * dzeta;
}

/// Drift every active particle of a slice.
pub fn drift_particles(particles: &mut [Particle], length: f64) {
    for particle in particles.iter_mut().filter(|p| p.is_active()) {
        drift_single_particle_expanded(particle, length);
    }
}
