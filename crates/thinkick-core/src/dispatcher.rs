//! Per-particle kick dispatch for thin quadrupole slices.
//!
//! Every active particle is pushed through the shared multipole kick with
//! its own scratch accumulators. Particles never read each other's state,
//! so the block runs sequentially or on the rayon pool with identical
//! results.

use log::{debug, warn};
use rayon::prelude::*;
use thinkick_physics::multipole::{KickScratch, MultipoleKick, ThinMultipole};
use thinkick_physics::synrad::RadiationRecordSink;
use thinkick_types::config::TrackingConfig;
use thinkick_types::state::{Particle, ParticleSet};

use crate::element::ThinSliceQuadrupole;
use crate::resolver::SliceParameters;

/// Track a particle set through one thin quadrupole slice.
pub fn track_thin_slice_quadrupole(
    element: &ThinSliceQuadrupole,
    particles: &mut ParticleSet,
    config: &TrackingConfig,
) {
    track_thin_slice_with(&ThinMultipole, element, particles, config);
}

/// Same as [`track_thin_slice_quadrupole`] with a caller-supplied kick.
pub fn track_thin_slice_with<K: MultipoleKick>(
    kick: &K,
    element: &ThinSliceQuadrupole,
    particles: &mut ParticleSet,
    config: &TrackingConfig,
) {
    let params = SliceParameters::resolve(&element.descriptor(), config);

    let record = if params.wants_record() {
        let record = element.internal_record();
        if record.is_none() {
            debug!("radiation_flag 2 without an active record, tracking without recording");
        }
        record
    } else {
        None
    };
    let dropped_before = record.map(|r| r.index().num_dropped());
    let sink: Option<&dyn RadiationRecordSink> = record.map(|r| r as &dyn RadiationRecordSink);

    let reference = particles.reference;
    let kick_one = |particle: &mut Particle| {
        let delta_taper = params.taper_for(particle);
        let kick_params = params.kick_params(delta_taper);
        let mut scratch = KickScratch::default();
        kick.track_single_particle(particle, &reference, &kick_params, &mut scratch, sink);
    };

    if config.parallel {
        particles
            .particles
            .par_iter_mut()
            .filter(|p| p.is_active())
            .for_each(kick_one);
    } else {
        particles
            .particles
            .iter_mut()
            .filter(|p| p.is_active())
            .for_each(kick_one);
    }

    if let (Some(record), Some(before)) = (record, dropped_before) {
        let dropped = record.index().num_dropped() - before;
        if dropped > 0 {
            warn!(
                "radiation record full (capacity {}), {dropped} entries dropped",
                record.capacity()
            );
        }
    }
}
