//! Thin multipole kick shared by every thin-slice element kernel.
//!
//! The kick is evaluated with a Horner scheme over the complex transverse
//! position and scaled by the slice weight and the taper factor. Optional
//! synchrotron radiation is split into an entry and an exit half around the
//! kick.

use thinkick_types::state::{Particle, ReferenceParticle};

use crate::synrad::{
    synrad_average_kick, synrad_emit_photons, RadiationDelta, RadiationRecordEntry,
    RadiationRecordSink,
};

/// Integrated multipole strengths up to `order`.
///
/// `knl[n]` / `ksl[n]` are the normal / skew integrated strengths of order n.
/// Entries beyond the end of either slice are zero.
#[derive(Debug, Clone, Copy)]
pub struct MultipoleTerms<'a> {
    pub knl: &'a [f64],
    pub ksl: &'a [f64],
    pub order: usize,
}

/// Everything the kick primitive needs besides the particle.
#[derive(Debug, Clone, Copy)]
pub struct KickParams<'a> {
    /// Reference curvature times length, horizontal plane
    pub hxl: f64,
    /// Reference curvature times length, vertical plane
    pub hyl: f64,
    /// Signed length of the kicked region [m]; negative when backtracking
    pub length: f64,
    /// Multiplier applied to every integrated strength
    pub weight: f64,
    /// Secondary tap of higher-order terms; `None` when unused
    pub secondary: Option<MultipoleTerms<'a>>,
    pub terms: MultipoleTerms<'a>,
    /// +1 forward, -1 backtracking
    pub backtrack_sign: f64,
    pub delta_taper: f64,
    /// 0 off, 1 mean loss, 2 quantum; any other value is treated as off
    pub radiation_flag: i64,
}

/// Entry/exit momentum changes reported by one kick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KickScratch {
    pub dp_entry: f64,
    pub dpx_entry: f64,
    pub dpy_entry: f64,
    pub dp_exit: f64,
    pub dpx_exit: f64,
    pub dpy_exit: f64,
}

/// Contract of the per-particle multipole push.
pub trait MultipoleKick: Sync {
    /// Apply the kick to one active particle, in place.
    fn track_single_particle(
        &self,
        particle: &mut Particle,
        reference: &ReferenceParticle,
        params: &KickParams<'_>,
        scratch: &mut KickScratch,
        record: Option<&dyn RadiationRecordSink>,
    );
}

/// The in-tree thin multipole implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThinMultipole;

impl MultipoleKick for ThinMultipole {
    fn track_single_particle(
        &self,
        particle: &mut Particle,
        reference: &ReferenceParticle,
        params: &KickParams<'_>,
        scratch: &mut KickScratch,
        record: Option<&dyn RadiationRecordSink>,
    ) {
        multipole_track_single_particle(particle, reference, params, scratch, record);
    }
}

/// Horner evaluation of `Σ (knl_n + i ksl_n) / n! (x + i y)^n`.
///
/// Strengths missing from `knl` / `ksl` count as zero, so `order` may
/// exceed the arrays. Returns `(dpx, dpy)` before the `-chi` / `+chi` sign
/// convention.
pub fn multipole_field_sum(terms: &MultipoleTerms<'_>, x: f64, y: f64) -> (f64, f64) {
    let strength = |values: &[f64], n: usize| values.get(n).copied().unwrap_or(0.0);
    let mut index = terms.order;
    let mut inv_factorial = 1.0 / factorial(index);
    let mut re = strength(terms.knl, index) * inv_factorial;
    let mut im = strength(terms.ksl, index) * inv_factorial;
    while index > 0 {
        let zre = re * x - im * y;
        let zim = re * y + im * x;
        inv_factorial *= index as f64;
        index -= 1;
        re = strength(terms.knl, index) * inv_factorial + zre;
        im = strength(terms.ksl, index) * inv_factorial + zim;
    }
    (re, im)
}

fn factorial(n: usize) -> f64 {
    (1..=n).fold(1.0, |acc, k| acc * k as f64)
}

/// Transverse kick of the multipole field, including weight, taper and chi.
fn field_kick(particle: &Particle, params: &KickParams<'_>) -> (f64, f64) {
    let scale = particle.chi * params.weight * (1.0 + params.delta_taper);
    let (mut re, mut im) = multipole_field_sum(&params.terms, particle.x, particle.y);
    if let Some(secondary) = params.secondary.as_ref() {
        let (re2, im2) = multipole_field_sum(secondary, particle.x, particle.y);
        re += re2;
        im += im2;
    }
    (-scale * re, scale * im)
}

fn radiation_half(
    particle: &mut Particle,
    reference: &ReferenceParticle,
    params: &KickParams<'_>,
    curvature: f64,
) -> RadiationDelta {
    let path = 0.5 * params.length.abs()
        * (1.0 + (params.hxl * particle.x - params.hyl * particle.y) / params.length);
    match params.radiation_flag {
        1 => synrad_average_kick(particle, reference, curvature, path, params.backtrack_sign),
        // Quantum excitation cannot be time-reversed; backtracking undoes the mean loss.
        2 if params.backtrack_sign < 0.0 => {
            synrad_average_kick(particle, reference, curvature, path, params.backtrack_sign)
        }
        2 => synrad_emit_photons(particle, reference, curvature, path),
        _ => RadiationDelta::default(),
    }
}

/// Apply a thin multipole kick to one particle.
///
/// When `radiation_flag == 2` and a record sink is given, exactly one entry
/// is written for this particle, unless the sink is full.
pub fn multipole_track_single_particle(
    particle: &mut Particle,
    reference: &ReferenceParticle,
    params: &KickParams<'_>,
    scratch: &mut KickScratch,
    record: Option<&dyn RadiationRecordSink>,
) {
    let radiating = matches!(params.radiation_flag, 1 | 2) && params.length != 0.0;

    let mut entry = RadiationDelta::default();
    if radiating {
        let (dpx, dpy) = field_kick(particle, params);
        let curvature = (dpx * dpx + dpy * dpy).sqrt() / params.length.abs();
        entry = radiation_half(particle, reference, params, curvature);
        scratch.dp_entry = entry.dp;
        scratch.dpx_entry = entry.dpx;
        scratch.dpy_entry = entry.dpy;
    }

    let (mut dpx, mut dpy) = field_kick(particle, params);
    let curvature = if radiating {
        (dpx * dpx + dpy * dpy).sqrt() / params.length.abs()
    } else {
        0.0
    };

    if params.hxl != 0.0 || params.hyl != 0.0 {
        let w = params.weight;
        let delta = particle.delta;
        dpx += w * (params.hxl + params.hxl * delta);
        dpy -= w * (params.hyl + params.hyl * delta);
        if params.length != 0.0 {
            let b1l = particle.chi * w * params.terms.knl.first().copied().unwrap_or(0.0);
            let a1l = particle.chi * w * params.terms.ksl.first().copied().unwrap_or(0.0);
            dpx -= b1l * params.hxl / params.length * particle.x;
            dpy += a1l * params.hyl / params.length * particle.y;
        }
        particle.zeta -= w * particle.rvv * (params.hxl * particle.x - params.hyl * particle.y);
    }

    particle.px += dpx;
    particle.py += dpy;

    let mut exit = RadiationDelta::default();
    if radiating {
        exit = radiation_half(particle, reference, params, curvature);
        scratch.dp_exit = exit.dp;
        scratch.dpx_exit = exit.dpx;
        scratch.dpy_exit = exit.dpy;
    }

    if params.radiation_flag == 2 {
        if let Some(sink) = record {
            if let Some(slot) = sink.reserve_slot() {
                sink.write(
                    slot,
                    RadiationRecordEntry {
                        particle_id: particle.particle_id,
                        at_element: particle.at_element,
                        at_turn: particle.at_turn,
                        n_photons: entry.n_photons + exit.n_photons,
                        photon_energy_ev: entry.photon_energy_ev + exit.photon_energy_ev,
                        dp_entry: scratch.dp_entry,
                        dpx_entry: scratch.dpx_entry,
                        dpy_entry: scratch.dpy_entry,
                        dp_exit: scratch.dp_exit,
                        dpx_exit: scratch.dpx_exit,
                        dpy_exit: scratch.dpy_exit,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use thinkick_types::constants::{ELECTRON_MASS_EV, PROTON_MASS_EV};

    struct VecSink {
        capacity: usize,
        entries: Mutex<Vec<RadiationRecordEntry>>,
    }

    impl RadiationRecordSink for VecSink {
        fn reserve_slot(&self) -> Option<usize> {
            let entries = self.entries.lock().ok()?;
            (entries.len() < self.capacity).then_some(entries.len())
        }

        fn write(&self, _slot: usize, entry: RadiationRecordEntry) {
            if let Ok(mut entries) = self.entries.lock() {
                entries.push(entry);
            }
        }
    }

    fn params<'a>(knl: &'a [f64], ksl: &'a [f64], order: usize) -> KickParams<'a> {
        KickParams {
            hxl: 0.0,
            hyl: 0.0,
            length: 1.0,
            weight: 1.0,
            secondary: None,
            terms: MultipoleTerms { knl, ksl, order },
            backtrack_sign: 1.0,
            delta_taper: 0.0,
            radiation_flag: 0,
        }
    }

    fn particle(x: f64, y: f64, reference: &ReferenceParticle) -> Particle {
        Particle::new([x, 0.0, y, 0.0, 0.0, 0.0], 0, reference.beta0())
    }

    fn proton_ref() -> ReferenceParticle {
        ReferenceParticle::new(PROTON_MASS_EV, 1.0, 10e9).unwrap()
    }

    #[test]
    fn test_normal_quadrupole_focuses_x_defocuses_y() {
        let r = proton_ref();
        let knl = [0.0, 0.2];
        let ksl = [0.0, 0.0];
        let mut p = particle(1e-3, 2e-3, &r);
        let mut scratch = KickScratch::default();
        multipole_track_single_particle(&mut p, &r, &params(&knl, &ksl, 1), &mut scratch, None);
        assert!((p.px + 0.2 * 1e-3).abs() < 1e-18);
        assert!((p.py - 0.2 * 2e-3).abs() < 1e-18);
        assert_eq!(p.x, 1e-3);
        assert_eq!(scratch, KickScratch::default());
    }

    #[test]
    fn test_skew_quadrupole_couples_planes() {
        let r = proton_ref();
        let knl = [0.0, 0.0];
        let ksl = [0.0, 0.5];
        let mut p = particle(1e-3, 0.0, &r);
        let mut scratch = KickScratch::default();
        multipole_track_single_particle(&mut p, &r, &params(&knl, &ksl, 1), &mut scratch, None);
        assert!(p.px.abs() < 1e-18);
        assert!((p.py - 0.5 * 1e-3).abs() < 1e-18);
    }

    #[test]
    fn test_weight_and_taper_scale_kick() {
        let r = proton_ref();
        let knl = [0.0, 0.2];
        let ksl = [0.0, 0.0];
        let mut kp = params(&knl, &ksl, 1);
        kp.weight = 0.25;
        kp.delta_taper = 0.01;
        let mut p = particle(1e-3, 0.0, &r);
        multipole_track_single_particle(&mut p, &r, &kp, &mut KickScratch::default(), None);
        let expected = -0.25 * 1.01 * 0.2 * 1e-3;
        assert!((p.px - expected).abs() < 1e-18);
    }

    #[test]
    fn test_horner_matches_direct_sextupole() {
        let knl = [0.0, 0.0, 3.0];
        let ksl = [0.0, 0.0, 0.0];
        let terms = MultipoleTerms {
            knl: &knl,
            ksl: &ksl,
            order: 2,
        };
        let (x, y) = (2e-3, 1e-3);
        let (re, im) = multipole_field_sum(&terms, x, y);
        // k2/2 * (x + iy)^2
        assert!((re - 1.5 * (x * x - y * y)).abs() < 1e-15);
        assert!((im - 1.5 * (2.0 * x * y)).abs() < 1e-15);
    }

    #[test]
    fn test_secondary_terms_add_up() {
        let r = proton_ref();
        let knl = [0.0, 0.2];
        let ksl = [0.0, 0.0];
        let knl2 = [0.0, 0.1];
        let mut kp = params(&knl, &ksl, 1);
        kp.secondary = Some(MultipoleTerms {
            knl: &knl2,
            ksl: &ksl,
            order: 1,
        });
        let mut p = particle(1e-3, 0.0, &r);
        multipole_track_single_particle(&mut p, &r, &kp, &mut KickScratch::default(), None);
        assert!((p.px + 0.3 * 1e-3).abs() < 1e-18);
    }

    #[test]
    fn test_curvature_cancels_dipole_for_reference_orbit() {
        let r = proton_ref();
        let knl = [0.01];
        let ksl = [0.0];
        let mut kp = params(&knl, &ksl, 0);
        kp.hxl = 0.01;
        let mut p = particle(0.0, 0.0, &r);
        multipole_track_single_particle(&mut p, &r, &kp, &mut KickScratch::default(), None);
        assert!(p.px.abs() < 1e-18);
        assert_eq!(p.zeta, 0.0);
    }

    #[test]
    fn test_negative_length_reverses_kick() {
        let r = proton_ref();
        let knl_fwd = [0.0, 0.2];
        let knl_back = [0.0, -0.2];
        let ksl = [0.0, 0.0];
        let mut p = particle(1e-3, -1e-3, &r);
        let original = p.clone();
        let fwd = params(&knl_fwd, &ksl, 1);
        let mut back = params(&knl_back, &ksl, 1);
        back.length = -1.0;
        back.backtrack_sign = -1.0;
        multipole_track_single_particle(&mut p, &r, &fwd, &mut KickScratch::default(), None);
        multipole_track_single_particle(&mut p, &r, &back, &mut KickScratch::default(), None);
        assert!((p.px - original.px).abs() < 1e-18);
        assert!((p.py - original.py).abs() < 1e-18);
    }

    #[test]
    fn test_mean_radiation_fills_scratch() {
        let r = ReferenceParticle::new(ELECTRON_MASS_EV, -1.0, 5e9).unwrap();
        let knl = [0.0, 5.0];
        let ksl = [0.0, 0.0];
        let mut kp = params(&knl, &ksl, 1);
        kp.radiation_flag = 1;
        let mut p = particle(1e-2, 0.0, &r);
        let mut scratch = KickScratch::default();
        multipole_track_single_particle(&mut p, &r, &kp, &mut scratch, None);
        assert!(scratch.dp_entry < 0.0);
        assert!(scratch.dp_exit < 0.0);
        assert!(p.delta < 0.0);
        assert!((p.delta - (scratch.dp_entry + scratch.dp_exit)).abs() < 1e-15);
    }

    #[test]
    fn test_quantum_radiation_writes_one_entry() {
        let r = ReferenceParticle::new(ELECTRON_MASS_EV, -1.0, 5e9).unwrap();
        let knl = [0.0, 5.0];
        let ksl = [0.0, 0.0];
        let mut kp = params(&knl, &ksl, 1);
        kp.radiation_flag = 2;
        let sink = VecSink {
            capacity: 10,
            entries: Mutex::new(Vec::new()),
        };
        let mut p = particle(1e-2, 0.0, &r);
        p.particle_id = 7;
        multipole_track_single_particle(
            &mut p,
            &r,
            &kp,
            &mut KickScratch::default(),
            Some(&sink),
        );
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].particle_id, 7);
        assert!(entries[0].photon_energy_ev >= 0.0);
    }

    #[test]
    fn test_short_or_empty_strengths_read_as_zero() {
        let knl = [0.0, 0.2];
        let ksl: [f64; 0] = [];
        let terms = MultipoleTerms {
            knl: &knl,
            ksl: &ksl,
            order: 4,
        };
        let (re, im) = multipole_field_sum(&terms, 1e-3, 0.0);
        assert!((re - 0.2 * 1e-3).abs() < 1e-18);
        assert_eq!(im, 0.0);

        let r = proton_ref();
        let empty: [f64; 0] = [];
        let mut kp = params(&empty, &empty, 0);
        kp.hxl = 0.01;
        let mut p = particle(1e-3, 0.0, &r);
        multipole_track_single_particle(&mut p, &r, &kp, &mut KickScratch::default(), None);
        // only the curvature term remains
        assert!((p.px - 0.01).abs() < 1e-15);
    }

    #[test]
    fn test_unknown_radiation_flag_is_inert() {
        let r = ReferenceParticle::new(ELECTRON_MASS_EV, -1.0, 5e9).unwrap();
        let knl = [0.0, 5.0];
        let ksl = [0.0, 0.0];
        let mut kp = params(&knl, &ksl, 1);
        let mut plain = particle(1e-2, 0.0, &r);
        multipole_track_single_particle(&mut plain, &r, &kp, &mut KickScratch::default(), None);

        kp.radiation_flag = 3;
        let mut odd = particle(1e-2, 0.0, &r);
        let mut scratch = KickScratch::default();
        multipole_track_single_particle(&mut odd, &r, &kp, &mut scratch, None);
        assert_eq!(odd, plain);
        assert_eq!(scratch, KickScratch::default());
    }

    #[test]
    fn test_mean_radiation_never_records() {
        let r = ReferenceParticle::new(ELECTRON_MASS_EV, -1.0, 5e9).unwrap();
        let knl = [0.0, 5.0];
        let ksl = [0.0, 0.0];
        let mut kp = params(&knl, &ksl, 1);
        kp.radiation_flag = 1;
        let sink = VecSink {
            capacity: 10,
            entries: Mutex::new(Vec::new()),
        };
        let mut p = particle(1e-2, 0.0, &r);
        multipole_track_single_particle(
            &mut p,
            &r,
            &kp,
            &mut KickScratch::default(),
            Some(&sink),
        );
        assert!(sink.entries.lock().unwrap().is_empty());
    }
}
