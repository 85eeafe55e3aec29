//! Element-by-element tracking over a line of drifts and thin slices.

use std::sync::Arc;

use log::{debug, info};
use rayon::prelude::*;
use thinkick_physics::drift::drift_particles;
use thinkick_types::config::{RadiationSupport, TrackDirection, TrackingConfig};
use thinkick_types::error::{TrackError, TrackResult};
use thinkick_types::state::{Particle, ParticleSet};

use crate::dispatcher::track_thin_slice_quadrupole;
use crate::element::{Element, Quadrupole};
use crate::monitor::ParticlesMonitor;
use crate::record::SynchrotronRadiationRecord;
use crate::slicing::{slice_quadrupole, SlicingStrategy};

/// State code of particles lost on the global aperture.
pub const LOST_ON_GLOBAL_APERTURE: i64 = 0;

const DRIFT_CHUNK: usize = 1024;

/// How far a forward call tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSpan {
    /// Whole turns, the first one starting at `ele_start`.
    Turns(usize),
    /// A fixed number of elements, wrapping into new turns past the line end.
    Elements(usize),
}

/// Options of [`Tracker::track_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackOptions {
    /// Index of the first element to track.
    pub ele_start: usize,
    pub span: TrackSpan,
    /// Snapshot the particles at the start of every turn.
    pub turn_by_turn_monitor: bool,
    /// Keep `zeta` and `delta` fixed: radiation is switched off and drifts
    /// leave `zeta` unchanged.
    pub freeze_longitudinal: bool,
}

impl TrackOptions {
    pub fn turns(num_turns: usize) -> Self {
        TrackOptions {
            ele_start: 0,
            span: TrackSpan::Turns(num_turns),
            turn_by_turn_monitor: false,
            freeze_longitudinal: false,
        }
    }

    pub fn elements(ele_start: usize, num_elements: usize) -> Self {
        TrackOptions {
            ele_start,
            span: TrackSpan::Elements(num_elements),
            ..TrackOptions::turns(0)
        }
    }

    pub fn with_monitor(self) -> Self {
        TrackOptions {
            turn_by_turn_monitor: true,
            ..self
        }
    }

    pub fn with_frozen_longitudinal(self) -> Self {
        TrackOptions {
            freeze_longitudinal: true,
            ..self
        }
    }

    fn is_whole_turns(&self) -> bool {
        self.ele_start == 0
            && matches!(self.span, TrackSpan::Turns(_))
            && !self.turn_by_turn_monitor
            && !self.freeze_longitudinal
    }
}

/// A forward call split into a head segment, whole turns and a tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SegmentPlan {
    ele_start: usize,
    first: usize,
    first_ends_turn: bool,
    middle_turns: usize,
    last: usize,
}

impl SegmentPlan {
    fn new(num_elements: usize, options: &TrackOptions) -> TrackResult<Self> {
        let n = num_elements;
        let ele_start = options.ele_start;
        if ele_start > 0 && ele_start >= n {
            return Err(TrackError::ConfigError(format!(
                "ele_start ({ele_start}) is past the end of a {n}-element line"
            )));
        }
        let plan = SegmentPlan {
            ele_start,
            first: 0,
            first_ends_turn: false,
            middle_turns: 0,
            last: 0,
        };
        match options.span {
            TrackSpan::Turns(0) | TrackSpan::Elements(0) => Ok(plan),
            TrackSpan::Turns(turns) => Ok(SegmentPlan {
                first: n - ele_start,
                first_ends_turn: true,
                middle_turns: turns - 1,
                ..plan
            }),
            TrackSpan::Elements(_) if n == 0 => Err(TrackError::ConfigError(
                "cannot track a number of elements on an empty line".to_string(),
            )),
            TrackSpan::Elements(count) if ele_start + count <= n => Ok(SegmentPlan {
                first: count,
                first_ends_turn: ele_start + count == n,
                ..plan
            }),
            TrackSpan::Elements(count) => {
                let end = ele_start + count;
                Ok(SegmentPlan {
                    first: n - ele_start,
                    first_ends_turn: true,
                    middle_turns: end / n - 1,
                    last: end % n,
                    ..plan
                })
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.first == 0 && !self.first_ends_turn
    }

    /// Turns touched by the call, i.e. snapshots a monitor takes.
    fn num_turns(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            1 + self.middle_turns + usize::from(self.last > 0)
        }
    }

    /// `(first element, element count, ends turn)` per segment.
    fn segments(&self, num_elements: usize) -> impl Iterator<Item = (usize, usize, bool)> {
        let head = (!self.is_empty()).then_some((self.ele_start, self.first, self.first_ends_turn));
        head.into_iter()
            .chain(std::iter::repeat((0, num_elements, true)).take(self.middle_turns))
            .chain((self.last > 0).then_some((0, self.last, false)))
    }
}

/// Ordered sequence of elements.
#[derive(Debug, Clone, Default)]
pub struct Line {
    pub elements: Vec<Element>,
}

impl Line {
    pub fn new(elements: Vec<Element>) -> Self {
        Line { elements }
    }

    /// Line made of one sliced quadrupole.
    pub fn from_quadrupole(
        parent: &Arc<Quadrupole>,
        strategy: SlicingStrategy,
    ) -> TrackResult<Self> {
        Ok(Line::new(slice_quadrupole(parent, strategy)?))
    }

    /// Total path length [m].
    pub fn length(&self) -> f64 {
        self.elements.iter().map(Element::length).sum()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn num_quantum_slices(&self) -> usize {
        self.elements
            .iter()
            .filter(|e| matches!(e, Element::ThinSliceQuadrupole(s) if s.radiation_flag() == 2))
            .count()
    }
}

pub struct Tracker {
    line: Line,
    config: TrackingConfig,
    record: Option<Arc<SynchrotronRadiationRecord>>,
}

impl Tracker {
    pub fn new(line: Line, config: TrackingConfig) -> TrackResult<Self> {
        config.validate()?;
        Ok(Tracker {
            line,
            config,
            record: None,
        })
    }

    pub fn line(&self) -> &Line {
        &self.line
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// False when a slice would emit quantum radiation, which has no
    /// time-reversed counterpart.
    pub fn is_backtrackable(&self) -> bool {
        !self.config.radiation_enabled() || self.line.num_quantum_slices() == 0
    }

    /// Attach a fresh record of `capacity` entries to every thin slice.
    ///
    /// A record already attached is replaced.
    pub fn start_internal_logging(&mut self, capacity: usize) -> Arc<SynchrotronRadiationRecord> {
        let record = Arc::new(SynchrotronRadiationRecord::new(capacity));
        let mut attached = 0usize;
        for element in self.line.elements.iter_mut() {
            if let Element::ThinSliceQuadrupole(slice) = element {
                slice.attach_record(Arc::clone(&record));
                attached += 1;
            }
        }
        info!("internal logging started on {attached} slices, capacity {capacity}");
        self.record = Some(Arc::clone(&record));
        record
    }

    /// Detach the record from every slice and hand it back.
    ///
    /// Entries already written are kept.
    pub fn stop_internal_logging(&mut self) -> Option<Arc<SynchrotronRadiationRecord>> {
        for element in self.line.elements.iter_mut() {
            if let Element::ThinSliceQuadrupole(slice) = element {
                slice.detach_record();
            }
        }
        let record = self.record.take();
        if let Some(r) = record.as_ref() {
            info!("internal logging stopped, {} entries recorded", r.num_recorded());
        }
        record
    }

    /// Track `num_turns` turns in the configured direction.
    pub fn track(&self, particles: &mut ParticleSet, num_turns: usize) -> TrackResult<()> {
        self.track_with(particles, &TrackOptions::turns(num_turns))
            .map(|_| ())
    }

    /// Track with partial-line, monitor and freezing options.
    ///
    /// Returns the turn-by-turn monitor when one was requested. Backtracking
    /// configurations accept whole turns from element 0 only.
    pub fn track_with(
        &self,
        particles: &mut ParticleSet,
        options: &TrackOptions,
    ) -> TrackResult<Option<ParticlesMonitor>> {
        if self.config.is_backtrack() {
            if !self.is_backtrackable() {
                return Err(not_backtrackable(&self.line));
            }
            return match options.span {
                TrackSpan::Turns(num_turns) if options.is_whole_turns() => {
                    self.run_backtrack(particles, num_turns, &self.config);
                    Ok(None)
                }
                _ => Err(TrackError::ConfigError(
                    "backtracking supports whole turns from element 0 only".to_string(),
                )),
            };
        }

        let plan = SegmentPlan::new(self.line.len(), options)?;
        let config = if options.freeze_longitudinal {
            TrackingConfig {
                radiation: RadiationSupport::Disabled,
                ..self.config.clone()
            }
        } else {
            self.config.clone()
        };
        let frozen_zeta: Option<Vec<f64>> = options
            .freeze_longitudinal
            .then(|| particles.particles.iter().map(|p| p.zeta).collect());

        let mut monitor = if options.turn_by_turn_monitor {
            let start_at_turn = particles
                .particles
                .iter()
                .filter(|p| p.is_active())
                .map(|p| p.at_turn)
                .min()
                .unwrap_or(0);
            let num_particles = particles
                .particles
                .iter()
                .map(|p| p.particle_id + 1)
                .max()
                .unwrap_or(0);
            Some(ParticlesMonitor::new(
                start_at_turn,
                start_at_turn + plan.num_turns() as i64,
                num_particles,
            )?)
        } else {
            None
        };

        debug!(
            "tracking {} active particles from element {}, {:?}",
            particles.num_active(),
            options.ele_start,
            options.span
        );
        let ele_start = options.ele_start as i64;
        for_each_active(particles, |p| p.at_element = ele_start);
        for (from, count, ends_turn) in plan.segments(self.line.len()) {
            if particles.num_active() == 0 {
                debug!("all particles lost");
                break;
            }
            if let Some(m) = monitor.as_mut() {
                m.observe(particles);
            }
            self.track_segment(
                particles,
                (from, count, ends_turn),
                &config,
                frozen_zeta.as_deref(),
            );
        }
        Ok(monitor)
    }

    /// Track `num_turns` turns backwards.
    ///
    /// Lines with quantum-radiation slices are refused unless `force` is set,
    /// in which case those slices undo the mean loss only.
    pub fn track_backtrack(
        &self,
        particles: &mut ParticleSet,
        num_turns: usize,
        force: bool,
    ) -> TrackResult<()> {
        if !force && !self.is_backtrackable() {
            return Err(not_backtrackable(&self.line));
        }
        let config = self.config.with_direction(TrackDirection::Backtrack);
        self.run_backtrack(particles, num_turns, &config);
        Ok(())
    }

    fn run_backtrack(&self, particles: &mut ParticleSet, num_turns: usize, config: &TrackingConfig) {
        debug!(
            "backtracking {} active particles, {} elements, {num_turns} turns",
            particles.num_active(),
            self.line.len()
        );
        for _ in 0..num_turns {
            self.backtrack_turn(particles, config);
            if particles.num_active() == 0 {
                debug!("all particles lost");
                break;
            }
        }
    }

    fn track_segment(
        &self,
        particles: &mut ParticleSet,
        (from, count, ends_turn): (usize, usize, bool),
        config: &TrackingConfig,
        frozen_zeta: Option<&[f64]>,
    ) {
        for element in self.line.elements.iter().skip(from).take(count) {
            self.track_element(element, particles, config, frozen_zeta);
            for_each_active(particles, |p| p.at_element += 1);
        }
        if !ends_turn {
            return;
        }
        let reset_s = config.reset_s_at_end_turn;
        for_each_active(particles, |p| {
            p.at_turn += 1;
            p.at_element = 0;
            if reset_s {
                p.s = 0.0;
            }
        });
    }

    fn backtrack_turn(&self, particles: &mut ParticleSet, config: &TrackingConfig) {
        let last = self.line.len() as i64 - 1;
        let line_length = self.line.length();
        let reset_s = config.reset_s_at_end_turn;
        for_each_active(particles, |p| {
            p.at_turn -= 1;
            p.at_element = last;
            if reset_s {
                p.s = line_length;
            }
        });
        for element in self.line.elements.iter().rev() {
            self.track_element(element, particles, config, None);
            for_each_active(particles, |p| p.at_element -= 1);
        }
        for_each_active(particles, |p| p.at_element = 0);
    }

    fn track_element(
        &self,
        element: &Element,
        particles: &mut ParticleSet,
        config: &TrackingConfig,
        frozen_zeta: Option<&[f64]>,
    ) {
        match element {
            Element::Drift(drift) => {
                if let Some(limit) = config.global_xy_limit {
                    for_each_active(particles, |p| global_aperture_check(p, limit));
                }
                let length = config.direction.sign() * drift.length;
                if config.parallel {
                    particles
                        .particles
                        .par_chunks_mut(DRIFT_CHUNK)
                        .for_each(|chunk| drift_particles(chunk, length));
                } else {
                    drift_particles(&mut particles.particles, length);
                }
                if let Some(zeta) = frozen_zeta {
                    for (p, z) in particles.particles.iter_mut().zip(zeta) {
                        p.zeta = *z;
                    }
                }
            }
            Element::ThinSliceQuadrupole(slice) => {
                track_thin_slice_quadrupole(slice, particles, config);
            }
        }
    }
}

fn for_each_active<F: FnMut(&mut Particle)>(particles: &mut ParticleSet, f: F) {
    particles
        .particles
        .iter_mut()
        .filter(|p| p.is_active())
        .for_each(f);
}

/// Mark the particle lost when it leaves the `|x|, |y| < limit` box.
fn global_aperture_check(particle: &mut Particle, limit: f64) {
    let inside = particle.x.abs() < limit && particle.y.abs() < limit;
    if !inside {
        particle.mark_lost(LOST_ON_GLOBAL_APERTURE);
    }
}

fn not_backtrackable(line: &Line) -> TrackError {
    TrackError::NotBacktrackable(format!(
        "line has {} slices with radiation_flag 2",
        line.num_quantum_slices()
    ))
}
