//! Turn-by-turn particle monitor.
//!
//! Stores the phase-space coordinates of every observed particle once per
//! turn, for turns in `start_at_turn..stop_at_turn`. Rows are indexed by
//! `particle_id`, columns by `at_turn - start_at_turn`.

use ndarray::{s, Array2, Array3, ArrayView2};
use thinkick_types::error::{TrackError, TrackResult};
use thinkick_types::state::{ParticleSet, N_COORDS};

#[derive(Debug, Clone, PartialEq)]
pub struct ParticlesMonitor {
    start_at_turn: i64,
    stop_at_turn: i64,
    /// `[particle, turn, coordinate]`
    coords: Array3<f64>,
    /// `[particle, turn]`
    s: Array2<f64>,
    /// `[particle, turn]`, 0 where nothing was recorded
    state: Array2<i64>,
}

impl ParticlesMonitor {
    pub fn new(start_at_turn: i64, stop_at_turn: i64, num_particles: usize) -> TrackResult<Self> {
        if stop_at_turn < start_at_turn {
            return Err(TrackError::ConfigError(format!(
                "monitor stop_at_turn ({stop_at_turn}) must be >= start_at_turn ({start_at_turn})"
            )));
        }
        let num_turns = (stop_at_turn - start_at_turn) as usize;
        Ok(ParticlesMonitor {
            start_at_turn,
            stop_at_turn,
            coords: Array3::zeros((num_particles, num_turns, N_COORDS)),
            s: Array2::zeros((num_particles, num_turns)),
            state: Array2::zeros((num_particles, num_turns)),
        })
    }

    pub fn start_at_turn(&self) -> i64 {
        self.start_at_turn
    }

    pub fn stop_at_turn(&self) -> i64 {
        self.stop_at_turn
    }

    pub fn num_turns(&self) -> usize {
        self.state.ncols()
    }

    pub fn num_particles(&self) -> usize {
        self.state.nrows()
    }

    /// Snapshot every active particle whose turn falls in the window.
    ///
    /// Particles with an id outside the monitor are ignored.
    pub fn observe(&mut self, particles: &ParticleSet) {
        for p in particles.particles.iter().filter(|p| p.is_active()) {
            if p.at_turn < self.start_at_turn || p.at_turn >= self.stop_at_turn {
                continue;
            }
            let turn = (p.at_turn - self.start_at_turn) as usize;
            let id = p.particle_id;
            if id >= self.num_particles() {
                continue;
            }
            for (j, v) in p.coords().iter().enumerate() {
                self.coords[[id, turn, j]] = *v;
            }
            self.s[[id, turn]] = p.s;
            self.state[[id, turn]] = p.state;
        }
    }

    /// `[num_turns, 6]` history of one particle.
    pub fn particle_history(&self, particle_id: usize) -> Option<ArrayView2<'_, f64>> {
        (particle_id < self.num_particles()).then(|| self.coords.slice(s![particle_id, .., ..]))
    }

    /// `[num_particles, 6]` snapshot of one absolute turn.
    pub fn turn_snapshot(&self, at_turn: i64) -> Option<ArrayView2<'_, f64>> {
        if at_turn < self.start_at_turn || at_turn >= self.stop_at_turn {
            return None;
        }
        let turn = (at_turn - self.start_at_turn) as usize;
        Some(self.coords.slice(s![.., turn, ..]))
    }

    pub fn s(&self) -> &Array2<f64> {
        &self.s
    }

    pub fn state(&self) -> &Array2<i64> {
        &self.state
    }

    /// Whether `particle_id` was seen alive at `at_turn`.
    pub fn was_recorded(&self, particle_id: usize, at_turn: i64) -> bool {
        if at_turn < self.start_at_turn || at_turn >= self.stop_at_turn {
            return false;
        }
        let turn = (at_turn - self.start_at_turn) as usize;
        self.state
            .get([particle_id, turn])
            .is_some_and(|&state| state > 0)
    }
}
