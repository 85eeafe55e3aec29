//! Thin-slice decomposition of a thick quadrupole.
//!
//! A quadrupole of length `L` sliced `n` times becomes
//! `drift, kick, drift, ..., kick, drift`: `n` thin kicks of weight `1/n`
//! and `n + 1` drifts whose lengths add up to `L`.

use std::sync::Arc;

use thinkick_types::error::{TrackError, TrackResult};

use crate::element::{Drift, Element, Quadrupole, ThinSliceQuadrupole};

/// Placement of the thin kicks inside the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlicingStrategy {
    /// Kicks at the centres of `n` equal sub-elements.
    Uniform(usize),
    /// TEAPOT placement: end drifts of `L / (2(n + 1))`, interior
    /// drifts of `L n / (n^2 - 1)`.
    Teapot(usize),
}

impl SlicingStrategy {
    pub fn num_slices(&self) -> usize {
        match *self {
            SlicingStrategy::Uniform(n) | SlicingStrategy::Teapot(n) => n,
        }
    }

    fn validate(&self) -> TrackResult<()> {
        if self.num_slices() == 0 {
            return Err(TrackError::InvalidSlice(
                "slicing needs at least one slice".to_string(),
            ));
        }
        Ok(())
    }

    /// Strength weight of every thin kick.
    pub fn weights(&self) -> TrackResult<Vec<f64>> {
        self.validate()?;
        let n = self.num_slices();
        Ok(vec![1.0 / n as f64; n])
    }

    /// Drift lengths as fractions of the parent length, `n + 1` entries.
    pub fn drift_fractions(&self) -> TrackResult<Vec<f64>> {
        self.validate()?;
        let n = self.num_slices();
        let nf = n as f64;
        let (end, interior) = match *self {
            SlicingStrategy::Uniform(_) => (0.5 / nf, 1.0 / nf),
            SlicingStrategy::Teapot(1) => (0.5, 0.0),
            SlicingStrategy::Teapot(_) => (0.5 / (nf + 1.0), nf / (nf * nf - 1.0)),
        };
        let mut fractions = vec![interior; n + 1];
        fractions[0] = end;
        fractions[n] = end;
        Ok(fractions)
    }
}

/// Split `parent` into drifts and thin kicks.
///
/// Every slice shares the parent handle and starts with its radiation
/// settings.
pub fn slice_quadrupole(
    parent: &Arc<Quadrupole>,
    strategy: SlicingStrategy,
) -> TrackResult<Vec<Element>> {
    let weights = strategy.weights()?;
    let drifts = strategy.drift_fractions()?;

    let mut elements = Vec::with_capacity(weights.len() + drifts.len());
    for (i, fraction) in drifts.iter().enumerate() {
        elements.push(Element::Drift(Drift::new(fraction * parent.length)?));
        if let Some(&weight) = weights.get(i) {
            elements.push(Element::ThinSliceQuadrupole(ThinSliceQuadrupole::new(
                Arc::clone(parent),
                weight,
            )?));
        }
    }
    Ok(elements)
}
