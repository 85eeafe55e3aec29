//! Beam elements understood by the thin-slice tracker.

use std::sync::Arc;

use ndarray::Array2;
use thinkick_types::error::{TrackError, TrackResult};

use crate::record::SynchrotronRadiationRecord;

/// Thick quadrupole that thin slices draw their gradients from.
#[derive(Debug, Clone, PartialEq)]
pub struct Quadrupole {
    /// Magnetic length [m]
    pub length: f64,
    /// Normal gradient [1/m^2]
    pub k1: f64,
    /// Skew gradient [1/m^2]
    pub k1s: f64,
    pub radiation_flag: i64,
    pub delta_taper: f64,
}

impl Quadrupole {
    pub fn new(length: f64, k1: f64, k1s: f64) -> TrackResult<Self> {
        if !length.is_finite() || length <= 0.0 {
            return Err(TrackError::InvalidSlice(format!(
                "quadrupole length must be finite and > 0, got {length}"
            )));
        }
        if !k1.is_finite() || !k1s.is_finite() {
            return Err(TrackError::InvalidSlice(
                "quadrupole gradients must be finite".to_string(),
            ));
        }
        Ok(Quadrupole {
            length,
            k1,
            k1s,
            radiation_flag: 0,
            delta_taper: 0.0,
        })
    }

    pub fn with_radiation_flag(mut self, flag: i64) -> TrackResult<Self> {
        check_radiation_flag(flag)?;
        self.radiation_flag = flag;
        Ok(self)
    }

    pub fn with_delta_taper(mut self, delta_taper: f64) -> TrackResult<Self> {
        check_delta_taper(delta_taper)?;
        self.delta_taper = delta_taper;
        Ok(self)
    }

    /// Integrated normal gradient k1 * L.
    pub fn integrated_k1(&self) -> f64 {
        self.k1 * self.length
    }

    /// Linear 4×4 transfer matrix on (x, px, y, py) for the on-momentum particle.
    ///
    /// Only upright quadrupoles are supported.
    pub fn transfer_matrix(&self) -> TrackResult<Array2<f64>> {
        if self.k1s != 0.0 {
            return Err(TrackError::InvalidSlice(
                "transfer matrix requires k1s == 0".to_string(),
            ));
        }
        let mut m = Array2::zeros((4, 4));
        let (mx, my) = (
            plane_matrix(self.k1, self.length),
            plane_matrix(-self.k1, self.length),
        );
        for i in 0..2 {
            for j in 0..2 {
                m[[i, j]] = mx[i][j];
                m[[i + 2, j + 2]] = my[i][j];
            }
        }
        Ok(m)
    }
}

fn check_radiation_flag(flag: i64) -> TrackResult<()> {
    if !(0..=2).contains(&flag) {
        return Err(TrackError::InvalidSlice(format!(
            "radiation_flag must be 0, 1 or 2, got {flag}"
        )));
    }
    Ok(())
}

fn check_delta_taper(delta_taper: f64) -> TrackResult<()> {
    if !delta_taper.is_finite() || delta_taper <= -1.0 {
        return Err(TrackError::InvalidSlice(format!(
            "delta_taper must be finite and > -1, got {delta_taper}"
        )));
    }
    Ok(())
}

/// 2×2 map of one plane with focusing strength `k` (focusing for k > 0).
fn plane_matrix(k: f64, length: f64) -> [[f64; 2]; 2] {
    if k > 0.0 {
        let sk = k.sqrt();
        let phi = sk * length;
        [[phi.cos(), phi.sin() / sk], [-sk * phi.sin(), phi.cos()]]
    } else if k < 0.0 {
        let sk = (-k).sqrt();
        let phi = sk * length;
        [[phi.cosh(), phi.sinh() / sk], [sk * phi.sinh(), phi.cosh()]]
    } else {
        [[1.0, length], [0.0, 1.0]]
    }
}

/// Field-free region.
#[derive(Debug, Clone, PartialEq)]
pub struct Drift {
    pub length: f64,
}

impl Drift {
    pub fn new(length: f64) -> TrackResult<Self> {
        if !length.is_finite() || length < 0.0 {
            return Err(TrackError::InvalidSlice(format!(
                "drift length must be finite and >= 0, got {length}"
            )));
        }
        Ok(Drift { length })
    }
}

/// Per-invocation view of a thin slice, as consumed by the resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceDescriptor {
    /// Fraction of the parent's integrated strength, in (0, 1]
    pub weight: f64,
    /// This slice's share of the parent length, `weight * parent.length`
    pub length: f64,
    pub k1: f64,
    pub k1s: f64,
    pub radiation_flag: i64,
    pub delta_taper: f64,
}

/// Thin kick carrying a weighted fraction of a parent quadrupole.
#[derive(Debug, Clone)]
pub struct ThinSliceQuadrupole {
    parent: Arc<Quadrupole>,
    weight: f64,
    radiation_flag: i64,
    delta_taper: f64,
    internal_record: Option<Arc<SynchrotronRadiationRecord>>,
}

impl ThinSliceQuadrupole {
    /// Build a slice; the radiation settings start out as the parent's.
    pub fn new(parent: Arc<Quadrupole>, weight: f64) -> TrackResult<Self> {
        if !weight.is_finite() || weight <= 0.0 || weight > 1.0 {
            return Err(TrackError::InvalidSlice(format!(
                "slice weight must be finite and in (0, 1], got {weight}"
            )));
        }
        Ok(ThinSliceQuadrupole {
            radiation_flag: parent.radiation_flag,
            delta_taper: parent.delta_taper,
            parent,
            weight,
            internal_record: None,
        })
    }

    pub fn parent(&self) -> &Quadrupole {
        &self.parent
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn radiation_flag(&self) -> i64 {
        self.radiation_flag
    }

    /// Override the inherited radiation model for this slice only.
    pub fn set_radiation_flag(&mut self, flag: i64) -> TrackResult<()> {
        check_radiation_flag(flag)?;
        self.radiation_flag = flag;
        Ok(())
    }

    pub fn delta_taper(&self) -> f64 {
        self.delta_taper
    }

    pub fn set_delta_taper(&mut self, delta_taper: f64) -> TrackResult<()> {
        check_delta_taper(delta_taper)?;
        self.delta_taper = delta_taper;
        Ok(())
    }

    /// Slice length, already scaled by the weight.
    pub fn length(&self) -> f64 {
        self.parent.length * self.weight
    }

    pub fn descriptor(&self) -> SliceDescriptor {
        SliceDescriptor {
            weight: self.weight,
            length: self.length(),
            k1: self.parent.k1,
            k1s: self.parent.k1s,
            radiation_flag: self.radiation_flag,
            delta_taper: self.delta_taper,
        }
    }

    /// Record this slice writes to, if internal logging is active.
    pub fn internal_record(&self) -> Option<&SynchrotronRadiationRecord> {
        self.internal_record.as_deref()
    }

    pub fn attach_record(&mut self, record: Arc<SynchrotronRadiationRecord>) {
        self.internal_record = Some(record);
    }

    pub fn detach_record(&mut self) {
        self.internal_record = None;
    }
}

#[derive(Debug, Clone)]
pub enum Element {
    Drift(Drift),
    ThinSliceQuadrupole(ThinSliceQuadrupole),
}

impl Element {
    pub fn length(&self) -> f64 {
        match self {
            Element::Drift(d) => d.length,
            Element::ThinSliceQuadrupole(_) => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_length_scales_with_weight() {
        let parent = Arc::new(Quadrupole::new(2.0, 0.5, 0.1).unwrap());
        let slice = ThinSliceQuadrupole::new(parent.clone(), 0.25).unwrap();
        assert_eq!(slice.length(), 0.5);
        let d = slice.descriptor();
        assert_eq!(d.k1, 0.5);
        assert_eq!(d.k1s, 0.1);
        assert_eq!(d.weight, 0.25);
        assert!(Arc::ptr_eq(&parent, &slice.parent));
    }

    #[test]
    fn test_slice_rejects_invalid_weight() {
        let parent = Arc::new(Quadrupole::new(1.0, 0.1, 0.0).unwrap());
        for bad in [0.0, -0.5, 1.5, f64::NAN] {
            match ThinSliceQuadrupole::new(parent.clone(), bad) {
                Err(TrackError::InvalidSlice(msg)) => assert!(msg.contains("weight")),
                other => panic!("Unexpected result: {other:?}"),
            }
        }
    }

    #[test]
    fn test_slice_inherits_radiation_settings() {
        let parent = Arc::new(
            Quadrupole::new(1.0, 0.1, 0.0)
                .unwrap()
                .with_radiation_flag(2)
                .unwrap()
                .with_delta_taper(1e-3)
                .unwrap(),
        );
        let slice = ThinSliceQuadrupole::new(parent, 0.5).unwrap();
        assert_eq!(slice.radiation_flag(), 2);
        assert_eq!(slice.delta_taper(), 1e-3);
        assert!(slice.internal_record().is_none());
    }

    #[test]
    fn test_slice_setters_validate() {
        let parent = Arc::new(Quadrupole::new(1.0, 0.1, 0.0).unwrap());
        let mut slice = ThinSliceQuadrupole::new(parent, 0.5).unwrap();
        match slice.set_radiation_flag(3) {
            Err(TrackError::InvalidSlice(msg)) => assert!(msg.contains("radiation_flag")),
            other => panic!("Unexpected result: {other:?}"),
        }
        assert!(slice.set_radiation_flag(-1).is_err());
        assert!(slice.set_delta_taper(f64::NAN).is_err());
        assert!(slice.set_delta_taper(-1.0).is_err());
        assert_eq!(slice.radiation_flag(), 0);
        assert_eq!(slice.delta_taper(), 0.0);

        slice.set_radiation_flag(2).unwrap();
        slice.set_delta_taper(2e-3).unwrap();
        assert_eq!(slice.descriptor().radiation_flag, 2);
        assert_eq!(slice.descriptor().delta_taper, 2e-3);
        assert_eq!(slice.parent().radiation_flag, 0, "parent untouched");
    }

    #[test]
    fn test_quadrupole_rejects_invalid_inputs() {
        assert!(Quadrupole::new(0.0, 0.1, 0.0).is_err());
        assert!(Quadrupole::new(1.0, f64::INFINITY, 0.0).is_err());
        let q = Quadrupole::new(1.0, 0.1, 0.0).unwrap();
        assert!(q.clone().with_radiation_flag(3).is_err());
        assert!(q.with_delta_taper(-1.0).is_err());
        assert!(Drift::new(-0.1).is_err());
    }

    #[test]
    fn test_transfer_matrix_is_symplectic() {
        let q = Quadrupole::new(1.3, 0.7, 0.0).unwrap();
        let m = q.transfer_matrix().unwrap();
        let det_x = m[[0, 0]] * m[[1, 1]] - m[[0, 1]] * m[[1, 0]];
        let det_y = m[[2, 2]] * m[[3, 3]] - m[[2, 3]] * m[[3, 2]];
        assert!((det_x - 1.0).abs() < 1e-12);
        assert!((det_y - 1.0).abs() < 1e-12);
        assert!(m[[0, 0]] < 1.0, "focusing in x");
        assert!(m[[2, 2]] > 1.0, "defocusing in y");
        assert_eq!(m[[0, 2]], 0.0);
    }

    #[test]
    fn test_transfer_matrix_rejects_skew() {
        let q = Quadrupole::new(1.0, 0.1, 0.2).unwrap();
        assert!(q.transfer_matrix().is_err());
    }
}
