//! Adversarial regions: a reference sample plus a bounded perturbation,
//! translated into the hyperrectangle abstract domain.

use canopy_core::{CanopyError, Hyperrectangle, Interval, Result};
use serde::{Deserialize, Serialize};

/// A bounded perturbation of a numeric sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Perturbation {
    /// The L∞ ball of the given radius.
    LInf { radius: f64 },
    /// The L∞ ball clipped to `[min, max]` in every dimension.
    LInfClip { radius: f64, min: f64, max: f64 },
    /// An externally supplied interval box, already parsed from its
    /// stream.
    Explicit(Hyperrectangle),
}

impl Perturbation {
    pub fn l_inf(radius: f64) -> Result<Self> {
        if !(radius >= 0.0) {
            return Err(CanopyError::InvalidInput(format!(
                "perturbation radius must be non-negative, got {radius}"
            )));
        }
        Ok(Perturbation::LInf { radius })
    }

    pub fn l_inf_clip(radius: f64, min: f64, max: f64) -> Result<Self> {
        if !(radius >= 0.0) {
            return Err(CanopyError::InvalidInput(format!(
                "perturbation radius must be non-negative, got {radius}"
            )));
        }
        if !(min <= max) {
            return Err(CanopyError::InvalidInput(format!(
                "perturbation clip range [{min}, {max}] is empty"
            )));
        }
        Ok(Perturbation::LInfClip { radius, min, max })
    }
}

impl std::fmt::Display for Perturbation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Perturbation::LInf { radius } => write!(f, "l_inf {radius}"),
            Perturbation::LInfClip { radius, min, max } => {
                write!(f, "l_inf {radius} in [{min}, {max}]")
            }
            Perturbation::Explicit(_) => write!(f, "explicit region"),
        }
    }
}

/// A reference sample together with the perturbation applied to it.
#[derive(Debug, Clone)]
pub struct AdversarialRegion<'a> {
    pub sample: &'a [f64],
    pub perturbation: &'a Perturbation,
}

impl AdversarialRegion<'_> {
    /// The hyperrectangle of all points reachable under the perturbation.
    pub fn to_hyperrectangle(&self) -> Result<Hyperrectangle> {
        match self.perturbation {
            Perturbation::LInf { radius } => {
                Ok(Hyperrectangle::from_ball(self.sample, *radius))
            }
            Perturbation::LInfClip { radius, min, max } => Ok(Hyperrectangle::new(
                self.sample
                    .iter()
                    .map(|&v| Interval::new((v - radius).max(*min), (v + radius).min(*max)))
                    .collect(),
            )),
            Perturbation::Explicit(region) => {
                if region.dimension() != self.sample.len() {
                    return Err(CanopyError::DimensionMismatch {
                        expected: self.sample.len(),
                        got: region.dimension(),
                    });
                }
                Ok(region.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l_inf_ball_spans_radius() {
        let p = Perturbation::l_inf(0.3).unwrap();
        let region = AdversarialRegion {
            sample: &[0.0, 1.0],
            perturbation: &p,
        };
        let h = region.to_hyperrectangle().unwrap();
        assert_eq!(h.intervals()[0], Interval::new(-0.3, 0.3));
        assert_eq!(h.intervals()[1], Interval::new(0.7, 1.3));
    }

    #[test]
    fn clipped_ball_respects_bounds() {
        let p = Perturbation::l_inf_clip(0.5, 0.0, 1.0).unwrap();
        let region = AdversarialRegion {
            sample: &[0.2, 0.9],
            perturbation: &p,
        };
        let h = region.to_hyperrectangle().unwrap();
        assert_eq!(h.intervals()[0], Interval::new(0.0, 0.7));
        assert_eq!(h.intervals()[1], Interval::new(0.4, 1.0));
    }

    #[test]
    fn explicit_region_must_match_dimension() {
        let p = Perturbation::Explicit(Hyperrectangle::from_ball(&[0.0], 1.0));
        let region = AdversarialRegion {
            sample: &[0.0, 0.0],
            perturbation: &p,
        };
        assert!(region.to_hyperrectangle().is_err());
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(Perturbation::l_inf(-0.1).is_err());
        assert!(Perturbation::l_inf(f64::NAN).is_err());
        assert!(Perturbation::l_inf_clip(0.1, 1.0, 0.0).is_err());
    }

    #[test]
    fn zero_radius_gives_a_point() {
        let p = Perturbation::l_inf(0.0).unwrap();
        let region = AdversarialRegion {
            sample: &[0.5],
            perturbation: &p,
        };
        let h = region.to_hyperrectangle().unwrap();
        assert_eq!(h.volume(), 0.0);
        assert!(h.contains(&[0.5]));
    }
}
