//! Hyperrectangles: finite products of intervals.
//!
//! A hyperrectangle over `R^n` is one interval per dimension. Every binary
//! operation is component-wise; a hyperrectangle is bottom as soon as any
//! component is bottom.

use crate::interval::Interval;
use crate::{CanopyError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// An axis-aligned box in `R^n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperrectangle {
    intervals: Vec<Interval>,
}

impl Hyperrectangle {
    pub fn new(intervals: Vec<Interval>) -> Self {
        Self { intervals }
    }

    /// A degenerate box containing exactly `point`.
    pub fn from_point(point: &[f64]) -> Self {
        Self {
            intervals: point.iter().map(|&v| Interval::point(v)).collect(),
        }
    }

    /// The box `[point_i - radius, point_i + radius]` in every dimension.
    pub fn from_ball(point: &[f64], radius: f64) -> Self {
        Self {
            intervals: point
                .iter()
                .map(|&v| Interval::new(v - radius, v + radius))
                .collect(),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.intervals.len()
    }

    #[inline]
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    #[inline]
    pub fn intervals_mut(&mut self) -> &mut [Interval] {
        &mut self.intervals
    }

    /// Bottom iff any component is bottom.
    pub fn is_bottom(&self) -> bool {
        self.intervals.iter().any(Interval::is_bottom)
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        self.intervals.len() == point.len()
            && self
                .intervals
                .iter()
                .zip(point)
                .all(|(iv, &v)| iv.contains(v))
    }

    /// Component-wise midpoint.
    pub fn midpoint(&self) -> Vec<f64> {
        self.intervals.iter().map(Interval::midpoint).collect()
    }

    /// Component-wise radius.
    pub fn radius(&self) -> Vec<f64> {
        self.intervals.iter().map(Interval::radius).collect()
    }

    /// Generalized volume: the product of the per-dimension radii.
    pub fn volume(&self) -> f64 {
        self.intervals.iter().map(Interval::radius).product()
    }

    /// A uniformly distributed point of the box.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.intervals.iter().map(|iv| iv.sample(rng)).collect()
    }

    fn check_dimension(&self, rhs: &Hyperrectangle) -> Result<()> {
        if self.dimension() != rhs.dimension() {
            return Err(CanopyError::DimensionMismatch {
                expected: self.dimension(),
                got: rhs.dimension(),
            });
        }
        Ok(())
    }

    fn zip_with(
        &self,
        rhs: &Hyperrectangle,
        op: impl Fn(&Interval, &Interval) -> Interval,
    ) -> Result<Hyperrectangle> {
        self.check_dimension(rhs)?;
        Ok(Hyperrectangle {
            intervals: self
                .intervals
                .iter()
                .zip(&rhs.intervals)
                .map(|(a, b)| op(a, b))
                .collect(),
        })
    }

    pub fn add(&self, rhs: &Hyperrectangle) -> Result<Hyperrectangle> {
        self.zip_with(rhs, |a, b| a.add(b))
    }

    pub fn sub(&self, rhs: &Hyperrectangle) -> Result<Hyperrectangle> {
        self.zip_with(rhs, |a, b| a.sub(b))
    }

    pub fn mul(&self, rhs: &Hyperrectangle) -> Result<Hyperrectangle> {
        self.zip_with(rhs, |a, b| a.mul(b))
    }

    pub fn pow(&self, degree: u32) -> Hyperrectangle {
        Hyperrectangle {
            intervals: self.intervals.iter().map(|a| a.pow(degree)).collect(),
        }
    }

    pub fn exp(&self) -> Hyperrectangle {
        Hyperrectangle {
            intervals: self.intervals.iter().map(Interval::exp).collect(),
        }
    }

    /// Translate by a vector, component-wise.
    pub fn translate(&self, t: &[f64]) -> Hyperrectangle {
        debug_assert_eq!(self.dimension(), t.len());
        Hyperrectangle {
            intervals: self
                .intervals
                .iter()
                .zip(t)
                .map(|(a, &ti)| a.translate(ti))
                .collect(),
        }
    }

    /// Scale by a diagonal matrix, component-wise.
    pub fn scale(&self, s: &[f64]) -> Hyperrectangle {
        debug_assert_eq!(self.dimension(), s.len());
        Hyperrectangle {
            intervals: self
                .intervals
                .iter()
                .zip(s)
                .map(|(a, &si)| a.scale(si))
                .collect(),
        }
    }

    /// Scale every dimension by the same factor.
    pub fn scale_uniform(&self, s: f64) -> Hyperrectangle {
        Hyperrectangle {
            intervals: self.intervals.iter().map(|a| a.scale(s)).collect(),
        }
    }

    /// Fused multiply-add `alpha * self + rhs`, component-wise.
    pub fn fma(&self, alpha: f64, rhs: &Hyperrectangle) -> Result<Hyperrectangle> {
        self.zip_with(rhs, |a, b| a.fma(alpha, b))
    }

    /// Greatest lower bound (intersection). May be bottom.
    pub fn glb(&self, rhs: &Hyperrectangle) -> Result<Hyperrectangle> {
        self.zip_with(rhs, |a, b| a.glb(b))
    }

    /// Least upper bound (component-wise hull).
    pub fn lub(&self, rhs: &Hyperrectangle) -> Result<Hyperrectangle> {
        self.zip_with(rhs, |a, b| a.lub(b))
    }
}

impl std::fmt::Display for Hyperrectangle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, iv) in self.intervals.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{iv}")?;
        }
        Ok(())
    }
}
