//! Closed real intervals with outward-rounded arithmetic.
//!
//! An interval `[lower, upper]` represents every real `x` with
//! `lower <= x <= upper`. The empty interval (bottom) is encoded as
//! `lower > upper` and propagates through every operation.
//!
//! # Rounding
//!
//! IEEE 754 operations round to nearest-even, which is unsound for
//! interval bounds: a lower bound must round toward -∞ and an upper bound
//! toward +∞. Instead of toggling the global rounding mode, every computed
//! bound is nudged one ULP outward (`next_down` for lower bounds,
//! `next_up` for upper bounds). The result is a superset of the exact real
//! interval on any IEEE 754 platform, at the cost of at most 1 ULP of
//! slack per operation.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Next representable `f64` toward +∞.
#[inline]
pub(crate) fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        // Smallest positive subnormal.
        return f64::from_bits(1);
    }

    let bits = x.to_bits();
    if x.is_sign_positive() {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// Next representable `f64` toward -∞.
#[inline]
pub(crate) fn next_down(x: f64) -> f64 {
    if x.is_nan() || x == f64::NEG_INFINITY {
        return x;
    }
    if x == 0.0 {
        // Smallest negative subnormal.
        return f64::from_bits(0x8000_0000_0000_0001);
    }

    let bits = x.to_bits();
    if x.is_sign_positive() {
        f64::from_bits(bits - 1)
    } else {
        f64::from_bits(bits + 1)
    }
}

/// Build an interval from bounds computed with round-to-nearest,
/// widened one ULP outward on each side.
#[inline]
fn rounded(lower: f64, upper: f64) -> Interval {
    Interval {
        lower: next_down(lower),
        upper: next_up(upper),
    }
}

/// A closed interval `[lower, upper]` over `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    /// Create an interval from its bounds. `lower > upper` encodes bottom.
    #[inline]
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// A degenerate interval containing exactly one point.
    #[inline]
    pub fn point(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    /// The canonical empty interval.
    #[inline]
    pub fn bottom() -> Self {
        Self {
            lower: 1.0,
            upper: -1.0,
        }
    }

    /// An interval is bottom when its bounds have crossed.
    #[inline]
    pub fn is_bottom(&self) -> bool {
        self.lower > self.upper
    }

    /// `true` iff every point of `self` lies strictly below every point
    /// of `other`.
    #[inline]
    pub fn strictly_below(&self, other: &Interval) -> bool {
        self.upper < other.lower
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    #[inline]
    pub fn midpoint(&self) -> f64 {
        (self.lower + self.upper) * 0.5
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        (self.upper - self.lower) * 0.5
    }

    /// A uniformly distributed point of the interval.
    ///
    /// Must not be called on bottom.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        debug_assert!(!self.is_bottom(), "sampling from a bottom interval");
        if self.lower == self.upper {
            return self.lower;
        }
        rng.gen_range(self.lower..=self.upper)
    }

    /// Interval addition, rounded outward.
    #[inline]
    pub fn add(&self, rhs: &Interval) -> Interval {
        rounded(self.lower + rhs.lower, self.upper + rhs.upper)
    }

    /// Interval subtraction, rounded outward.
    ///
    /// `x - y` contains `a - b` for every `a` in `x` and `b` in `y`, so
    /// the lower bound subtracts the subtrahend's upper bound and vice
    /// versa.
    #[inline]
    pub fn sub(&self, rhs: &Interval) -> Interval {
        rounded(self.lower - rhs.upper, self.upper - rhs.lower)
    }

    /// Interval multiplication, rounded outward.
    ///
    /// The nine sign patterns of the operands are enumerated explicitly;
    /// only the mixed/mixed case needs corner comparisons. Zero operands
    /// short-circuit to `[0, 0]`.
    pub fn mul(&self, rhs: &Interval) -> Interval {
        let (xl, xu) = (self.lower, self.upper);
        let (yl, yu) = (rhs.lower, rhs.upper);

        if (xl == 0.0 && xu == 0.0) || (yl == 0.0 && yu == 0.0) {
            return Interval::point(0.0);
        }

        if xl >= 0.0 {
            if yl >= 0.0 {
                rounded(xl * yl, xu * yu)
            } else if yu <= 0.0 {
                rounded(xu * yl, xl * yu)
            } else {
                rounded(xu * yl, xu * yu)
            }
        } else if xu <= 0.0 {
            if yl >= 0.0 {
                rounded(xl * yu, xu * yl)
            } else if yu <= 0.0 {
                rounded(xu * yu, xl * yl)
            } else {
                rounded(xl * yu, xl * yl)
            }
        } else if yl >= 0.0 {
            rounded(xl * yu, xu * yu)
        } else if yu <= 0.0 {
            rounded(xu * yl, xl * yl)
        } else {
            rounded((xl * yu).min(xu * yl), (xl * yl).max(xu * yu))
        }
    }

    /// Natural power `x^degree` for `degree >= 1`, by repeated
    /// multiplication.
    pub fn pow(&self, degree: u32) -> Interval {
        let mut r = *self;
        for _ in 1..degree {
            r = r.mul(self);
        }
        r
    }

    /// Interval exponential, rounded outward.
    #[inline]
    pub fn exp(&self) -> Interval {
        rounded(self.lower.exp(), self.upper.exp())
    }

    /// Translation by a scalar, rounded outward.
    #[inline]
    pub fn translate(&self, t: f64) -> Interval {
        rounded(self.lower + t, self.upper + t)
    }

    /// Scaling by a scalar, rounded outward. A negative factor swaps the
    /// bounds.
    #[inline]
    pub fn scale(&self, s: f64) -> Interval {
        if s >= 0.0 {
            rounded(s * self.lower, s * self.upper)
        } else {
            rounded(s * self.upper, s * self.lower)
        }
    }

    /// Fused multiply-add `alpha * self + rhs`, rounded outward at both
    /// steps so the margin covers the two roundings of a concrete
    /// `alpha * a + b` evaluation.
    #[inline]
    pub fn fma(&self, alpha: f64, rhs: &Interval) -> Interval {
        self.scale(alpha).add(rhs)
    }

    /// Greatest lower bound (intersection). May be bottom.
    #[inline]
    pub fn glb(&self, rhs: &Interval) -> Interval {
        Interval {
            lower: self.lower.max(rhs.lower),
            upper: self.upper.min(rhs.upper),
        }
    }

    /// Least upper bound (convex hull).
    #[inline]
    pub fn lub(&self, rhs: &Interval) -> Interval {
        Interval {
            lower: self.lower.min(rhs.lower),
            upper: self.upper.max(rhs.upper),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_bottom() {
            write!(f, "bottom")
        } else {
            write!(f, "[{},{}]", self.lower, self.upper)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bottom_detection() {
        assert!(Interval::bottom().is_bottom());
        assert!(Interval::new(1.0, -1.0).is_bottom());
        assert!(!Interval::new(-1.0, 1.0).is_bottom());
        assert!(!Interval::point(0.0).is_bottom());
    }

    #[test]
    fn midpoint_and_radius() {
        let x = Interval::new(-1.0, 3.0);
        assert_eq!(x.midpoint(), 1.0);
        assert_eq!(x.radius(), 2.0);
    }

    #[test]
    fn strictly_below_is_strict() {
        let x = Interval::new(0.0, 1.0);
        let y = Interval::new(1.0, 2.0);
        let z = Interval::new(1.5, 2.0);
        assert!(!x.strictly_below(&y));
        assert!(x.strictly_below(&z));
    }

    #[test]
    fn add_widens_outward() {
        let x = Interval::new(0.1, 0.2);
        let y = Interval::new(0.3, 0.4);
        let r = x.add(&y);
        assert!(r.lower <= 0.1 + 0.3);
        assert!(r.upper >= 0.2 + 0.4);
    }

    #[test]
    fn sub_crosses_bounds() {
        let x = Interval::new(1.0, 2.0);
        let y = Interval::new(0.5, 1.5);
        let r = x.sub(&y);
        // 1.0 - 1.5 = -0.5, 2.0 - 0.5 = 1.5
        assert!(r.lower <= -0.5 && r.upper >= 1.5);
        assert!(r.contains(1.0 - 0.5));
        assert!(r.contains(2.0 - 1.5));
    }

    #[test]
    fn mul_zero_short_circuits() {
        let zero = Interval::point(0.0);
        let x = Interval::new(-3.0, 7.0);
        assert_eq!(x.mul(&zero), Interval::point(0.0));
        assert_eq!(zero.mul(&x), Interval::point(0.0));
    }

    #[test]
    fn mul_mixed_signs() {
        let x = Interval::new(-2.0, 3.0);
        let y = Interval::new(-5.0, 4.0);
        let r = x.mul(&y);
        // Corners: 10, -8, -15, 12.
        assert!(r.lower <= -15.0);
        assert!(r.upper >= 12.0);
    }

    #[test]
    fn pow_squares_negative_base() {
        let x = Interval::new(-2.0, 1.0);
        let r = x.pow(2);
        assert!(r.contains(4.0));
        assert!(r.contains(0.0));
        assert!(r.contains(1.0));
    }

    #[test]
    fn scale_negative_swaps() {
        let x = Interval::new(1.0, 2.0);
        let r = x.scale(-1.0);
        assert!(r.lower <= -2.0 && r.upper >= -1.0);
        assert!(!r.is_bottom());
    }

    #[test]
    fn glb_of_disjoint_is_bottom() {
        let x = Interval::new(0.0, 1.0);
        let y = Interval::new(2.0, 3.0);
        assert!(x.glb(&y).is_bottom());
    }

    #[test]
    fn lub_is_hull() {
        let x = Interval::new(0.0, 1.0);
        let y = Interval::new(2.0, 3.0);
        let r = x.lub(&y);
        assert_eq!(r, Interval::new(0.0, 3.0));
    }

    #[test]
    fn next_up_down_are_adjacent() {
        assert!(next_up(1.0) > 1.0);
        assert!(next_down(1.0) < 1.0);
        assert!(next_up(0.0) > 0.0);
        assert!(next_down(0.0) < 0.0);
        assert_eq!(next_up(f64::INFINITY), f64::INFINITY);
        assert_eq!(next_down(f64::NEG_INFINITY), f64::NEG_INFINITY);
    }

    #[test]
    fn sample_stays_inside() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let x = Interval::new(-0.5, 0.5);
        for _ in 0..100 {
            assert!(x.contains(x.sample(&mut rng)));
        }
    }

    #[test]
    fn display_formats() {
        assert_eq!(Interval::new(0.0, 1.0).to_string(), "[0,1]");
        assert_eq!(Interval::bottom().to_string(), "bottom");
    }

    fn finite() -> impl Strategy<Value = f64> {
        -1e6f64..1e6f64
    }

    fn interval() -> impl Strategy<Value = Interval> {
        (finite(), finite()).prop_map(|(a, b)| Interval::new(a.min(b), a.max(b)))
    }

    /// A point of `x` at relative position `s`, clamped back into the
    /// interval to absorb round-to-nearest drift.
    fn pick(x: &Interval, s: f64) -> f64 {
        (x.lower + s * (x.upper - x.lower)).clamp(x.lower, x.upper)
    }

    proptest! {
        #[test]
        fn prop_add_sound(x in interval(), y in interval(), s in 0.0f64..1.0, t in 0.0f64..1.0) {
            let (a, b) = (pick(&x, s), pick(&y, t));
            prop_assert!(x.add(&y).contains(a + b));
        }

        #[test]
        fn prop_sub_sound(x in interval(), y in interval(), s in 0.0f64..1.0, t in 0.0f64..1.0) {
            let (a, b) = (pick(&x, s), pick(&y, t));
            prop_assert!(x.sub(&y).contains(a - b));
        }

        #[test]
        fn prop_mul_sound(x in interval(), y in interval(), s in 0.0f64..1.0, t in 0.0f64..1.0) {
            let (a, b) = (pick(&x, s), pick(&y, t));
            prop_assert!(x.mul(&y).contains(a * b));
        }

        #[test]
        fn prop_exp_sound(x in (-30.0f64..30.0, 0.0f64..1.0).prop_map(|(l, w)| Interval::new(l, l + w))) {
            prop_assert!(x.exp().contains(x.lower.exp()));
            prop_assert!(x.exp().contains(x.upper.exp()));
        }

        #[test]
        fn prop_scale_sound(x in interval(), c in -100.0f64..100.0, s in 0.0f64..1.0) {
            let a = pick(&x, s);
            prop_assert!(x.scale(c).contains(c * a));
        }

        #[test]
        fn prop_fma_sound(x in interval(), y in interval(), c in -100.0f64..100.0, s in 0.0f64..1.0, t in 0.0f64..1.0) {
            let (a, b) = (pick(&x, s), pick(&y, t));
            prop_assert!(x.fma(c, &y).contains(c * a + b));
        }

        #[test]
        fn prop_glb_lub_lattice(x in interval(), y in interval(), s in 0.0f64..1.0) {
            let a = pick(&x, s);
            let hull = x.lub(&y);
            prop_assert!(hull.contains(a));
            let meet = x.glb(&y);
            if !meet.is_bottom() {
                prop_assert!(x.contains(meet.lower) && y.contains(meet.lower));
            }
        }
    }
}
