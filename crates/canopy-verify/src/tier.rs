//! One-hot tier constraints over categorical feature groups.
//!
//! A tier vector assigns every feature a group id; group `0` means the
//! feature is not tiered. Features sharing a non-zero group encode one
//! categorical value one-hot: exactly one of them is `1`, the rest are
//! `0`. Tier adjustment narrows a hyperrectangle after a refinement pins
//! a tiered feature, so the search never explores assignments with two
//! active values of the same categorical.

use canopy_core::{CanopyError, Hyperrectangle, Interval, Result};
use serde::{Deserialize, Serialize};

/// Per-feature group assignment. Group `0` is "not tiered".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier {
    groups: Vec<u32>,
}

impl Tier {
    pub fn new(groups: Vec<u32>) -> Self {
        Self { groups }
    }

    /// A tier vector with every feature unconstrained.
    pub fn untiered(dimension: usize) -> Self {
        Self {
            groups: vec![0; dimension],
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn group(&self, feature: usize) -> u32 {
        self.groups[feature]
    }

    /// Fail unless the vector covers exactly `dimension` features.
    pub fn check_dimension(&self, dimension: usize) -> Result<()> {
        if self.groups.len() != dimension {
            return Err(CanopyError::InvalidInput(format!(
                "tier vector has {} entries for a {dimension}-dimensional feature space",
                self.groups.len()
            )));
        }
        Ok(())
    }

    /// Narrow `region` after `feature` was pinned on (`active`) or off.
    ///
    /// Turning a tiered feature on forces every sibling of its group off;
    /// turning it off forces the last undetermined sibling on when all
    /// others are already off. Untiered features are left untouched.
    ///
    /// Forcing is an intersection, not an overwrite: a branch whose
    /// region cannot host the forced value becomes bottom, which the
    /// caller prunes. This keeps every narrowed region a subset of the
    /// original one.
    pub fn adjust(&self, region: &mut Hyperrectangle, feature: usize, active: bool) {
        let group = self.groups[feature];
        if group == 0 {
            return;
        }

        let intervals = region.intervals_mut();
        if active {
            intervals[feature] = intervals[feature].glb(&Interval::point(1.0));
            for j in 0..self.groups.len() {
                if j != feature && self.groups[j] == group {
                    intervals[j] = intervals[j].glb(&Interval::point(0.0));
                }
            }
        } else {
            intervals[feature] = intervals[feature].glb(&Interval::point(0.0));

            let is_off = |iv: &Interval| iv.lower == 0.0 && iv.upper == 0.0;
            let mut candidate = None;
            let mut all_others_off = true;
            for j in 0..self.groups.len() {
                if self.groups[j] != group || is_off(&intervals[j]) {
                    continue;
                }
                if candidate.is_some() {
                    all_others_off = false;
                    break;
                }
                candidate = Some(j);
            }

            if all_others_off {
                if let Some(j) = candidate {
                    intervals[j] = intervals[j].glb(&Interval::point(1.0));
                }
            }
        }
    }
}
