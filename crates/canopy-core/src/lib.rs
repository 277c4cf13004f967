//! Core types for canopy, a robustness certifier for tree-ensemble
//! classifiers.
//!
//! This crate provides the numeric abstract domain (outward-rounded
//! [`Interval`]s and [`Hyperrectangle`]s), dense [`LabelSet`]s, the error
//! type shared across the workspace, and the verdict types produced by a
//! stability analysis.

use serde::{Deserialize, Serialize};

pub mod hyperrect;
pub mod interval;
pub mod labels;

pub use hyperrect::Hyperrectangle;
pub use interval::Interval;
pub use labels::LabelSet;

/// Error types for canopy operations.
#[derive(Debug)]
pub enum CanopyError {
    /// Operands live in feature spaces of different dimension.
    DimensionMismatch { expected: usize, got: usize },

    /// A classifier, dataset, tier vector, or analysis option violates a
    /// structural precondition.
    InvalidInput(String),

    /// An externally supplied region stream could not be parsed.
    MalformedRegion(String),
}

impl std::fmt::Display for CanopyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanopyError::DimensionMismatch { expected, got } => {
                write!(f, "dimension mismatch: expected {expected}, got {got}")
            }
            CanopyError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            CanopyError::MalformedRegion(msg) => write!(f, "malformed region: {msg}"),
        }
    }
}

impl std::error::Error for CanopyError {}

pub type Result<T> = std::result::Result<T, CanopyError>;

/// Outcome of a stability analysis on one adversarial region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Every point of the region receives the reference label set.
    Stable,
    /// A concrete point with a differing label set was found.
    Unstable,
    /// The analysis budget was exhausted before a conclusion.
    Unknown,
}

impl Verdict {
    pub fn is_stable(&self) -> bool {
        matches!(self, Verdict::Stable)
    }

    pub fn is_unstable(&self) -> bool {
        matches!(self, Verdict::Unstable)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Stable => write!(f, "STABLE"),
            Verdict::Unstable => write!(f, "UNSTABLE"),
            Verdict::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Concrete evidence of instability: a point of the original region whose
/// label set differs from the reference one, together with the refined
/// sub-region it was drawn from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Witness {
    pub point: Vec<f64>,
    pub region: Hyperrectangle,
}

/// Result of analysing one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityReport {
    pub verdict: Verdict,
    /// The reference sample the region was built around.
    pub sample: Vec<f64>,
    /// The classifier's label set on the reference sample.
    pub labels: LabelSet,
    /// Present exactly when the verdict is [`Verdict::Unstable`].
    pub witness: Option<Witness>,
}

impl StabilityReport {
    pub fn stable(sample: Vec<f64>, labels: LabelSet) -> Self {
        Self {
            verdict: Verdict::Stable,
            sample,
            labels,
            witness: None,
        }
    }

    pub fn unstable(sample: Vec<f64>, labels: LabelSet, witness: Witness) -> Self {
        Self {
            verdict: Verdict::Unstable,
            sample,
            labels,
            witness: Some(witness),
        }
    }

    pub fn unknown(sample: Vec<f64>, labels: LabelSet) -> Self {
        Self {
            verdict: Verdict::Unknown,
            sample,
            labels,
            witness: None,
        }
    }
}
