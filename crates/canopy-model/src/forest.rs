//! Forests: ordered collections of decision trees voting on a shared
//! label set.

use crate::tree::{argmax_set, DecisionTree, Node};
use canopy_core::{CanopyError, LabelSet, Result};
use serde::{Deserialize, Serialize};

/// How per-tree predictions are aggregated into a forest prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VotingScheme {
    /// Each tree casts one vote for every label tying for its maximum.
    Max,
    /// Label scores are the per-tree probabilities averaged over the
    /// forest.
    Average,
    /// Per-tree log-probabilities are summed, exponentiated, and
    /// normalised.
    Softargmax,
}

impl std::fmt::Display for VotingScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VotingScheme::Max => write!(f, "max"),
            VotingScheme::Average => write!(f, "average"),
            VotingScheme::Softargmax => write!(f, "softargmax"),
        }
    }
}

/// An ordered ensemble of decision trees.
///
/// Every member tree shares the feature-space dimension and an identical
/// label array; `Max` and `Average` voting require counting leaves
/// throughout, `Softargmax` requires log-probability leaves. All of this
/// is validated at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forest {
    trees: Vec<DecisionTree>,
    voting: VotingScheme,
}

impl Forest {
    pub fn new(trees: Vec<DecisionTree>, voting: VotingScheme) -> Result<Self> {
        let first = trees.first().ok_or_else(|| {
            CanopyError::InvalidInput("a forest needs at least one tree".into())
        })?;

        for (t, tree) in trees.iter().enumerate() {
            if tree.dimension() != first.dimension() {
                return Err(CanopyError::InvalidInput(format!(
                    "tree {t} lives in dimension {}, expected {}",
                    tree.dimension(),
                    first.dimension()
                )));
            }
            if tree.labels() != first.labels() {
                return Err(CanopyError::InvalidInput(format!(
                    "tree {t} disagrees on the label set"
                )));
            }
            for id in (0..tree.n_nodes() as u32).map(crate::tree::NodeId) {
                match (tree.node(id), voting) {
                    (Node::LogLeaf { .. }, VotingScheme::Max | VotingScheme::Average) => {
                        return Err(CanopyError::InvalidInput(format!(
                            "tree {t} carries log-probability leaves, unsupported under {voting} voting"
                        )));
                    }
                    (Node::Leaf { .. }, VotingScheme::Softargmax) => {
                        return Err(CanopyError::InvalidInput(format!(
                            "tree {t} carries counting leaves, unsupported under softargmax voting"
                        )));
                    }
                    _ => {}
                }
            }
        }

        Ok(Self { trees, voting })
    }

    #[inline]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn voting(&self) -> VotingScheme {
        self.voting
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.trees[0].dimension()
    }

    /// The shared label array, owned by the first tree.
    #[inline]
    pub fn labels(&self) -> &[String] {
        self.trees[0].labels()
    }

    #[inline]
    pub fn n_labels(&self) -> usize {
        self.trees[0].n_labels()
    }

    /// Deepest root-to-leaf path over all member trees.
    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(DecisionTree::max_depth).max().unwrap_or(0)
    }

    /// Largest per-tree leaf count.
    pub fn max_leaves(&self) -> usize {
        self.trees.iter().map(DecisionTree::n_leaves).max().unwrap_or(0)
    }

    /// The forest's voted score vector for a sample.
    pub fn decision_function(&self, x: &[f64]) -> Result<Vec<f64>> {
        let k = self.n_labels();
        let mut scores = vec![0.0; k];

        match self.voting {
            VotingScheme::Max => {
                for tree in &self.trees {
                    let tree_scores = tree.decision_function(x)?;
                    let max = tree_scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    for (s, &ts) in scores.iter_mut().zip(&tree_scores) {
                        if ts == max {
                            *s += 1.0;
                        }
                    }
                }
            }
            VotingScheme::Average => {
                let t = self.trees.len() as f64;
                for tree in &self.trees {
                    let tree_scores = tree.decision_function(x)?;
                    for (s, &ts) in scores.iter_mut().zip(&tree_scores) {
                        *s += ts / t;
                    }
                }
            }
            VotingScheme::Softargmax => {
                for tree in &self.trees {
                    let tree_scores = tree.decision_function(x)?;
                    for (s, &ts) in scores.iter_mut().zip(&tree_scores) {
                        *s += ts;
                    }
                }
                let total: f64 = scores.iter().map(|&s| s.exp()).sum();
                for s in &mut scores {
                    *s = s.exp() / total;
                }
            }
        }

        Ok(scores)
    }

    /// The argmax label set of the voted scores.
    pub fn classify(&self, x: &[f64]) -> Result<LabelSet> {
        Ok(argmax_set(&self.decision_function(x)?))
    }
}
