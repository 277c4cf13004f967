//! Reachable-leaf enumeration.
//!
//! A leaf is reachable under a hyperrectangle when the conjunction of
//! guard constraints on its root path is jointly satisfiable with the
//! region. The walk is iterative over an explicit stack; both the stack
//! and the leaf list live in [`Scratch`], sized once per analysis and
//! reused across every refinement step of a sample.

use canopy_core::{Hyperrectangle, LabelSet};
use canopy_model::{DecisionTree, Forest, Node, NodeId};

/// Working buffers for one sample's analysis, reused across refinement
/// steps. Exclusively owned by the verifier that created them.
pub struct Scratch {
    /// Depth-first walk stack; capacity covers the deepest tree.
    pub(crate) stack: Vec<NodeId>,
    /// Reachable leaves of the tree under inspection.
    pub(crate) leaves: Vec<NodeId>,
    /// Per-label vote counts for the MAX overapproximation.
    pub(crate) votes: Vec<u32>,
    /// Fixed-leaf chain of the decorator under inspection.
    pub(crate) chain: Vec<NodeId>,
    /// Reusable label set.
    pub(crate) labels: LabelSet,
}

impl Scratch {
    /// Buffers sized for every tree of a forest.
    pub fn for_forest(forest: &Forest) -> Self {
        Self::with_capacity(
            forest.max_depth(),
            forest.max_leaves(),
            forest.n_trees(),
            forest.n_labels(),
        )
    }

    /// Buffers sized for a single tree.
    pub fn for_tree(tree: &DecisionTree) -> Self {
        Self::with_capacity(tree.max_depth(), tree.n_leaves(), 1, tree.n_labels())
    }

    fn with_capacity(max_depth: usize, max_leaves: usize, n_trees: usize, n_labels: usize) -> Self {
        Self {
            stack: Vec::with_capacity(max_depth + 1),
            leaves: Vec::with_capacity(max_leaves.max(1)),
            votes: vec![0; n_labels],
            chain: Vec::with_capacity(n_trees),
            labels: LabelSet::empty(n_labels),
        }
    }

    /// Fill `self.leaves` with every leaf of `tree` reachable under
    /// `region`.
    ///
    /// The caller must not present a bottom region; an empty result on a
    /// non-bottom region is a bug in the tree.
    pub fn collect_reachable(&mut self, tree: &DecisionTree, region: &Hyperrectangle) {
        debug_assert!(
            !region.is_bottom(),
            "reachable-leaf walk over a bottom region"
        );

        let intervals = region.intervals();
        self.leaves.clear();
        self.stack.clear();
        self.stack.push(tree.root());

        while let Some(id) = self.stack.pop() {
            match tree.node(id) {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let iv = &intervals[*feature];
                    if iv.lower <= *threshold {
                        self.stack.push(*left);
                    }
                    if iv.upper > *threshold {
                        self.stack.push(*right);
                    }
                }
                _ => self.leaves.push(id),
            }
        }

        assert!(
            !self.leaves.is_empty(),
            "no reachable leaf in a non-bottom region"
        );
    }

    /// The leaves collected by the last [`Self::collect_reachable`] call.
    #[inline]
    pub fn reachable(&self) -> &[NodeId] {
        &self.leaves
    }
}
