//! Decision trees over an arena of nodes.
//!
//! Nodes live in a per-tree `Vec` and refer to each other through
//! [`NodeId`] indices, so a tree is a plain value: cloneable, serialisable,
//! and free of parent pointers. Identifiers are meaningful only relative to
//! their tree.

use canopy_core::{CanopyError, LabelSet, Result};
use serde::{Deserialize, Serialize};

/// Index of a node within its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A decision-tree node. The three variants are a closed set and are
/// pattern-matched at every use site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    /// Leaf holding per-label sample counts.
    Leaf {
        scores: Vec<u32>,
        /// Cached `scores.iter().sum()`.
        n_samples: u32,
        /// Cached `scores.iter().max()`.
        max_score: u32,
    },
    /// Leaf holding per-label log-probabilities.
    LogLeaf { scores: Vec<f64>, weight: f64 },
    /// Univariate split `x[feature] <= threshold`: left when the guard
    /// holds, right otherwise.
    Split {
        feature: usize,
        threshold: f64,
        left: NodeId,
        right: NodeId,
    },
}

impl Node {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Node::Split { .. })
    }
}

/// Incrementally assembles a tree's node arena.
///
/// Children must be pushed before the split that references them, so a
/// finished arena is in bottom-up order and the root is pushed last.
pub struct TreeBuilder {
    dimension: usize,
    labels: Vec<String>,
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new(dimension: usize, labels: Vec<String>) -> Self {
        Self {
            dimension,
            labels,
            nodes: Vec::new(),
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Add a counting leaf. The per-label counts must cover every label
    /// and contain at least one sample.
    pub fn leaf(&mut self, scores: Vec<u32>) -> Result<NodeId> {
        if scores.len() != self.labels.len() {
            return Err(CanopyError::InvalidInput(format!(
                "leaf has {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }
        let n_samples = scores.iter().sum::<u32>();
        if n_samples == 0 {
            return Err(CanopyError::InvalidInput(
                "leaf contains no samples".into(),
            ));
        }
        let max_score = scores.iter().copied().max().unwrap_or(0);
        Ok(self.push(Node::Leaf {
            scores,
            n_samples,
            max_score,
        }))
    }

    /// Add a log-probability leaf.
    pub fn log_leaf(&mut self, scores: Vec<f64>, weight: f64) -> Result<NodeId> {
        if scores.len() != self.labels.len() {
            return Err(CanopyError::InvalidInput(format!(
                "log leaf has {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }
        Ok(self.push(Node::LogLeaf { scores, weight }))
    }

    /// Add a split over `x[feature] <= threshold` with two existing
    /// children.
    pub fn split(&mut self, feature: usize, threshold: f64, left: NodeId, right: NodeId) -> Result<NodeId> {
        if feature >= self.dimension {
            return Err(CanopyError::InvalidInput(format!(
                "split on feature {feature} in a {}-dimensional space",
                self.dimension
            )));
        }
        let len = self.nodes.len();
        if left.index() >= len || right.index() >= len {
            return Err(CanopyError::InvalidInput(
                "split references a node that has not been added".into(),
            ));
        }
        Ok(self.push(Node::Split {
            feature,
            threshold,
            left,
            right,
        }))
    }

    /// Finish the tree with the given root.
    pub fn build(self, root: NodeId) -> Result<DecisionTree> {
        if root.index() >= self.nodes.len() {
            return Err(CanopyError::InvalidInput(
                "tree root does not exist".into(),
            ));
        }
        Ok(DecisionTree {
            nodes: self.nodes,
            root,
            dimension: self.dimension,
            labels: self.labels,
        })
    }
}

/// A rooted binary decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    root: NodeId,
    dimension: usize,
    labels: Vec<String>,
}

impl DecisionTree {
    pub fn builder(dimension: usize, labels: Vec<String>) -> TreeBuilder {
        TreeBuilder::new(dimension, labels)
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[inline]
    pub fn n_labels(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaves in the tree.
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Length of the longest root-to-leaf path, in edges.
    pub fn max_depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            match self.node(id) {
                Node::Split { left, right, .. } => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
                _ => deepest = deepest.max(depth),
            }
        }
        deepest
    }

    fn check_sample(&self, x: &[f64]) -> Result<()> {
        if x.len() != self.dimension {
            return Err(CanopyError::DimensionMismatch {
                expected: self.dimension,
                got: x.len(),
            });
        }
        Ok(())
    }

    /// The leaf a concrete sample reaches: descend left on
    /// `x[feature] <= threshold`, right otherwise.
    pub fn leaf_for(&self, x: &[f64]) -> Result<NodeId> {
        self.check_sample(x)?;
        let mut id = self.root;
        while let Node::Split {
            feature,
            threshold,
            left,
            right,
        } = self.node(id)
        {
            id = if x[*feature] <= *threshold { *left } else { *right };
        }
        Ok(id)
    }

    /// Per-label scores for a sample: normalised probabilities for a
    /// counting leaf, stored log-probabilities for a log leaf.
    pub fn decision_function(&self, x: &[f64]) -> Result<Vec<f64>> {
        let leaf = self.leaf_for(x)?;
        Ok(match self.node(leaf) {
            Node::Leaf {
                scores, n_samples, ..
            } => scores
                .iter()
                .map(|&c| f64::from(c) / f64::from(*n_samples))
                .collect(),
            Node::LogLeaf { scores, .. } => scores.clone(),
            Node::Split { .. } => unreachable!("leaf_for returned a split"),
        })
    }

    /// The set of labels tying for the maximum score at the sample's leaf.
    pub fn classify(&self, x: &[f64]) -> Result<LabelSet> {
        let scores = self.decision_function(x)?;
        Ok(argmax_set(&scores))
    }
}

/// Labels tying for the maximum of a score vector.
pub(crate) fn argmax_set(scores: &[f64]) -> LabelSet {
    let mut set = LabelSet::empty(scores.len());
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    for (i, &s) in scores.iter().enumerate() {
        if s == max {
            set.insert(i);
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Split(x0 <= 0.5) with left Leaf[10, 0] and right Leaf[0, 10].
    pub(crate) fn stump() -> DecisionTree {
        let mut b = DecisionTree::builder(1, vec!["A".into(), "B".into()]);
        let left = b.leaf(vec![10, 0]).unwrap();
        let right = b.leaf(vec![0, 10]).unwrap();
        let root = b.split(0, 0.5, left, right).unwrap();
        b.build(root).unwrap()
    }

    #[test]
    fn leaf_caches_counts() {
        let mut b = DecisionTree::builder(1, vec!["A".into(), "B".into()]);
        let id = b.leaf(vec![3, 7]).unwrap();
        let tree = b.build(id).unwrap();
        match tree.node(id) {
            Node::Leaf {
                n_samples,
                max_score,
                ..
            } => {
                assert_eq!(*n_samples, 10);
                assert_eq!(*max_score, 7);
            }
            _ => panic!("expected a leaf"),
        }
    }

    #[test]
    fn builder_rejects_bad_shapes() {
        let mut b = DecisionTree::builder(2, vec!["A".into(), "B".into()]);
        assert!(b.leaf(vec![1, 2, 3]).is_err());
        assert!(b.leaf(vec![0, 0]).is_err());
        let l = b.leaf(vec![1, 0]).unwrap();
        let r = b.leaf(vec![0, 1]).unwrap();
        assert!(b.split(2, 0.0, l, r).is_err());
        assert!(b.split(0, 0.0, l, NodeId(99)).is_err());
    }

    #[test]
    fn classify_follows_guards() {
        let tree = stump();
        let a = tree.classify(&[0.0]).unwrap();
        assert!(a.contains(0) && a.is_singleton());
        // The guard is inclusive on the left.
        let at_threshold = tree.classify(&[0.5]).unwrap();
        assert!(at_threshold.contains(0));
        let b = tree.classify(&[0.51]).unwrap();
        assert!(b.contains(1) && b.is_singleton());
    }

    #[test]
    fn classify_is_deterministic() {
        let tree = stump();
        let x = [0.3];
        assert_eq!(tree.classify(&x).unwrap(), tree.classify(&x).unwrap());
    }

    #[test]
    fn decision_function_normalises_counts() {
        let mut b = DecisionTree::builder(1, vec!["A".into(), "B".into()]);
        let id = b.leaf(vec![3, 1]).unwrap();
        let tree = b.build(id).unwrap();
        assert_eq!(tree.decision_function(&[0.0]).unwrap(), vec![0.75, 0.25]);
    }

    #[test]
    fn log_leaf_scores_pass_through() {
        let mut b = DecisionTree::builder(1, vec!["A".into(), "B".into()]);
        let id = b.log_leaf(vec![-0.1, -2.3], 1.0).unwrap();
        let tree = b.build(id).unwrap();
        assert_eq!(tree.decision_function(&[0.0]).unwrap(), vec![-0.1, -2.3]);
        let labels = tree.classify(&[0.0]).unwrap();
        assert!(labels.contains(0) && labels.is_singleton());
    }

    #[test]
    fn ties_yield_every_maximal_label() {
        let mut b = DecisionTree::builder(1, vec!["A".into(), "B".into(), "C".into()]);
        let id = b.leaf(vec![5, 5, 1]).unwrap();
        let tree = b.build(id).unwrap();
        let labels = tree.classify(&[0.0]).unwrap();
        assert_eq!(labels.cardinality(), 2);
        assert!(labels.contains(0) && labels.contains(1));
    }

    #[test]
    fn depth_and_leaf_count() {
        let tree = stump();
        assert_eq!(tree.max_depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.n_nodes(), 3);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let tree = stump();
        assert!(tree.classify(&[0.0, 1.0]).is_err());
    }
}
