//! Classifier facade over single trees and forests.

use crate::forest::Forest;
use crate::tree::DecisionTree;
use canopy_core::{LabelSet, Result};
use serde::{Deserialize, Serialize};

/// A trained classifier: either one decision tree or a forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Classifier {
    Tree(DecisionTree),
    Forest(Forest),
}

impl Classifier {
    pub fn dimension(&self) -> usize {
        match self {
            Classifier::Tree(t) => t.dimension(),
            Classifier::Forest(f) => f.dimension(),
        }
    }

    pub fn labels(&self) -> &[String] {
        match self {
            Classifier::Tree(t) => t.labels(),
            Classifier::Forest(f) => f.labels(),
        }
    }

    pub fn n_labels(&self) -> usize {
        self.labels().len()
    }

    /// Index of a label by name, if present.
    pub fn label_index(&self, name: &str) -> Option<usize> {
        self.labels().iter().position(|l| l == name)
    }

    /// Render a label set through this classifier's label names.
    pub fn label_names(&self, set: &LabelSet) -> Vec<&str> {
        set.iter().map(|i| self.labels()[i].as_str()).collect()
    }

    pub fn decision_function(&self, x: &[f64]) -> Result<Vec<f64>> {
        match self {
            Classifier::Tree(t) => t.decision_function(x),
            Classifier::Forest(f) => f.decision_function(x),
        }
    }

    pub fn classify(&self, x: &[f64]) -> Result<LabelSet> {
        match self {
            Classifier::Tree(t) => t.classify(x),
            Classifier::Forest(f) => f.classify(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::VotingScheme;

    fn stump() -> DecisionTree {
        let mut b = DecisionTree::builder(1, vec!["A".into(), "B".into()]);
        let left = b.leaf(vec![10, 0]).unwrap();
        let right = b.leaf(vec![0, 10]).unwrap();
        let root = b.split(0, 0.5, left, right).unwrap();
        b.build(root).unwrap()
    }

    #[test]
    fn dispatches_to_tree_and_forest() {
        let tree = Classifier::Tree(stump());
        let forest =
            Classifier::Forest(Forest::new(vec![stump(), stump()], VotingScheme::Max).unwrap());
        for c in [&tree, &forest] {
            assert_eq!(c.dimension(), 1);
            assert_eq!(c.n_labels(), 2);
            let labels = c.classify(&[0.0]).unwrap();
            assert!(labels.contains(0) && labels.is_singleton());
        }
    }

    #[test]
    fn label_lookup() {
        let c = Classifier::Tree(stump());
        assert_eq!(c.label_index("B"), Some(1));
        assert_eq!(c.label_index("Z"), None);
        let set = c.classify(&[1.0]).unwrap();
        assert_eq!(c.label_names(&set), vec!["B"]);
    }
}
