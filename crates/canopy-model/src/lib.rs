//! Tree-ensemble classifier models for canopy.
//!
//! A [`DecisionTree`] stores its nodes in an arena and walks univariate
//! splits of the form `x[i] <= k`; a [`Forest`] aggregates trees under a
//! [`VotingScheme`]; [`Classifier`] is the facade the verifier and the
//! drivers work against.

pub mod classifier;
pub mod forest;
pub mod tree;

pub use classifier::Classifier;
pub use forest::{Forest, VotingScheme};
pub use tree::{DecisionTree, Node, NodeId, TreeBuilder};
