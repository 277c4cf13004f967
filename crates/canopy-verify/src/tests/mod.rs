
use canopy_model::{DecisionTree, Forest, VotingScheme};

/// Split(x0 <= 0.5) with left Leaf[10, 0] ("A") and right Leaf[0, 10]
/// ("B").
pub(crate) fn stump() -> DecisionTree {
    let mut b = DecisionTree::builder(1, vec!["A".into(), "B".into()]);
    let left = b.leaf(vec![10, 0]).unwrap();
    let right = b.leaf(vec![0, 10]).unwrap();
    let root = b.split(0, 0.5, left, right).unwrap();
    b.build(root).unwrap()
}

/// A forest of `n` identical stumps under MAX voting.
pub(crate) fn stump_forest(n: usize) -> Forest {
    Forest::new((0..n).map(|_| stump()).collect(), VotingScheme::Max).unwrap()
}
