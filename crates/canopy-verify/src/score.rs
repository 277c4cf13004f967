//! Sound interval overapproximation of a forest's score vector over a
//! region.
//!
//! A decorator at depth `d` has fixed one leaf in each of the first `d`
//! trees; those contribute exact point scores. Trees `d..T` are still
//! abstract and contribute an interval per label, derived from the leaves
//! reachable under the decorator's region. The voting scheme decides both
//! parts.

use crate::reach::Scratch;
use canopy_core::{Hyperrectangle, Interval, LabelSet};
use canopy_model::{Forest, Node, VotingScheme};

/// Overapproximate the voted score of every label across a region.
///
/// `scratch.chain` holds the fixed leaves of trees `0..chain.len()`, in
/// tree order; the remaining trees are abstracted under `region`.
pub(crate) fn overapproximate(
    forest: &Forest,
    region: &Hyperrectangle,
    scratch: &mut Scratch,
) -> Vec<Interval> {
    let k = forest.n_labels();
    let mut scores = vec![Interval::point(0.0); k];

    concrete_part(forest, scratch, &mut scores);
    abstract_part(forest, region, scratch, &mut scores);

    if forest.voting() == VotingScheme::Softargmax {
        normalise_softargmax(&mut scores);
    }

    scores
}

/// Exact contribution of the already-fixed leaves.
fn concrete_part(forest: &Forest, scratch: &Scratch, scores: &mut [Interval]) {
    let trees = forest.trees();

    for (t, &leaf) in scratch.chain.iter().enumerate() {
        match (trees[t].node(leaf), forest.voting()) {
            (
                Node::Leaf {
                    scores: counts,
                    max_score,
                    ..
                },
                VotingScheme::Max,
            ) => {
                for (s, &c) in scores.iter_mut().zip(counts) {
                    if c == *max_score {
                        s.lower += 1.0;
                        s.upper += 1.0;
                    }
                }
            }
            (
                Node::Leaf {
                    scores: counts,
                    n_samples,
                    ..
                },
                VotingScheme::Average,
            ) => {
                let t_count = forest.n_trees() as f64;
                for (s, &c) in scores.iter_mut().zip(counts) {
                    let p = f64::from(c) / f64::from(*n_samples) / t_count;
                    *s = s.add(&Interval::point(p));
                }
            }
            (Node::LogLeaf { scores: logs, .. }, VotingScheme::Softargmax) => {
                for (s, &p) in scores.iter_mut().zip(logs) {
                    *s = s.add(&Interval::point(p));
                }
            }
            _ => unreachable!("leaf representation validated at forest construction"),
        }
    }
}

/// Interval contribution of every tree that has not been refined yet.
fn abstract_part(
    forest: &Forest,
    region: &Hyperrectangle,
    scratch: &mut Scratch,
    scores: &mut [Interval],
) {
    let trees = forest.trees();
    let depth = scratch.chain.len();

    for tree in &trees[depth..] {
        scratch.collect_reachable(tree, region);
        match forest.voting() {
            VotingScheme::Max => {
                let n_leaves = scratch.leaves.len() as u32;
                scratch.votes.fill(0);
                for idx in 0..scratch.leaves.len() {
                    if let Node::Leaf {
                        scores: counts,
                        max_score,
                        ..
                    } = tree.node(scratch.leaves[idx])
                    {
                        for (v, &c) in scratch.votes.iter_mut().zip(counts) {
                            if c == *max_score {
                                *v += 1;
                            }
                        }
                    }
                }
                // A tree is certain to vote for a label only when the
                // label is maximal in every reachable leaf; it may vote
                // for it when maximal in at least one.
                for (s, &v) in scores.iter_mut().zip(&scratch.votes) {
                    if v == n_leaves {
                        s.lower += 1.0;
                    }
                    if v > 0 {
                        s.upper += 1.0;
                    }
                }
            }
            VotingScheme::Average => {
                let t_count = forest.n_trees() as f64;
                for (i, s) in scores.iter_mut().enumerate() {
                    let mut lo = f64::INFINITY;
                    let mut hi = f64::NEG_INFINITY;
                    for &leaf in &scratch.leaves {
                        if let Node::Leaf {
                            scores: counts,
                            n_samples,
                            ..
                        } = tree.node(leaf)
                        {
                            let p = f64::from(counts[i]) / f64::from(*n_samples);
                            lo = lo.min(p);
                            hi = hi.max(p);
                        }
                    }
                    *s = s.add(&Interval::new(lo / t_count, hi / t_count));
                }
            }
            VotingScheme::Softargmax => {
                for (i, s) in scores.iter_mut().enumerate() {
                    let mut lo = f64::INFINITY;
                    let mut hi = f64::NEG_INFINITY;
                    for &leaf in &scratch.leaves {
                        if let Node::LogLeaf { scores: logs, .. } = tree.node(leaf) {
                            lo = lo.min(logs[i]);
                            hi = hi.max(logs[i]);
                        }
                    }
                    *s = s.add(&Interval::new(lo, hi));
                }
            }
        }
    }
}

/// Turn accumulated log-probability bounds into probability bounds:
/// each lower bound is divided by the largest possible normaliser and
/// each upper bound by the smallest one.
fn normalise_softargmax(scores: &mut [Interval]) {
    let exps: Vec<Interval> = scores.iter().map(Interval::exp).collect();
    let sum_lower: f64 = exps.iter().map(|e| e.lower).sum();
    let sum_upper: f64 = exps.iter().map(|e| e.upper).sum();
    for (s, e) in scores.iter_mut().zip(&exps) {
        *s = Interval::new(e.lower / sum_upper, e.upper / sum_lower);
    }
}

/// The labels whose score interval is not strictly dominated by any other
/// label's.
pub(crate) fn labels_from_scores(scores: &[Interval], out: &mut LabelSet) {
    out.clear();
    for (i, si) in scores.iter().enumerate() {
        let dominated = scores
            .iter()
            .enumerate()
            .any(|(j, sj)| j != i && si.strictly_below(sj));
        if !dominated {
            out.insert(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_model::DecisionTree;

    fn stump(scores_left: [u32; 2], scores_right: [u32; 2]) -> DecisionTree {
        let mut b = DecisionTree::builder(1, vec!["A".into(), "B".into()]);
        let left = b.leaf(scores_left.to_vec()).unwrap();
        let right = b.leaf(scores_right.to_vec()).unwrap();
        let root = b.split(0, 0.5, left, right).unwrap();
        b.build(root).unwrap()
    }

    fn unit(l: f64, u: f64) -> Hyperrectangle {
        Hyperrectangle::new(vec![Interval::new(l, u)])
    }

    #[test]
    fn max_certain_tree_gives_point_vote() {
        let forest = Forest::new(vec![stump([10, 0], [0, 10])], VotingScheme::Max).unwrap();
        let mut scratch = Scratch::for_forest(&forest);
        // Region entirely on the left: A certainly gets the vote.
        let scores = overapproximate(&forest, &unit(0.0, 0.3), &mut scratch);
        assert_eq!(scores[0], Interval::new(1.0, 1.0));
        assert_eq!(scores[1], Interval::new(0.0, 0.0));
    }

    #[test]
    fn max_crossing_tree_gives_interval_vote() {
        let forest = Forest::new(vec![stump([10, 0], [0, 10])], VotingScheme::Max).unwrap();
        let mut scratch = Scratch::for_forest(&forest);
        let scores = overapproximate(&forest, &unit(0.0, 0.9), &mut scratch);
        // Either leaf may win: both labels get [0, 1].
        assert_eq!(scores[0], Interval::new(0.0, 1.0));
        assert_eq!(scores[1], Interval::new(0.0, 1.0));
    }

    #[test]
    fn fixed_leaf_contributes_concretely() {
        let tree = stump([10, 0], [0, 10]);
        let left = tree.leaf_for(&[0.0]).unwrap();
        let forest = Forest::new(vec![tree], VotingScheme::Max).unwrap();
        let mut scratch = Scratch::for_forest(&forest);
        scratch.chain.push(left);
        let scores = overapproximate(&forest, &unit(0.0, 0.9), &mut scratch);
        assert_eq!(scores[0], Interval::new(1.0, 1.0));
        assert_eq!(scores[1], Interval::new(0.0, 0.0));
    }

    #[test]
    fn average_brackets_probability_range() {
        let forest = Forest::new(vec![stump([3, 1], [1, 3])], VotingScheme::Average).unwrap();
        let mut scratch = Scratch::for_forest(&forest);
        let scores = overapproximate(&forest, &unit(0.0, 0.9), &mut scratch);
        // Label A: 0.75 on the left leaf, 0.25 on the right.
        assert!(scores[0].lower <= 0.25 && scores[0].upper >= 0.75);
        assert!(scores[1].lower <= 0.25 && scores[1].upper >= 0.75);
    }

    #[test]
    fn softargmax_bounds_sum_around_one() {
        let mut b = DecisionTree::builder(1, vec!["A".into(), "B".into()]);
        let left = b.log_leaf(vec![-0.1, -2.3], 1.0).unwrap();
        let right = b.log_leaf(vec![-2.3, -0.1], 1.0).unwrap();
        let root = b.split(0, 0.5, left, right).unwrap();
        let forest = Forest::new(vec![b.build(root).unwrap()], VotingScheme::Softargmax).unwrap();
        let mut scratch = Scratch::for_forest(&forest);

        let scores = overapproximate(&forest, &unit(0.0, 0.3), &mut scratch);
        // One reachable leaf: bounds collapse to the exact softargmax.
        let exact = (-0.1f64).exp() / ((-0.1f64).exp() + (-2.3f64).exp());
        assert!(scores[0].contains(exact));
        assert!(scores[0].radius() < 1e-9);

        let wide = overapproximate(&forest, &unit(0.0, 0.9), &mut scratch);
        assert!(wide[0].lower < scores[0].lower && wide[0].upper >= scores[0].upper);
    }

    #[test]
    fn labels_keep_non_dominated() {
        let mut out = LabelSet::empty(3);
        let scores = vec![
            Interval::new(0.0, 1.0),
            Interval::new(2.0, 3.0),
            Interval::new(2.5, 2.6),
        ];
        labels_from_scores(&scores, &mut out);
        // Label 0 is strictly below both others; 1 and 2 overlap.
        assert!(!out.contains(0));
        assert!(out.contains(1));
        assert!(out.contains(2));
    }

    #[test]
    fn labels_single_winner() {
        let mut out = LabelSet::empty(2);
        let scores = vec![Interval::new(2.0, 2.0), Interval::new(0.0, 1.0)];
        labels_from_scores(&scores, &mut out);
        assert!(out.contains(0) && out.is_singleton());
    }
}
