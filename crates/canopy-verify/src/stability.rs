//! Stability verification by best-first region refinement.
//!
//! The forest verifier explores a tree of *decorators*. A decorator fixes
//! one leaf in each of the first `depth` trees and carries the
//! hyperrectangle of points compatible with those choices. Refining a
//! decorator walks the next tree, splitting the region at every crossed
//! guard, and yields one child per reachable leaf. A child whose
//! overapproximated label set is disjoint from the reference labels is a
//! counterexample region; one whose label set equals the reference labels
//! cannot change the verdict and is dropped; the rest feed the outer
//! best-first frontier.
//!
//! The analysis ends in one of three ways: a counterexample (UNSTABLE),
//! frontier exhaustion (STABLE), or the per-sample wall clock running out
//! (UNKNOWN). The timeout is observed cooperatively between refinement
//! steps, never mid-step.

use crate::reach::Scratch;
use crate::score::{labels_from_scores, overapproximate};
use crate::search::{best_first_search, depth_first_search, PriorityQueue};
use crate::tier::Tier;
use canopy_core::{
    CanopyError, Hyperrectangle, LabelSet, Result, StabilityReport, Witness,
};
use canopy_model::{Classifier, DecisionTree, Forest, Node, NodeId};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Smallest step past a split threshold when clamping the right-hand
/// region.
const EPSILON: f64 = 1e-12;

/// Coefficients of the best-first priority
/// `volume_weight * volume + depth_weight * depth + divergence_weight * divergence`,
/// where `divergence` is the fraction of a decorator's labels that fall
/// outside the reference label set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub volume_weight: f64,
    pub depth_weight: f64,
    pub divergence_weight: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            volume_weight: -1e6,
            depth_weight: 1.0,
            divergence_weight: 1.0,
        }
    }
}

/// Per-sample analysis budget and tuning.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub timeout: Duration,
    pub params: SearchParams,
}

impl AnalysisOptions {
    /// A per-sample wall-clock budget of at least one second.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        if timeout_secs == 0 {
            return Err(CanopyError::InvalidInput(
                "per-sample timeout must be at least one second".into(),
            ));
        }
        Ok(Self {
            timeout: Duration::from_secs(timeout_secs),
            params: SearchParams::default(),
        })
    }

    pub fn with_params(mut self, params: SearchParams) -> Self {
        self.params = params;
        self
    }
}

/// A refinement-search node: a prefix of fixed per-tree leaves and the
/// region it induces. Parents are arena indices; the whole arena is
/// dropped at the end of a sample's analysis.
struct Decorator {
    /// Consumed (taken) when the decorator is expanded or retired.
    region: Option<Hyperrectangle>,
    /// Leaf fixed in tree `depth - 1`; `None` only for the root.
    leaf: Option<NodeId>,
    parent: Option<usize>,
    /// Number of trees whose leaf is fixed.
    depth: usize,
    /// Overapproximated label set of the region.
    labels: LabelSet,
}

enum Finding {
    None,
    Counterexample(Witness),
    TimedOut,
}

struct ForestAnalysis<'a> {
    forest: &'a Forest,
    tier: &'a Tier,
    params: SearchParams,
    labels_a: &'a LabelSet,
    scratch: &'a mut Scratch,
    arena: Vec<Decorator>,
    start: Instant,
    timeout: Duration,
    finding: Finding,
    expansions: u64,
}

/// Collect the fixed-leaf chain of a decorator into `chain`, ordered by
/// tree index.
fn collect_chain(arena: &[Decorator], idx: usize, chain: &mut Vec<NodeId>) {
    chain.clear();
    let mut cursor = Some(idx);
    while let Some(i) = cursor {
        if let Some(leaf) = arena[i].leaf {
            chain.push(leaf);
        }
        cursor = arena[i].parent;
    }
    chain.reverse();
}

fn forest_is_complete(_idx: &usize, ctx: &mut ForestAnalysis) -> bool {
    if !matches!(ctx.finding, Finding::None) {
        return true;
    }
    if ctx.start.elapsed() > ctx.timeout {
        ctx.finding = Finding::TimedOut;
        return true;
    }
    false
}

/// One branch of the within-tree traversal: the working region and the
/// tree node it has reached.
struct Branch {
    region: Hyperrectangle,
    node: NodeId,
    node_depth: usize,
}

/// A guard `x <= threshold` pins a 0/1 one-hot feature only when the
/// threshold separates 0 from 1; anywhere else both categorical values
/// fall on the same side and no tier conclusion can be drawn.
#[inline]
fn pins_unit_feature(threshold: f64) -> bool {
    (0.0..1.0).contains(&threshold)
}

fn forest_refine(idx: usize, ctx: &mut ForestAnalysis, out: &mut Vec<usize>) {
    ctx.expansions += 1;
    let depth = ctx.arena[idx].depth;

    // Every tree fixed: the label set is exact over the region.
    if depth == ctx.forest.n_trees() {
        if ctx.arena[idx].labels != *ctx.labels_a {
            let region = ctx.arena[idx]
                .region
                .take()
                .expect("terminal decorator lost its region");
            ctx.finding = Finding::Counterexample(Witness {
                point: region.midpoint(),
                region,
            });
        } else {
            ctx.arena[idx].region = None;
        }
        return;
    }

    let tree = &ctx.forest.trees()[depth];
    let base = ctx.arena[idx]
        .region
        .take()
        .expect("decorator region already consumed");

    let mut queue: PriorityQueue<Branch> = PriorityQueue::new();
    queue.push(
        Branch {
            region: base,
            node: tree.root(),
            node_depth: 0,
        },
        0.0,
    );

    while let Some(Branch {
        mut region,
        node,
        node_depth,
    }) = queue.pop()
    {
        match tree.node(node) {
            Node::Leaf { .. } | Node::LogLeaf { .. } => {
                collect_chain(&ctx.arena, idx, &mut ctx.scratch.chain);
                ctx.scratch.chain.push(node);
                let scores = overapproximate(ctx.forest, &region, ctx.scratch);
                labels_from_scores(&scores, &mut ctx.scratch.labels);

                if ctx.scratch.labels.is_disjoint(ctx.labels_a) {
                    ctx.finding = Finding::Counterexample(Witness {
                        point: region.midpoint(),
                        region,
                    });
                    break;
                }
                if ctx.scratch.labels == *ctx.labels_a {
                    // Robust under this leaf; cannot help the search.
                    continue;
                }

                let labels = ctx.scratch.labels.clone();
                ctx.arena.push(Decorator {
                    region: Some(region),
                    leaf: Some(node),
                    parent: Some(idx),
                    depth: depth + 1,
                    labels,
                });
                out.push(ctx.arena.len() - 1);
            }

            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                let (feature, threshold, left, right) = (*feature, *threshold, *left, *right);
                let iv = region.intervals()[feature];
                let radius = iv.radius();
                // Bias the traversal toward the wider side of the cut.
                let left_priority = node_depth as f64
                    + if radius > 0.0 {
                        (threshold - iv.lower) / radius
                    } else {
                        0.0
                    };
                let right_priority = node_depth as f64
                    + if radius > 0.0 {
                        (iv.upper - threshold) / radius
                    } else {
                        0.0
                    };

                let pins = pins_unit_feature(threshold);
                if iv.lower <= threshold && iv.upper > threshold {
                    // The region crosses the cutting hyperplane.
                    let mut right_region = region.clone();

                    region.intervals_mut()[feature].upper = iv.upper.min(threshold);
                    if pins {
                        ctx.tier.adjust(&mut region, feature, false);
                    }
                    if !region.is_bottom() {
                        queue.push(
                            Branch {
                                region,
                                node: left,
                                node_depth: node_depth + 1,
                            },
                            left_priority,
                        );
                    }

                    right_region.intervals_mut()[feature].lower =
                        iv.lower.max(threshold + EPSILON);
                    if pins {
                        ctx.tier.adjust(&mut right_region, feature, true);
                    }
                    if !right_region.is_bottom() {
                        queue.push(
                            Branch {
                                region: right_region,
                                node: right,
                                node_depth: node_depth + 1,
                            },
                            right_priority,
                        );
                    }
                } else if iv.upper <= threshold {
                    if pins {
                        ctx.tier.adjust(&mut region, feature, false);
                    }
                    if !region.is_bottom() {
                        queue.push(
                            Branch {
                                region,
                                node: left,
                                node_depth: node_depth + 1,
                            },
                            left_priority,
                        );
                    }
                } else {
                    if pins {
                        ctx.tier.adjust(&mut region, feature, true);
                    }
                    if !region.is_bottom() {
                        queue.push(
                            Branch {
                                region,
                                node: right,
                                node_depth: node_depth + 1,
                            },
                            right_priority,
                        );
                    }
                }
            }
        }
    }
}

fn forest_priority(idx: &usize, ctx: &mut ForestAnalysis) -> f64 {
    let d = &ctx.arena[*idx];
    let volume = d
        .region
        .as_ref()
        .map(Hyperrectangle::volume)
        .unwrap_or(0.0);
    let outside = d.labels.cardinality() - d.labels.intersection_size(ctx.labels_a);
    let divergence = outside as f64 / ctx.forest.n_labels() as f64;

    ctx.params.volume_weight * volume
        + ctx.params.depth_weight * d.depth as f64
        + ctx.params.divergence_weight * divergence
}

/// Best-first stability verifier for a forest.
pub struct ForestVerifier<'f> {
    forest: &'f Forest,
    tier: Tier,
    options: AnalysisOptions,
    scratch: Scratch,
}

impl<'f> ForestVerifier<'f> {
    pub fn new(forest: &'f Forest, tier: Tier, options: AnalysisOptions) -> Result<Self> {
        tier.check_dimension(forest.dimension())?;
        let scratch = Scratch::for_forest(forest);
        Ok(Self {
            forest,
            tier,
            options,
            scratch,
        })
    }

    /// Verify stability over `region`, taking the region midpoint as the
    /// reference sample.
    pub fn verify(&mut self, region: &Hyperrectangle) -> Result<StabilityReport> {
        let sample = region.midpoint();
        let labels = self.forest.classify(&sample)?;
        self.verify_sample(&sample, labels, region)
    }

    /// Verify that every point of `region` receives exactly `labels_a`,
    /// the classifier's label set on `sample`.
    pub fn verify_sample(
        &mut self,
        sample: &[f64],
        labels_a: LabelSet,
        region: &Hyperrectangle,
    ) -> Result<StabilityReport> {
        if region.dimension() != self.forest.dimension() {
            return Err(CanopyError::DimensionMismatch {
                expected: self.forest.dimension(),
                got: region.dimension(),
            });
        }
        if region.is_bottom() {
            return Err(CanopyError::InvalidInput(
                "adversarial region is empty".into(),
            ));
        }

        let start = Instant::now();

        // Root decorator: nothing fixed, the whole region.
        self.scratch.chain.clear();
        let scores = overapproximate(self.forest, region, &mut self.scratch);
        labels_from_scores(&scores, &mut self.scratch.labels);
        let root = Decorator {
            region: Some(region.clone()),
            leaf: None,
            parent: None,
            depth: 0,
            labels: self.scratch.labels.clone(),
        };

        let mut ctx = ForestAnalysis {
            forest: self.forest,
            tier: &self.tier,
            params: self.options.params,
            labels_a: &labels_a,
            scratch: &mut self.scratch,
            arena: vec![root],
            start,
            timeout: self.options.timeout,
            finding: Finding::None,
            expansions: 0,
        };

        best_first_search(0usize, &mut ctx, forest_is_complete, forest_refine, forest_priority);

        let expansions = ctx.expansions;
        let decorators = ctx.arena.len();
        let report = match ctx.finding {
            Finding::None => StabilityReport::stable(sample.to_vec(), labels_a),
            Finding::Counterexample(witness) => {
                StabilityReport::unstable(sample.to_vec(), labels_a, witness)
            }
            Finding::TimedOut => StabilityReport::unknown(sample.to_vec(), labels_a),
        };

        debug!(
            verdict = %report.verdict,
            expansions,
            decorators,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "forest stability analysis finished"
        );
        Ok(report)
    }
}

struct TreeAnalysis<'a> {
    tree: &'a DecisionTree,
    tier: &'a Tier,
    labels_a: &'a LabelSet,
    labels: LabelSet,
    start: Instant,
    timeout: Duration,
    finding: Finding,
}

/// Label set of a single leaf: every label tying for the maximum.
fn leaf_labels(node: &Node, out: &mut LabelSet) {
    out.clear();
    match node {
        Node::Leaf {
            scores, max_score, ..
        } => {
            for (i, &c) in scores.iter().enumerate() {
                if c == *max_score {
                    out.insert(i);
                }
            }
        }
        Node::LogLeaf { scores, .. } => {
            let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            for (i, &s) in scores.iter().enumerate() {
                if s == max {
                    out.insert(i);
                }
            }
        }
        Node::Split { .. } => unreachable!("leaf_labels on a split node"),
    }
}

fn tree_is_goal(node: &(NodeId, Hyperrectangle), ctx: &mut TreeAnalysis) -> bool {
    if ctx.start.elapsed() > ctx.timeout {
        ctx.finding = Finding::TimedOut;
        return true;
    }

    let (id, region) = node;
    let n = ctx.tree.node(*id);
    if n.is_leaf() {
        leaf_labels(n, &mut ctx.labels);
        if ctx.labels != *ctx.labels_a {
            ctx.finding = Finding::Counterexample(Witness {
                point: region.midpoint(),
                region: region.clone(),
            });
            return true;
        }
    }
    false
}

fn tree_expand(
    node: (NodeId, Hyperrectangle),
    ctx: &mut TreeAnalysis,
    out: &mut Vec<(NodeId, Hyperrectangle)>,
) {
    let (id, region) = node;
    if let Node::Split {
        feature,
        threshold,
        left,
        right,
    } = ctx.tree.node(id)
    {
        let (feature, threshold, left, right) = (*feature, *threshold, *left, *right);
        let iv = region.intervals()[feature];
        let pins = pins_unit_feature(threshold);

        if iv.lower <= threshold {
            let mut left_region = region.clone();
            left_region.intervals_mut()[feature].upper = iv.upper.min(threshold);
            if pins {
                ctx.tier.adjust(&mut left_region, feature, false);
            }
            if !left_region.is_bottom() {
                out.push((left, left_region));
            }
        }
        if iv.upper > threshold {
            let mut right_region = region;
            right_region.intervals_mut()[feature].lower = iv.lower.max(threshold + EPSILON);
            if pins {
                ctx.tier.adjust(&mut right_region, feature, true);
            }
            if !right_region.is_bottom() {
                out.push((right, right_region));
            }
        }
    }
}

/// Depth-first stability verifier for a single decision tree.
///
/// The degenerate case of the forest machinery: with one tree the leaf
/// label sets are exact, so a complete depth-first enumeration of the
/// leaves reachable under the (path-refined) region decides stability
/// outright.
pub struct TreeVerifier<'t> {
    tree: &'t DecisionTree,
    tier: Tier,
    options: AnalysisOptions,
}

impl<'t> TreeVerifier<'t> {
    pub fn new(tree: &'t DecisionTree, tier: Tier, options: AnalysisOptions) -> Result<Self> {
        tier.check_dimension(tree.dimension())?;
        Ok(Self {
            tree,
            tier,
            options,
        })
    }

    pub fn verify(&mut self, region: &Hyperrectangle) -> Result<StabilityReport> {
        let sample = region.midpoint();
        let labels = self.tree.classify(&sample)?;
        self.verify_sample(&sample, labels, region)
    }

    pub fn verify_sample(
        &mut self,
        sample: &[f64],
        labels_a: LabelSet,
        region: &Hyperrectangle,
    ) -> Result<StabilityReport> {
        if region.dimension() != self.tree.dimension() {
            return Err(CanopyError::DimensionMismatch {
                expected: self.tree.dimension(),
                got: region.dimension(),
            });
        }
        if region.is_bottom() {
            return Err(CanopyError::InvalidInput(
                "adversarial region is empty".into(),
            ));
        }

        let start = Instant::now();
        let mut ctx = TreeAnalysis {
            tree: self.tree,
            tier: &self.tier,
            labels_a: &labels_a,
            labels: LabelSet::empty(self.tree.n_labels()),
            start,
            timeout: self.options.timeout,
            finding: Finding::None,
        };

        depth_first_search(
            (self.tree.root(), region.clone()),
            &mut ctx,
            tree_is_goal,
            tree_expand,
        );

        let report = match ctx.finding {
            Finding::None => StabilityReport::stable(sample.to_vec(), labels_a),
            Finding::Counterexample(witness) => {
                StabilityReport::unstable(sample.to_vec(), labels_a, witness)
            }
            Finding::TimedOut => StabilityReport::unknown(sample.to_vec(), labels_a),
        };

        trace!(
            verdict = %report.verdict,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tree stability analysis finished"
        );
        Ok(report)
    }
}

/// Stability verifier over any classifier.
pub enum StabilityVerifier<'c> {
    Tree(TreeVerifier<'c>),
    Forest(ForestVerifier<'c>),
}

impl<'c> StabilityVerifier<'c> {
    pub fn new(classifier: &'c Classifier, tier: Tier, options: AnalysisOptions) -> Result<Self> {
        Ok(match classifier {
            Classifier::Tree(tree) => {
                StabilityVerifier::Tree(TreeVerifier::new(tree, tier, options)?)
            }
            Classifier::Forest(forest) => {
                StabilityVerifier::Forest(ForestVerifier::new(forest, tier, options)?)
            }
        })
    }

    pub fn verify(&mut self, region: &Hyperrectangle) -> Result<StabilityReport> {
        match self {
            StabilityVerifier::Tree(v) => v.verify(region),
            StabilityVerifier::Forest(v) => v.verify(region),
        }
    }

    pub fn verify_sample(
        &mut self,
        sample: &[f64],
        labels_a: LabelSet,
        region: &Hyperrectangle,
    ) -> Result<StabilityReport> {
        match self {
            StabilityVerifier::Tree(v) => v.verify_sample(sample, labels_a, region),
            StabilityVerifier::Forest(v) => v.verify_sample(sample, labels_a, region),
        }
    }
}
