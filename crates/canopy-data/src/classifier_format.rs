//! The plain-text classifier format.
//!
//! A decision tree is stored as a header followed by a pre-order node
//! list:
//!
//! ```text
//! classifier-decision-tree
//! <space_size> <n_labels>
//! <label_0> ... <label_{K-1}>
//! SPLIT <feature> <threshold>
//!   <left subtree>
//!   <right subtree>
//! LEAF <count_0> ... <count_{K-1}>
//! LEAF_LOGARITHMIC <score_0> ... <score_{K-1}>
//! ```
//!
//! A forest is `classifier-forest <n_trees>` followed by that many tree
//! blocks. Tokens are whitespace-separated; line structure is free-form.

use crate::{DataError, Result};
use canopy_model::{Classifier, DecisionTree, Forest, Node, NodeId, TreeBuilder, VotingScheme};
use std::path::Path;

/// Whitespace token stream that remembers source lines for diagnostics.
struct Tokens<'a> {
    tokens: Vec<(usize, &'a str)>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let mut tokens = Vec::new();
        for (i, line) in text.lines().enumerate() {
            for token in line.split_whitespace() {
                tokens.push((i + 1, token));
            }
        }
        Self { tokens, pos: 0 }
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|&(line, _)| line)
            .unwrap_or(0)
    }

    fn next(&mut self, expected: &str) -> Result<&'a str> {
        match self.tokens.get(self.pos) {
            Some(&(_, token)) => {
                self.pos += 1;
                Ok(token)
            }
            None => Err(DataError::parse(
                self.line(),
                format!("unexpected end of input, expected {expected}"),
            )),
        }
    }

    fn next_usize(&mut self, expected: &str) -> Result<usize> {
        let line = self.line();
        let token = self.next(expected)?;
        token
            .parse()
            .map_err(|_| DataError::parse(line, format!("expected {expected}, got `{token}`")))
    }

    fn next_u32(&mut self, expected: &str) -> Result<u32> {
        let line = self.line();
        let token = self.next(expected)?;
        token
            .parse()
            .map_err(|_| DataError::parse(line, format!("expected {expected}, got `{token}`")))
    }

    fn next_f64(&mut self, expected: &str) -> Result<f64> {
        let line = self.line();
        let token = self.next(expected)?;
        token
            .parse()
            .map_err(|_| DataError::parse(line, format!("expected {expected}, got `{token}`")))
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

fn parse_node(tokens: &mut Tokens, builder: &mut TreeBuilder, n_labels: usize) -> Result<NodeId> {
    let line = tokens.line();
    let kind = tokens.next("a node kind")?;
    match kind {
        "LEAF" => {
            let mut counts = Vec::with_capacity(n_labels);
            for _ in 0..n_labels {
                counts.push(tokens.next_u32("a leaf count")?);
            }
            Ok(builder.leaf(counts)?)
        }
        "LEAF_LOGARITHMIC" => {
            let mut scores = Vec::with_capacity(n_labels);
            for _ in 0..n_labels {
                scores.push(tokens.next_f64("a log-probability")?);
            }
            Ok(builder.log_leaf(scores, 1.0)?)
        }
        "SPLIT" => {
            let feature = tokens.next_usize("a feature index")?;
            let threshold = tokens.next_f64("a split threshold")?;
            let left = parse_node(tokens, builder, n_labels)?;
            let right = parse_node(tokens, builder, n_labels)?;
            Ok(builder.split(feature, threshold, left, right)?)
        }
        other => Err(DataError::parse(
            line,
            format!("unknown node kind `{other}`"),
        )),
    }
}

fn parse_tree(tokens: &mut Tokens) -> Result<DecisionTree> {
    let line = tokens.line();
    let header = tokens.next("`classifier-decision-tree`")?;
    if header != "classifier-decision-tree" {
        return Err(DataError::parse(
            line,
            format!("expected `classifier-decision-tree`, got `{header}`"),
        ));
    }

    let dimension = tokens.next_usize("the feature-space size")?;
    let n_labels = tokens.next_usize("the number of labels")?;
    let mut labels = Vec::with_capacity(n_labels);
    for _ in 0..n_labels {
        labels.push(tokens.next("a label")?.to_string());
    }

    let mut builder = DecisionTree::builder(dimension, labels);
    let root = parse_node(tokens, &mut builder, n_labels)?;
    Ok(builder.build(root)?)
}

/// Parse a classifier from its text representation.
///
/// The stored format does not carry the voting scheme; the caller picks
/// one and its leaf-representation precondition is validated here.
pub fn read_classifier(text: &str, voting: VotingScheme) -> Result<Classifier> {
    let mut tokens = Tokens::new(text);
    let line = tokens.line();

    let classifier = match tokens.tokens.first().map(|&(_, t)| t) {
        Some("classifier-decision-tree") => Classifier::Tree(parse_tree(&mut tokens)?),
        Some("classifier-forest") => {
            tokens.next("`classifier-forest`")?;
            let n_trees = tokens.next_usize("the number of trees")?;
            let mut trees = Vec::with_capacity(n_trees);
            for _ in 0..n_trees {
                trees.push(parse_tree(&mut tokens)?);
            }
            Classifier::Forest(Forest::new(trees, voting)?)
        }
        Some(other) => {
            return Err(DataError::parse(
                line,
                format!("unsupported classifier type `{other}`"),
            ))
        }
        None => return Err(DataError::parse(0, "empty classifier file")),
    };

    if !tokens.is_exhausted() {
        return Err(DataError::parse(
            tokens.line(),
            "trailing tokens after the classifier",
        ));
    }
    Ok(classifier)
}

pub fn read_classifier_from_path(path: &Path, voting: VotingScheme) -> Result<Classifier> {
    let text = std::fs::read_to_string(path)?;
    read_classifier(&text, voting)
}

fn write_node(out: &mut String, tree: &DecisionTree, id: NodeId, indent: usize) {
    for _ in 0..indent {
        out.push_str("  ");
    }
    match tree.node(id) {
        Node::Leaf { scores, .. } => {
            out.push_str("LEAF");
            for c in scores {
                out.push_str(&format!(" {c}"));
            }
            out.push('\n');
        }
        Node::LogLeaf { scores, .. } => {
            out.push_str("LEAF_LOGARITHMIC");
            for s in scores {
                out.push_str(&format!(" {s}"));
            }
            out.push('\n');
        }
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            out.push_str(&format!("SPLIT {feature} {threshold}\n"));
            write_node(out, tree, *left, indent + 1);
            write_node(out, tree, *right, indent + 1);
        }
    }
}

fn write_tree(out: &mut String, tree: &DecisionTree) {
    out.push_str("classifier-decision-tree\n");
    out.push_str(&format!("{} {}\n", tree.dimension(), tree.n_labels()));
    out.push_str(&tree.labels().join(" "));
    out.push('\n');
    write_node(out, tree, tree.root(), 0);
}

/// Render a classifier back into the text format.
pub fn write_classifier(classifier: &Classifier) -> String {
    let mut out = String::new();
    match classifier {
        Classifier::Tree(tree) => write_tree(&mut out, tree),
        Classifier::Forest(forest) => {
            out.push_str(&format!("classifier-forest {}\n", forest.n_trees()));
            for tree in forest.trees() {
                write_tree(&mut out, tree);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const STUMP: &str = "\
classifier-decision-tree
1 2
A B
SPLIT 0 0.5
  LEAF 10 0
  LEAF 0 10
";

    #[test]
    fn parses_a_decision_tree() {
        let classifier = read_classifier(STUMP, VotingScheme::Max).unwrap();
        let Classifier::Tree(tree) = &classifier else {
            panic!("expected a tree");
        };
        assert_eq!(tree.dimension(), 1);
        assert_eq!(tree.labels(), ["A", "B"]);
        assert_eq!(tree.n_leaves(), 2);
        let labels = classifier.classify(&[0.0]).unwrap();
        assert!(labels.contains(0) && labels.is_singleton());
    }

    #[test]
    fn parses_a_forest() {
        let text = format!("classifier-forest 2\n{STUMP}{STUMP}");
        let classifier = read_classifier(&text, VotingScheme::Max).unwrap();
        let Classifier::Forest(forest) = &classifier else {
            panic!("expected a forest");
        };
        assert_eq!(forest.n_trees(), 2);
        assert_eq!(forest.voting(), VotingScheme::Max);
    }

    #[test]
    fn parses_logarithmic_leaves() {
        let text = "\
classifier-decision-tree
1 2
A B
SPLIT 0 0.5
  LEAF_LOGARITHMIC -0.1 -2.3
  LEAF_LOGARITHMIC -2.3 -0.1
";
        let forest_text = format!("classifier-forest 1\n{text}");
        let classifier = read_classifier(&forest_text, VotingScheme::Softargmax).unwrap();
        let labels = classifier.classify(&[1.0]).unwrap();
        assert!(labels.contains(1) && labels.is_singleton());
    }

    #[test]
    fn voting_scheme_mismatch_is_invalid_input() {
        let text = format!("classifier-forest 1\n{STUMP}");
        let err = read_classifier(&text, VotingScheme::Softargmax).unwrap_err();
        assert!(matches!(err, DataError::Invalid(_)));
    }

    #[test]
    fn reports_the_failing_line() {
        let text = "\
classifier-decision-tree
1 2
A B
SPLIT 0 oops
  LEAF 10 0
  LEAF 0 10
";
        let err = read_classifier(text, VotingScheme::Max).unwrap_err();
        match err {
            DataError::Parse { line, message } => {
                assert_eq!(line, 4);
                assert!(message.contains("oops"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_unknown_headers_and_trailing_tokens() {
        assert!(read_classifier("classifier-svm 1", VotingScheme::Max).is_err());
        assert!(read_classifier("", VotingScheme::Max).is_err());
        let trailing = format!("{STUMP}LEAF 1 0\n");
        assert!(read_classifier(&trailing, VotingScheme::Max).is_err());
    }

    #[test]
    fn truncated_input_is_rejected() {
        let text = "\
classifier-decision-tree
1 2
A B
SPLIT 0 0.5
  LEAF 10 0
";
        assert!(read_classifier(text, VotingScheme::Max).is_err());
    }

    #[test]
    fn round_trips_through_the_writer() {
        let text = format!("classifier-forest 2\n{STUMP}{STUMP}");
        let classifier = read_classifier(&text, VotingScheme::Max).unwrap();
        let written = write_classifier(&classifier);
        let back = read_classifier(&written, VotingScheme::Max).unwrap();
        assert_eq!(
            classifier.classify(&[0.7]).unwrap(),
            back.classify(&[0.7]).unwrap()
        );
    }

    #[test]
    fn reads_from_a_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(STUMP.as_bytes()).unwrap();
        let classifier = read_classifier_from_path(file.path(), VotingScheme::Max).unwrap();
        assert_eq!(classifier.dimension(), 1);
    }
}
