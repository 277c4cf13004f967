//! Dense sets of class labels.
//!
//! A classifier's labels are interned to the indices `0..K`; a [`LabelSet`]
//! is a fixed-universe membership vector over those indices. Equality is
//! element-wise over the whole universe, so two sets compare equal exactly
//! when they contain the same labels.

use serde::{Deserialize, Serialize};

/// A subset of the labels `0..universe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSet {
    members: Vec<bool>,
    cardinality: usize,
}

impl LabelSet {
    /// The empty set over a universe of `universe` labels.
    pub fn empty(universe: usize) -> Self {
        Self {
            members: vec![false; universe],
            cardinality: 0,
        }
    }

    /// The set containing the given label indices.
    pub fn from_indices(universe: usize, indices: &[usize]) -> Self {
        let mut set = Self::empty(universe);
        for &i in indices {
            set.insert(i);
        }
        set
    }

    #[inline]
    pub fn universe(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cardinality == 0
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.cardinality == 1
    }

    #[inline]
    pub fn contains(&self, label: usize) -> bool {
        self.members.get(label).copied().unwrap_or(false)
    }

    /// Add a label. Out-of-universe indices are a programming error.
    pub fn insert(&mut self, label: usize) {
        if !self.members[label] {
            self.members[label] = true;
            self.cardinality += 1;
        }
    }

    pub fn remove(&mut self, label: usize) {
        if self.members[label] {
            self.members[label] = false;
            self.cardinality -= 1;
        }
    }

    /// Empty the set in place, keeping the universe.
    pub fn clear(&mut self) {
        self.members.fill(false);
        self.cardinality = 0;
    }

    /// `true` iff the sets share no label.
    pub fn is_disjoint(&self, other: &LabelSet) -> bool {
        debug_assert_eq!(self.universe(), other.universe());
        self.members
            .iter()
            .zip(&other.members)
            .all(|(&a, &b)| !(a && b))
    }

    /// Number of labels in both sets.
    pub fn intersection_size(&self, other: &LabelSet) -> usize {
        debug_assert_eq!(self.universe(), other.universe());
        self.members
            .iter()
            .zip(&other.members)
            .filter(|&(&a, &b)| a && b)
            .count()
    }

    /// Iterate over member indices in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.members
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
    }
}

impl PartialEq for LabelSet {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

impl Eq for LabelSet {}
