use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{GseaError, Result};

/// Which value of a feature score drives the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortMode {
    /// Sort on the signed score.
    Real,
    /// Sort on the absolute score.
    Abs,
}

/// Direction of the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Descending,
    Ascending,
}

/// An ordered list of (feature name, score) pairs.
///
/// Index 0 is the most extreme position on one side of the ranking and
/// `len() - 1` the most extreme on the other, depending on the [`Order`]
/// used to build it. Names are unique and scores finite; both are checked
/// at construction. Immutable once built.
#[derive(Debug, Clone)]
pub struct RankedList {
    pub name: String,
    names: Vec<String>,
    scores: Vec<f32>,
    index_of: HashMap<String, usize>,
}

impl RankedList {
    /// Build a ranked list from already-ordered pairs.
    pub fn new(name: &str, pairs: Vec<(String, f32)>) -> Result<RankedList> {
        if pairs.is_empty() {
            return Err(GseaError::InvalidArgument(format!(
                "ranked list '{}' is empty",
                name
            )));
        }

        let mut names = Vec::with_capacity(pairs.len());
        let mut scores = Vec::with_capacity(pairs.len());
        let mut index_of = HashMap::with_capacity(pairs.len());

        for (r, (feature, score)) in pairs.into_iter().enumerate() {
            if !score.is_finite() {
                return Err(GseaError::InvalidArgument(format!(
                    "ranked list '{}': non-finite score {} for feature '{}'",
                    name, score, feature
                )));
            }
            if index_of.insert(feature.clone(), r).is_some() {
                return Err(GseaError::InvalidArgument(format!(
                    "ranked list '{}': duplicate feature '{}'",
                    name, feature
                )));
            }
            names.push(feature);
            scores.push(score);
        }

        Ok(RankedList {
            name: name.to_string(),
            names,
            scores,
            index_of,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Feature name at rank `r`.
    pub fn rank_name(&self, r: usize) -> &str {
        &self.names[r]
    }

    /// Score at rank `r`.
    pub fn score(&self, r: usize) -> f32 {
        self.scores[r]
    }

    /// Rank of a feature, if it is in the list.
    pub fn rank_of(&self, feature: &str) -> Option<usize> {
        self.index_of.get(feature).copied()
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.index_of.contains_key(feature)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }
}
