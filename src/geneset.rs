use std::collections::HashSet;

use rand::seq::index;
use rand_chacha::ChaCha8Rng;

use crate::ranked::RankedList;
use crate::{GseaError, Result};

/// An unordered, named collection of feature names.
///
/// Members may or may not appear in a given ranked list; only members that
/// intersect the list participate in scoring (qualification happens in the
/// cohort, not here).
#[derive(Debug, Clone)]
pub struct GeneSet {
    pub name: String,
    members: Vec<String>,
    member_set: HashSet<String>,
}

impl GeneSet {
    /// Create a gene set; duplicate members are collapsed.
    pub fn new(name: &str, members: Vec<String>) -> Result<GeneSet> {
        if members.is_empty() {
            return Err(GseaError::InvalidArgument(format!(
                "gene set '{}' has no members",
                name
            )));
        }

        let mut unique = Vec::with_capacity(members.len());
        let mut member_set = HashSet::with_capacity(members.len());
        for m in members {
            if member_set.insert(m.clone()) {
                unique.push(m);
            }
        }

        Ok(GeneSet {
            name: name.to_string(),
            members: unique,
            member_set,
        })
    }

    pub fn num_members(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.member_set.contains(feature)
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Draw a set of exactly `size` features sampled without replacement from
    /// the ranked list's universe. Used to synthesize null gene sets.
    pub fn random_from_universe(
        name: &str,
        size: usize,
        universe: &RankedList,
        rng: &mut ChaCha8Rng,
    ) -> Result<GeneSet> {
        if size == 0 || size > universe.len() {
            return Err(GseaError::InvalidArgument(format!(
                "cannot draw {} features from a universe of {}",
                size,
                universe.len()
            )));
        }

        let picked = index::sample(rng, universe.len(), size)
            .into_iter()
            .map(|r| universe.rank_name(r).to_string())
            .collect();

        GeneSet::new(name, picked)
    }
}
