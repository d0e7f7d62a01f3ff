use std::collections::HashMap;

use crate::geneset::GeneSet;
use crate::ranked::RankedList;
use crate::{GseaError, Result};

/// Weight assigned to a qualified member when its total |score|^p mass is
/// zero or non-finite.
pub const FALLBACK_HIT_WEIGHT: f64 = 1e-6;

/// Immutable binding of one ranked list and K gene sets, with everything the
/// scoring pass needs precomputed.
///
/// Qualification restricts each gene set to the members present in the
/// ranked list. Per set g the cohort holds the hit weight of every qualified
/// member (`|score|^p / Z_g` with `Z_g = sum of |score_j|^p` over qualified
/// members), the scalar miss weight `1 / (L - num_true(g))`, and an inverted
/// index from rank position to the sets containing that feature. Tables are
/// rank-indexed internally; the cohort binds exactly one list, so feature
/// name lookups precompose with the list's rank map.
///
/// A set whose qualified membership is empty is an error: the scoring kernel
/// assumes `num_true(g) > 0` for every set it sees.
#[derive(Debug)]
pub struct GeneSetCohort<'a> {
    ranked_list: &'a RankedList,
    gene_sets: &'a [GeneSet],
    weight_exponent: f64,
    hit_weights: Vec<HashMap<usize, f64>>,
    miss_weights: Vec<f64>,
    num_true: Vec<usize>,
    sets_at_rank: Vec<Vec<u32>>,
}

impl<'a> GeneSetCohort<'a> {
    /// Bind `gene_sets` to `ranked_list`, qualifying members and precomputing
    /// all weight tables. `weight_exponent` is the metric's p (1.0 for the
    /// classic weighted statistic, 0.0 for the unweighted one).
    pub fn new(
        ranked_list: &'a RankedList,
        gene_sets: &'a [GeneSet],
        weight_exponent: f64,
    ) -> Result<GeneSetCohort<'a>> {
        if gene_sets.is_empty() {
            return Err(GseaError::InvalidArgument(
                "cohort needs at least one gene set".to_string(),
            ));
        }

        let num_labels = ranked_list.len();
        let mut hit_weights = Vec::with_capacity(gene_sets.len());
        let mut miss_weights = Vec::with_capacity(gene_sets.len());
        let mut num_true = Vec::with_capacity(gene_sets.len());
        let mut sets_at_rank: Vec<Vec<u32>> = vec![Vec::new(); num_labels];

        for (g, gs) in gene_sets.iter().enumerate() {
            let mut ranks: Vec<usize> = gs
                .members()
                .iter()
                .filter_map(|m| ranked_list.rank_of(m))
                .collect();
            ranks.sort_unstable();

            if ranks.is_empty() {
                return Err(GseaError::GeneSetDegenerate(gs.name.clone()));
            }

            let total: f64 = ranks
                .iter()
                .map(|&r| (ranked_list.score(r).abs() as f64).powf(weight_exponent))
                .sum();

            let mut weights = HashMap::with_capacity(ranks.len());
            if total.is_finite() && total > 0.0 {
                for &r in &ranks {
                    let w = (ranked_list.score(r).abs() as f64).powf(weight_exponent) / total;
                    weights.insert(r, w);
                }
            } else {
                for &r in &ranks {
                    weights.insert(r, FALLBACK_HIT_WEIGHT);
                }
            }

            let q = ranks.len();
            // a set covering the whole list can never miss
            let miss = if num_labels > q {
                1.0 / (num_labels - q) as f64
            } else {
                0.0
            };

            for &r in &ranks {
                sets_at_rank[r].push(g as u32);
            }

            hit_weights.push(weights);
            miss_weights.push(miss);
            num_true.push(q);
        }

        Ok(GeneSetCohort {
            ranked_list,
            gene_sets,
            weight_exponent,
            hit_weights,
            miss_weights,
            num_true,
            sets_at_rank,
        })
    }

    /// New cohort over the same ranked list with different gene sets.
    /// Amortizes setup when only the sets change (gene-set shuffling).
    pub fn clone_with_gene_sets<'b>(
        &self,
        gene_sets: &'b [GeneSet],
    ) -> Result<GeneSetCohort<'b>>
    where
        'a: 'b,
    {
        GeneSetCohort::new(self.ranked_list, gene_sets, self.weight_exponent)
    }

    pub fn ranked_list(&self) -> &RankedList {
        self.ranked_list
    }

    pub fn num_gene_sets(&self) -> usize {
        self.gene_sets.len()
    }

    /// Length of the bound ranked list.
    pub fn num_labels(&self) -> usize {
        self.ranked_list.len()
    }

    pub fn gene_set(&self, g: usize) -> &GeneSet {
        &self.gene_sets[g]
    }

    pub fn gene_sets(&self) -> &[GeneSet] {
        self.gene_sets
    }

    /// Number of qualified members of set `g`.
    pub fn num_true(&self, g: usize) -> usize {
        self.num_true[g]
    }

    /// True iff `feature` is a qualified member of set `g`.
    pub fn is_member(&self, g: usize, feature: &str) -> bool {
        match self.ranked_list.rank_of(feature) {
            Some(r) => self.is_member_at(g, r),
            None => false,
        }
    }

    /// Hit weight of `feature` in set `g`, if it is a qualified member.
    pub fn hit_points(&self, g: usize, feature: &str) -> Option<f64> {
        self.ranked_list
            .rank_of(feature)
            .and_then(|r| self.hit_weights[g].get(&r).copied())
    }

    /// Weight subtracted from set `g`'s running score per miss.
    pub fn miss_points(&self, g: usize) -> f64 {
        self.miss_weights[g]
    }

    /// Indices of the gene sets containing `feature`; empty when the feature
    /// belongs to no set or is not in the ranked list.
    pub fn gene_set_indices_for(&self, feature: &str) -> &[u32] {
        match self.ranked_list.rank_of(feature) {
            Some(r) => &self.sets_at_rank[r],
            None => &[],
        }
    }

    pub(crate) fn is_member_at(&self, g: usize, r: usize) -> bool {
        self.hit_weights[g].contains_key(&r)
    }

    pub(crate) fn hit_weight_at(&self, g: usize, r: usize) -> f64 {
        self.hit_weights[g].get(&r).copied().unwrap_or(f64::NAN)
    }

    pub(crate) fn sets_at(&self, r: usize) -> &[u32] {
        &self.sets_at_rank[r]
    }
}
