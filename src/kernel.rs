use std::sync::Arc;

use crate::cohort::{GeneSetCohort, FALLBACK_HIT_WEIGHT};
use crate::utils::{mann_whitney, MannWhitney};
use crate::{GseaError, Result};

/// One extremum of the running sum: the score value, the rank at which it
/// was attained and the ranked-list score at that rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct EsPoint {
    pub es: f32,
    pub rank_at_es: usize,
    pub rank_score_at_es: f32,
}

/// The five flavors of enrichment score kept for every gene set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EsVariant {
    /// Signed maximum deviation over the whole list.
    MaxDev,
    /// Signed maximum on the positive-score region.
    PosSigned,
    /// Absolute maximum on the positive-score region.
    PosMaxDev,
    /// Signed minimum on the negative-score region.
    NegSigned,
    /// Absolute maximum on the negative-score region.
    NegMaxDev,
}

/// Per-hit and per-position running profiles, kept only for deep passes.
#[derive(Debug)]
enum Deep {
    None,
    Stored {
        profile_at_hits: Vec<f32>,
        full_profile: Vec<f32>,
        hit_indices: Vec<usize>,
    },
}

/// Everything the kernel computed for one gene set in one pass.
///
/// The five [`EsPoint`] variants, the Mann-Whitney rank statistic on the hit
/// positions, the qualified-member count, and (deep passes only) the running
/// profiles and hit indices. [`EnrichmentScore`] views share one of these
/// records through an `Arc` so the deep vectors are never copied.
#[derive(Debug)]
pub struct EnrichmentScoreCohort {
    pub max_dev: EsPoint,
    pub pos_signed: EsPoint,
    pub pos_max_dev: EsPoint,
    pub neg_signed: EsPoint,
    pub neg_max_dev: EsPoint,
    pub mann_whitney: MannWhitney,
    pub num_hits: usize,
    deep: Deep,
}

impl EnrichmentScoreCohort {
    pub fn point(&self, variant: EsVariant) -> EsPoint {
        match variant {
            EsVariant::MaxDev => self.max_dev,
            EsVariant::PosSigned => self.pos_signed,
            EsVariant::PosMaxDev => self.pos_max_dev,
            EsVariant::NegSigned => self.neg_signed,
            EsVariant::NegMaxDev => self.neg_max_dev,
        }
    }

    pub fn has_deep(&self) -> bool {
        matches!(self.deep, Deep::Stored { .. })
    }

    /// Running score at each hit, in hit order.
    pub fn profile_at_hits(&self) -> Result<&[f32]> {
        match &self.deep {
            Deep::Stored {
                profile_at_hits, ..
            } => Ok(profile_at_hits),
            Deep::None => Err(GseaError::DeepNotAvailable("profile_at_hits")),
        }
    }

    /// Running score at every list position.
    pub fn full_profile(&self) -> Result<&[f32]> {
        match &self.deep {
            Deep::Stored { full_profile, .. } => Ok(full_profile),
            Deep::None => Err(GseaError::DeepNotAvailable("full_profile")),
        }
    }

    /// Ranked-list positions at which hits occurred.
    pub fn hit_indices(&self) -> Result<&[usize]> {
        match &self.deep {
            Deep::Stored { hit_indices, .. } => Ok(hit_indices),
            Deep::None => Err(GseaError::DeepNotAvailable("hit_indices")),
        }
    }
}

/// One enrichment score: a variant tag plus a shared handle on the full
/// per-set record, so five views never copy the deep vectors.
#[derive(Debug, Clone)]
pub struct EnrichmentScore {
    variant: EsVariant,
    cohort: Arc<EnrichmentScoreCohort>,
}

impl EnrichmentScore {
    pub fn view(cohort: Arc<EnrichmentScoreCohort>, variant: EsVariant) -> EnrichmentScore {
        EnrichmentScore { variant, cohort }
    }

    pub fn variant(&self) -> EsVariant {
        self.variant
    }

    /// The signed enrichment score of this variant.
    pub fn es(&self) -> f32 {
        self.cohort.point(self.variant).es
    }

    /// Rank at which the score was attained.
    pub fn rank_at_es(&self) -> usize {
        self.cohort.point(self.variant).rank_at_es
    }

    /// Ranked-list score at that rank.
    pub fn rank_score_at_es(&self) -> f32 {
        self.cohort.point(self.variant).rank_score_at_es
    }

    pub fn num_hits(&self) -> usize {
        self.cohort.num_hits
    }

    pub fn mann_whitney(&self) -> MannWhitney {
        self.cohort.mann_whitney
    }

    pub fn profile_at_hits(&self) -> Result<&[f32]> {
        self.cohort.profile_at_hits()
    }

    pub fn full_profile(&self) -> Result<&[f32]> {
        self.cohort.full_profile()
    }

    pub fn hit_indices(&self) -> Result<&[usize]> {
        self.cohort.hit_indices()
    }

    /// Full per-set record shared by all five variant views.
    pub fn score_cohort(&self) -> &Arc<EnrichmentScoreCohort> {
        &self.cohort
    }
}

/// Maximum-deviation enrichment score of every gene set in the cohort.
///
/// The common entry point: one single pass over the ranked list, returning
/// the max-deviation view per set. The other four variants stay reachable
/// through [`EnrichmentScore::score_cohort`].
pub fn ks_scores(gcoh: &GeneSetCohort, store_deep: bool) -> Result<Vec<EnrichmentScore>> {
    let cohorts = ks_scores_all_modes(gcoh, store_deep)?;
    Ok(cohorts
        .into_iter()
        .map(|c| EnrichmentScore::view(c, EsVariant::MaxDev))
        .collect())
}

/// Single pass over the ranked list computing all ES variants for all sets.
///
/// Per set the pass keeps a running score, a jump cursor (last visited
/// position) and the current best deviations. Positions 0..L-2 only touch
/// the sets containing the feature at that rank (inverted index); the gap
/// since a set's last visit is all misses and is settled in one backfill
/// step, with the extremum re-checked at the position just before the hit.
/// The final position visits every set so each running sum is closed out
/// exactly once.
pub fn ks_scores_all_modes(
    gcoh: &GeneSetCohort,
    store_deep: bool,
) -> Result<Vec<Arc<EnrichmentScoreCohort>>> {
    let num_sets = gcoh.num_gene_sets();
    if num_sets == 0 {
        return Err(GseaError::InvalidArgument(
            "cohort holds no gene sets".to_string(),
        ));
    }
    let rl = gcoh.ranked_list();
    let num_labels = rl.len();

    let mut running = vec![0.0f64; num_sets];
    let mut jumps = vec![-1isize; num_sets];

    let mut max_dev = vec![EsPoint::default(); num_sets];
    let mut pos_signed = vec![EsPoint::default(); num_sets];
    let mut pos_max_dev = vec![EsPoint::default(); num_sets];
    let mut neg_signed = vec![EsPoint::default(); num_sets];
    let mut neg_max_dev = vec![EsPoint::default(); num_sets];

    // always collected, the Mann-Whitney statistic needs them
    let mut hit_indices: Vec<Vec<usize>> = (0..num_sets)
        .map(|g| Vec::with_capacity(gcoh.num_true(g)))
        .collect();

    let mut profile_at_hits: Vec<Vec<f32>> = if store_deep {
        (0..num_sets)
            .map(|g| Vec::with_capacity(gcoh.num_true(g)))
            .collect()
    } else {
        Vec::new()
    };
    let mut full_profile: Vec<Vec<f32>> = if store_deep {
        vec![vec![0.0f32; num_labels]; num_sets]
    } else {
        Vec::new()
    };

    let all_sets: Vec<u32> = (0..num_sets as u32).collect();

    for r in 0..num_labels {
        let is_last = r + 1 == num_labels;
        let corr = rl.score(r);
        let on_pos_side = corr > 0.0;

        // closing pass visits every set, otherwise only the sets holding
        // the feature at this rank
        let touched: &[u32] = if is_last {
            &all_sets
        } else {
            gcoh.sets_at(r)
        };

        for &gi in touched {
            let g = gi as usize;

            let gap = r as isize - jumps[g] - 1;
            if gap > 0 {
                let miss = gcoh.miss_points(g);
                if store_deep {
                    // backfill the skipped positions, all misses
                    let mut trun = running[g];
                    let profile = &mut full_profile[g];
                    for slot in profile
                        .iter_mut()
                        .take(r)
                        .skip((jumps[g] + 1) as usize)
                    {
                        trun -= miss;
                        *slot = trun as f32;
                    }
                }
                running[g] -= gap as f64 * miss;

                // a miss run can carry the extremum just before this hit
                if (max_dev[g].es as f64).abs() < running[g].abs() {
                    max_dev[g] = EsPoint {
                        es: running[g] as f32,
                        rank_at_es: r - 1,
                        rank_score_at_es: rl.score(r - 1),
                    };
                }
            }

            if is_last && !gcoh.is_member_at(g, r) {
                running[g] -= gcoh.miss_points(g);
            } else {
                jumps[g] = r as isize;
                let mut hit = gcoh.hit_weight_at(g, r);
                if !hit.is_finite() || hit == 0.0 {
                    hit = FALLBACK_HIT_WEIGHT;
                }
                running[g] += hit;
                hit_indices[g].push(r);
                if store_deep {
                    profile_at_hits[g].push(running[g] as f32);
                }
            }

            if store_deep {
                full_profile[g][r] = running[g] as f32;
            }

            // strict comparison: ties keep the earlier rank
            if (max_dev[g].es as f64).abs() < running[g].abs() {
                max_dev[g] = EsPoint {
                    es: running[g] as f32,
                    rank_at_es: r,
                    rank_score_at_es: corr,
                };
            }

            if on_pos_side {
                if (pos_signed[g].es as f64) < running[g] {
                    pos_signed[g] = EsPoint {
                        es: running[g] as f32,
                        rank_at_es: r,
                        rank_score_at_es: corr,
                    };
                }
                if (pos_max_dev[g].es as f64).abs() < running[g].abs() {
                    pos_max_dev[g] = EsPoint {
                        es: running[g] as f32,
                        rank_at_es: r,
                        rank_score_at_es: corr,
                    };
                }
            } else {
                if (neg_signed[g].es as f64) > running[g] {
                    neg_signed[g] = EsPoint {
                        es: running[g] as f32,
                        rank_at_es: r,
                        rank_score_at_es: corr,
                    };
                }
                if (neg_max_dev[g].es as f64).abs() < running[g].abs() {
                    neg_max_dev[g] = EsPoint {
                        es: running[g] as f32,
                        rank_at_es: r,
                        rank_score_at_es: corr,
                    };
                }
            }
        }
    }

    let mut profiles = profile_at_hits.into_iter();
    let mut fulls = full_profile.into_iter();

    let mut out = Vec::with_capacity(num_sets);
    for (g, hits) in hit_indices.into_iter().enumerate() {
        let mw = mann_whitney(&hits, num_labels);
        let deep = if store_deep {
            Deep::Stored {
                profile_at_hits: profiles.next().unwrap_or_default(),
                full_profile: fulls.next().unwrap_or_default(),
                hit_indices: hits,
            }
        } else {
            Deep::None
        };
        out.push(Arc::new(EnrichmentScoreCohort {
            max_dev: max_dev[g],
            pos_signed: pos_signed[g],
            pos_max_dev: pos_max_dev[g],
            neg_signed: neg_signed[g],
            neg_max_dev: neg_max_dev[g],
            mann_whitney: mw,
            num_hits: gcoh.num_true(g),
            deep,
        }));
    }

    Ok(out)
}
