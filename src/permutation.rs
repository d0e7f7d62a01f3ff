use std::cmp::min;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use log::debug;
use rand::seq::{index, SliceRandom};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cohort::GeneSetCohort;
use crate::dataset::{score_dataset, Dataset, Metric, MetricParams, Template};
use crate::geneset::GeneSet;
use crate::kernel::ks_scores;
use crate::ranked::{Order, RankedList, SortMode};
use crate::result::EnrichmentResult;
use crate::utils::{ProgressSink, SeedGenerator};
use crate::{GseaError, Result};

/// Progress is reported once every this many iterations.
pub const LOG_FREQ: usize = 5;

/// How random class-label templates are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateRandomizerType {
    /// Fisher-Yates shuffle of the whole assignment vector.
    NoBalance,
    /// Swap equal-sized random halves between the two classes.
    BalanceWithinClass,
}

/// One random template drawn under the requested randomizer. Class sizes
/// are preserved by both schemes.
pub fn randomize_template(
    template: &Template,
    rt: TemplateRandomizerType,
    rng: &mut ChaCha8Rng,
) -> Template {
    let mut assignments = template.assignments.clone();

    match rt {
        TemplateRandomizerType::NoBalance => {
            assignments.shuffle(rng);
        }
        TemplateRandomizerType::BalanceWithinClass => {
            let class0 = template.class_indices(0);
            let class1 = template.class_indices(1);
            let k = min(class0.len(), class1.len()) / 2;
            let from0 = index::sample(rng, class0.len(), k);
            let from1 = index::sample(rng, class1.len(), k);
            for (a, b) in from0.into_iter().zip(from1.into_iter()) {
                assignments[class0[a]] = 1;
                assignments[class1[b]] = 0;
            }
        }
    }

    Template {
        name: format!("{}_rnd", template.name),
        assignments,
        class_names: template.class_names.clone(),
    }
}

/// The `nperm` random templates for a run. Template `c` is drawn from seed
/// sub-stream `c`, so the set is reproducible no matter who scores it.
pub fn create_random_templates(
    nperm: usize,
    template: &Template,
    rt: TemplateRandomizerType,
    seeds: &SeedGenerator,
) -> Vec<Template> {
    (0..nperm)
        .map(|c| {
            let mut rng = seeds.stream(c as u64);
            randomize_template(template, rt, &mut rng)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Marker statistics
// ---------------------------------------------------------------------------

/// Null mean and standard deviation of one feature's metric score across
/// random templates.
#[derive(Debug, Clone)]
pub struct MarkerStat {
    pub feature: String,
    pub mean: f64,
    pub sd: f64,
}

/// Accumulates per-feature scores across random ranked lists, for
/// feature-marker statistics alongside template shuffling.
///
/// Feed every random list with [`add_rnd`](Self::add_rnd), then call
/// [`finalize`](Self::finalize) exactly once.
#[derive(Debug)]
pub struct MarkerPermutationTest {
    pub name: String,
    num_markers: usize,
    features: Vec<String>,
    index_of: HashMap<String, usize>,
    sums: Vec<f64>,
    sum_squares: Vec<f64>,
    adds: usize,
    stats: Option<Vec<MarkerStat>>,
}

impl MarkerPermutationTest {
    /// Accumulator aligned to the real ranking's feature order.
    pub fn new(name: &str, num_markers: usize, real_list: &RankedList) -> MarkerPermutationTest {
        let features: Vec<String> = real_list.names().to_vec();
        let index_of = features
            .iter()
            .enumerate()
            .map(|(i, f)| (f.clone(), i))
            .collect();
        let n = features.len();
        MarkerPermutationTest {
            name: name.to_string(),
            num_markers: min(num_markers, n),
            features,
            index_of,
            sums: vec![0.0; n],
            sum_squares: vec![0.0; n],
            adds: 0,
            stats: None,
        }
    }

    /// Fold one random ranked list into the accumulators.
    pub fn add_rnd(&mut self, rnd_list: &RankedList) -> Result<()> {
        if self.stats.is_some() {
            return Err(GseaError::InvalidArgument(format!(
                "marker test '{}' already finalized",
                self.name
            )));
        }
        if rnd_list.len() != self.features.len() {
            return Err(GseaError::InvalidArgument(format!(
                "marker test '{}': random list has {} features, expected {}",
                self.name,
                rnd_list.len(),
                self.features.len()
            )));
        }
        for r in 0..rnd_list.len() {
            let idx = self.index_of.get(rnd_list.rank_name(r)).ok_or_else(|| {
                GseaError::InvalidArgument(format!(
                    "marker test '{}': unknown feature '{}' in random list",
                    self.name,
                    rnd_list.rank_name(r)
                ))
            })?;
            let s = rnd_list.score(r) as f64;
            self.sums[*idx] += s;
            self.sum_squares[*idx] += s * s;
        }
        self.adds += 1;
        Ok(())
    }

    /// Close the accumulation and compute per-feature null statistics.
    pub fn finalize(&mut self) -> Result<()> {
        if self.stats.is_some() {
            return Err(GseaError::InvalidArgument(format!(
                "marker test '{}' finalized twice",
                self.name
            )));
        }
        let n = self.adds as f64;
        let stats = self
            .features
            .iter()
            .enumerate()
            .map(|(i, f)| {
                if self.adds == 0 {
                    return MarkerStat {
                        feature: f.clone(),
                        mean: 0.0,
                        sd: 0.0,
                    };
                }
                let mean = self.sums[i] / n;
                let var = (self.sum_squares[i] / n - mean * mean).max(0.0);
                MarkerStat {
                    feature: f.clone(),
                    mean,
                    sd: var.sqrt(),
                }
            })
            .collect();
        self.stats = Some(stats);
        Ok(())
    }

    pub fn num_adds(&self) -> usize {
        self.adds
    }

    /// Null statistics for the `num_markers` features at the top of the
    /// real ranking.
    pub fn markers_high(&self) -> Result<&[MarkerStat]> {
        match &self.stats {
            Some(stats) => Ok(&stats[..self.num_markers]),
            None => Err(GseaError::InvalidArgument(format!(
                "marker test '{}' not finalized",
                self.name
            ))),
        }
    }

    /// Null statistics for the `num_markers` features at the bottom.
    pub fn markers_low(&self) -> Result<&[MarkerStat]> {
        match &self.stats {
            Some(stats) => Ok(&stats[stats.len() - self.num_markers..]),
            None => Err(GseaError::InvalidArgument(format!(
                "marker test '{}' not finalized",
                self.name
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Gene-set shuffling
// ---------------------------------------------------------------------------

/// Null model 1: for each real gene set, score `nperm` random same-size
/// sets drawn from the ranked list's universe.
///
/// The real pass stores deep vectors (downstream reports need hit indices
/// and profiles); the permutation passes never do. Set `g` consumes seed
/// sub-stream `g`, so results are identical across thread counts.
pub fn shuffle_gene_sets(
    ranked_list: &RankedList,
    gene_sets: &[GeneSet],
    nperm: usize,
    params: &MetricParams,
    seeds: &SeedGenerator,
    sink: &dyn ProgressSink,
) -> Result<Vec<EnrichmentResult>> {
    let gcoh_real = GeneSetCohort::new(ranked_list, gene_sets, params.weight_exponent)?;
    let real_scores = ks_scores(&gcoh_real, true)?;

    (0..gene_sets.len())
        .into_par_iter()
        .map(|g| -> Result<EnrichmentResult> {
            if g % LOG_FREQ == 0 {
                sink.on_progress(g + 1, gene_sets.len(), &gene_sets[g].name);
            }

            let rnd_ess = if nperm > 0 {
                let q = gcoh_real.num_true(g);
                let mut rng = seeds.stream(g as u64);
                let rnd_sets: Result<Vec<GeneSet>> = (0..nperm)
                    .map(|c| {
                        GeneSet::random_from_universe(
                            &format!("{}_rnd_{}", gene_sets[g].name, c),
                            q,
                            ranked_list,
                            &mut rng,
                        )
                    })
                    .collect();
                let rnd_sets = rnd_sets?;
                let gcoh_rnd = gcoh_real.clone_with_gene_sets(&rnd_sets)?;
                let rnd_scores = ks_scores(&gcoh_rnd, false)?;
                rnd_scores.iter().map(|s| s.es()).collect()
            } else {
                Vec::new()
            };

            Ok(EnrichmentResult {
                gene_set: gene_sets[g].clone(),
                real: real_scores[g].clone(),
                rnd_ess,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Template shuffling
// ---------------------------------------------------------------------------

/// Everything the template-shuffle pipeline produces.
#[derive(Debug)]
pub struct TemplateShuffleOutput {
    pub results: Vec<EnrichmentResult>,
    pub real_ranked_list: RankedList,
    pub marker_test: MarkerPermutationTest,
    /// The random ranked lists, when the caller asked to keep them.
    pub rnd_ranked_lists: Option<Vec<RankedList>>,
}

/// Null model 2: re-rank the dataset under permuted class labels.
///
/// The real ranked list comes from scoring the dataset with the true
/// template. Each permutation re-scores under a random template (sub-stream
/// c), rebuilds a cohort over the real gene sets and records one ES column.
/// A permutation that fails to score surfaces as an error so the column
/// count stays exact.
#[allow(clippy::too_many_arguments)]
pub fn shuffle_template(
    dataset: &Dataset,
    template: &Template,
    gene_sets: &[GeneSet],
    nperm: usize,
    metric: Metric,
    sort: SortMode,
    order: Order,
    params: &MetricParams,
    rt: TemplateRandomizerType,
    seeds: &SeedGenerator,
    num_markers: usize,
    keep_rnd_ranked_lists: bool,
    sink: &dyn ProgressSink,
) -> Result<TemplateShuffleOutput> {
    let real_ranked_list = score_dataset(metric, sort, order, params, dataset, template)?;
    if real_ranked_list.len() != dataset.feature_len {
        return Err(GseaError::InvalidArgument(format!(
            "scored list has {} entries for {} dataset rows",
            real_ranked_list.len(),
            dataset.feature_len
        )));
    }

    let rnd_templates = create_random_templates(nperm, template, rt, seeds);
    debug!(
        "done generating rnd templates: {} for {}",
        rnd_templates.len(),
        template.name
    );

    let real_scores = {
        let gcoh_real =
            GeneSetCohort::new(&real_ranked_list, gene_sets, params.weight_exponent)?;
        ks_scores(&gcoh_real, true)?
    };

    // each permutation fills its own column; the counter only paces progress
    let done = AtomicUsize::new(0);
    let per_perm: Vec<(RankedList, Vec<f32>)> = rnd_templates
        .par_iter()
        .map(|rnd_template| -> Result<(RankedList, Vec<f32>)> {
            let rnd_list = score_dataset(metric, sort, order, params, dataset, rnd_template)?;
            let gcoh_rnd =
                GeneSetCohort::new(&rnd_list, gene_sets, params.weight_exponent)?;
            let column: Vec<f32> = ks_scores(&gcoh_rnd, false)?
                .iter()
                .map(|s| s.es())
                .collect();

            let c = done.fetch_add(1, AtomicOrdering::Relaxed);
            if c % LOG_FREQ == 0 {
                sink.on_progress(c + 1, nperm, &template.name);
            }
            Ok((rnd_list, column))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut marker_test = MarkerPermutationTest::new(&template.name, num_markers, &real_ranked_list);
    for (rnd_list, _) in &per_perm {
        marker_test.add_rnd(rnd_list)?;
    }
    marker_test.finalize()?;

    let results = gene_sets
        .iter()
        .enumerate()
        .map(|(g, gs)| EnrichmentResult {
            gene_set: gs.clone(),
            real: real_scores[g].clone(),
            rnd_ess: per_perm.iter().map(|(_, column)| column[g]).collect(),
        })
        .collect();

    let rnd_ranked_lists = if keep_rnd_ranked_lists {
        Some(per_perm.into_iter().map(|(rnd_list, _)| rnd_list).collect())
    } else {
        None
    };

    Ok(TemplateShuffleOutput {
        results,
        real_ranked_list,
        marker_test,
        rnd_ranked_lists,
    })
}

// unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::string_vec;
    use crate::utils::SilentProgress;

    fn template_6_4() -> Template {
        Template::new(
            "phen",
            vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 1],
            string_vec!["A", "B"],
        )
        .unwrap()
    }

    fn descending_list(n: usize) -> RankedList {
        let pairs = (0..n)
            .map(|i| (format!("f{}", i + 1), (n as f32 / 2.0) - i as f32))
            .collect();
        RankedList::new("rl", pairs).unwrap()
    }

    #[test]
    fn test_no_balance_preserves_class_sizes() {
        let t = template_6_4();
        let seeds = SeedGenerator::new(42);
        for c in 0..20 {
            let rnd = randomize_template(&t, TemplateRandomizerType::NoBalance, &mut seeds.stream(c));
            assert_eq!(rnd.class_count(0), 6, "class A size must be preserved");
            assert_eq!(rnd.class_count(1), 4, "class B size must be preserved");
        }
    }

    #[test]
    fn test_balance_within_class_swaps_fixed_count() {
        let t = template_6_4();
        let seeds = SeedGenerator::new(42);
        // min(6,4)/2 = 2 swapped out of each class: 4 labels change
        let rnd = randomize_template(
            &t,
            TemplateRandomizerType::BalanceWithinClass,
            &mut seeds.stream(0),
        );
        assert_eq!(rnd.class_count(0), 6);
        assert_eq!(rnd.class_count(1), 4);
        let changed = t
            .assignments
            .iter()
            .zip(rnd.assignments.iter())
            .filter(|(a, b)| a != b)
            .count();
        assert_eq!(changed, 4, "exactly 2 labels from each class must swap");
    }

    #[test]
    fn test_random_templates_are_stream_deterministic() {
        let t = template_6_4();
        let seeds = SeedGenerator::new(7);
        let a = create_random_templates(10, &t, TemplateRandomizerType::NoBalance, &seeds);
        let b = create_random_templates(10, &t, TemplateRandomizerType::NoBalance, &seeds);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.assignments, y.assignments, "same seed, same templates");
        }
        let other = create_random_templates(10, &t, TemplateRandomizerType::NoBalance,
            &SeedGenerator::new(8));
        let differs = a
            .iter()
            .zip(other.iter())
            .any(|(x, y)| x.assignments != y.assignments);
        assert!(differs, "different seeds must draw different templates");
    }

    #[test]
    fn test_marker_test_accumulates_mean_and_sd() {
        let real = descending_list(4);
        let mut ptest = MarkerPermutationTest::new("phen", 2, &real);

        // two permuted lists with known scores per feature
        let p1 = RankedList::new(
            "p1",
            vec![
                ("f1".to_string(), 2.0),
                ("f2".to_string(), 1.0),
                ("f3".to_string(), 0.0),
                ("f4".to_string(), -1.0),
            ],
        )
        .unwrap();
        let p2 = RankedList::new(
            "p2",
            vec![
                ("f1".to_string(), 4.0),
                ("f2".to_string(), 1.0),
                ("f3".to_string(), 2.0),
                ("f4".to_string(), -3.0),
            ],
        )
        .unwrap();
        ptest.add_rnd(&p1).unwrap();
        ptest.add_rnd(&p2).unwrap();
        ptest.finalize().unwrap();

        let high = ptest.markers_high().unwrap();
        assert_eq!(high.len(), 2);
        assert_eq!(high[0].feature, "f1");
        assert!((high[0].mean - 3.0).abs() < 1e-12);
        assert!((high[0].sd - 1.0).abs() < 1e-12);

        let low = ptest.markers_low().unwrap();
        assert_eq!(low.len(), 2);
        assert_eq!(low[1].feature, "f4");
        assert!((low[1].mean + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_marker_test_finalize_once() {
        let real = descending_list(4);
        let mut ptest = MarkerPermutationTest::new("phen", 2, &real);
        ptest.finalize().unwrap();
        assert!(ptest.finalize().is_err(), "second finalize must fail");
        assert!(
            ptest.add_rnd(&real).is_err(),
            "adding after finalize must fail"
        );
    }

    #[test]
    fn test_marker_test_rejects_mismatched_list() {
        let real = descending_list(4);
        let mut ptest = MarkerPermutationTest::new("phen", 2, &real);
        let short = descending_list(3);
        assert!(ptest.add_rnd(&short).is_err());
    }

    #[test]
    fn test_shuffle_gene_sets_null_is_centered() {
        // random same-size sets: the null ES distribution sits near zero
        let rl = descending_list(100);
        let gs = vec![GeneSet::new("gs", string_vec!["f1", "f20", "f40", "f60", "f80"]).unwrap()];
        let seeds = SeedGenerator::new(42);
        let results = shuffle_gene_sets(
            &rl,
            &gs,
            200,
            &MetricParams::default(),
            &seeds,
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rnd_ess.len(), 200);
        let mean: f64 =
            results[0].rnd_ess.iter().map(|&e| e as f64).sum::<f64>() / 200.0;
        assert!(
            mean.abs() < 0.1,
            "null ES mean should be close to zero, got {}",
            mean
        );
    }

    #[test]
    fn test_shuffle_gene_sets_is_reproducible() {
        let rl = descending_list(60);
        let gs = vec![
            GeneSet::new("a", string_vec!["f1", "f2", "f3"]).unwrap(),
            GeneSet::new("b", string_vec!["f10", "f30", "f50"]).unwrap(),
        ];
        let seeds = SeedGenerator::new(42);
        let mp = MetricParams::default();
        let r1 = shuffle_gene_sets(&rl, &gs, 50, &mp, &seeds, &SilentProgress).unwrap();
        let r2 = shuffle_gene_sets(&rl, &gs, 50, &mp, &seeds, &SilentProgress).unwrap();
        for (a, b) in r1.iter().zip(r2.iter()) {
            assert_eq!(a.rnd_ess, b.rnd_ess, "same seed must give identical null ES");
            assert_eq!(a.real.es(), b.real.es());
        }
    }

    #[test]
    fn test_shuffle_gene_sets_zero_perms() {
        let rl = descending_list(20);
        let gs = vec![GeneSet::new("a", string_vec!["f1", "f2"]).unwrap()];
        let seeds = SeedGenerator::new(42);
        let results = shuffle_gene_sets(
            &rl,
            &gs,
            0,
            &MetricParams::default(),
            &seeds,
            &SilentProgress,
        )
        .unwrap();
        assert!(results[0].rnd_ess.is_empty());
        assert!(results[0].real.hit_indices().is_ok(), "real pass stays deep");
    }
}
