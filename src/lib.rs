//! Rsgsea: Gene Set Enrichment Analysis kernel
//!
//! # Overview
//!
//! Rsgsea implements the computational core of GSEA: a weighted
//! Kolmogorov-Smirnov running-sum statistic over a ranked feature list,
//! scored against many gene sets in a single pass, with permutation-based
//! null models to assess how extreme each set's enrichment is. It answers:
//! do a gene set's members concentrate at the top or bottom of a ranking,
//! and how often does a random draw do better?
//!
//! Two null models are provided and never mixed in one output:
//!
//! * **Gene-set shuffling** - random fixed-size sets drawn from the ranked
//!   list's universe.
//! * **Template shuffling** - the dataset is re-scored under permuted class
//!   labels and the real gene sets are rescored against each re-ranking.
//!
//! # Modules
//!
//! ## Data and Parameter Management
//! * `ranked` - Ranked feature lists and sort configuration.
//! * `geneset` - Gene sets and random-set synthesis.
//! * `dataset` - Expression datasets, class templates and ranking metrics.
//! * `param` - Parameter configuration loaded from YAML.
//!
//! ## Scoring
//! * `cohort` - The bound (ranked list, gene sets) working object.
//! * `kernel` - The single-pass KS running-sum scorer.
//! * `permutation` - Null-model drivers and marker statistics.
//! * `result` - Enrichment results and the output database.
//!
//! ## Support
//! * `utils` - Seeded RNG sub-streams, rank statistics, progress sinks.
//!
//! # Determinism
//!
//! Every random draw flows through [`utils::SeedGenerator`] sub-streams
//! keyed by permutation index, so identical inputs and seed produce
//! bit-identical permutation matrices regardless of thread count.
//!
//! # References
//! Subramanian A, Tamayo P, et al. (2005). Gene set enrichment analysis: a
//! knowledge-based approach for interpreting genome-wide expression
//! profiles. PNAS 102(43). doi:10.1073/pnas.0506580102

/// The bound (ranked list, gene sets) working object with precomputed weights.
pub mod cohort;
/// Expression datasets, class templates and ranking metrics.
pub mod dataset;
/// Gene sets and random-set synthesis.
pub mod geneset;
/// The single-pass KS running-sum scorer.
pub mod kernel;
/// Manages parameter configurations.
pub mod param;
/// Null-model drivers and marker statistics.
pub mod permutation;
/// Ranked feature lists and sort configuration.
pub mod ranked;
/// Enrichment results and the output database.
pub mod result;
/// Seeded RNG sub-streams, rank statistics and progress sinks.
pub mod utils;

use log::{debug, error, info};
use rayon::ThreadPoolBuilder;
use thiserror::Error;

use crate::dataset::{Dataset, Metric, Template};
use crate::geneset::GeneSet;
use crate::param::Param;
use crate::permutation::{shuffle_gene_sets, shuffle_template};
use crate::ranked::{Order, RankedList, SortMode};
use crate::result::EnrichmentDb;
use crate::utils::{ProgressSink, SeedGenerator};

/// Everything that can go wrong in an enrichment run.
#[derive(Error, Debug)]
pub enum GseaError {
    /// A caller-supplied value violates the contract of the call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A gene set kept no members after intersection with the ranked list.
    #[error("Gene set '{0}' has no members in the ranked list")]
    GeneSetDegenerate(String),
    /// A deep-only field was requested from a shallow scoring pass.
    #[error("Deep scoring data not available: {0} requires a deep pass")]
    DeepNotAvailable(&'static str),
    /// Parameter file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Parameter file could not be parsed.
    #[error("Parameter parse error: {0}")]
    Param(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, GseaError>;

/// Executes a complete enrichment run on a dataset and class template.
///
/// # Arguments
///
/// * `dataset` - Features x samples expression matrix
/// * `template` - Two-class label assignment over the samples
/// * `gene_sets` - Gene sets to score
/// * `param` - Run configuration (seed, permutation mode, metric)
/// * `sink` - Progress collaborator, notified every few permutations
///
/// # Returns
///
/// An [`EnrichmentDb`] holding the real ranked list, one
/// [`result::EnrichmentResult`] per gene set and the run configuration.
///
/// # Description
///
/// * Scores the dataset with the configured metric to get the real ranking
/// * Dispatches on `param.gsea.permute_template`: template shuffling
///   re-scores the dataset under random class labels, gene-set shuffling
///   draws random same-size sets from the ranking's universe
/// * The real scoring pass is deep (hit indices and running profiles are
///   retained); permutation passes are not
pub fn run_gsea(
    dataset: &Dataset,
    template: &Template,
    gene_sets: &[GeneSet],
    param: &Param,
    sink: &dyn ProgressSink,
) -> Result<EnrichmentDb> {
    debug!(
        "!!!! Executing for: {} # samples: {}",
        template.name, dataset.sample_len
    );

    let seeds = SeedGenerator::new(param.general.seed);
    let metric = param::metric(&param.metric.method);
    let sort = param::sort_mode(&param.metric.sort);
    let order = param::order(&param.metric.order);
    let metric_params = param.metric_params();
    let nperm = param.gsea.nperm;

    let pool = ThreadPoolBuilder::new()
        .num_threads(param.general.thread_number)
        .build()
        .map_err(|e| GseaError::InvalidArgument(e.to_string()))?;

    let db = pool.install(|| -> Result<EnrichmentDb> {
        if param.gsea.permute_template {
            let rt = param::randomizer(&param.gsea.randomizer);
            let out = shuffle_template(
                dataset,
                template,
                gene_sets,
                nperm,
                metric,
                sort,
                order,
                &metric_params,
                rt,
                &seeds,
                param.gsea.num_markers,
                param.gsea.save_rnd_ranked_lists,
                sink,
            )?;
            Ok(EnrichmentDb::new(
                &format!("{}_{}", template.name, metric.name()),
                out.real_ranked_list,
                Some(dataset.clone()),
                Some(template.clone()),
                out.results,
                metric,
                metric_params,
                sort,
                order,
                nperm,
                Some(out.marker_test),
                out.rnd_ranked_lists,
            ))
        } else {
            let real_ranked_list =
                dataset::score_dataset(metric, sort, order, &metric_params, dataset, template)?;
            let results =
                shuffle_gene_sets(&real_ranked_list, gene_sets, nperm, &metric_params, &seeds, sink)?;
            Ok(EnrichmentDb::new(
                &format!("{}_{}", template.name, metric.name()),
                real_ranked_list,
                Some(dataset.clone()),
                Some(template.clone()),
                results,
                metric,
                metric_params,
                sort,
                order,
                nperm,
                None,
                None,
            ))
        }
    });

    let db = match db {
        Ok(db) => db,
        Err(e) => {
            error!("Enrichment run failed for {}: {}", template.name, e);
            return Err(e);
        }
    };

    info!("Finished permutations for {} ... creating reports", db.name);
    Ok(db)
}

/// Executes an enrichment run on a pre-ranked list.
///
/// Gene-set shuffling is the only null model available without a dataset;
/// the metric is recorded as [`Metric::None`].
pub fn run_gsea_preranked(
    ranked_list: RankedList,
    gene_sets: &[GeneSet],
    param: &Param,
    sink: &dyn ProgressSink,
) -> Result<EnrichmentDb> {
    debug!(
        "!!!! Executing for: {} # features: {}",
        ranked_list.name,
        ranked_list.len()
    );

    let seeds = SeedGenerator::new(param.general.seed);
    let metric_params = param.metric_params();
    let nperm = param.gsea.nperm;

    let pool = ThreadPoolBuilder::new()
        .num_threads(param.general.thread_number)
        .build()
        .map_err(|e| GseaError::InvalidArgument(e.to_string()))?;

    let results = pool
        .install(|| {
            shuffle_gene_sets(&ranked_list, gene_sets, nperm, &metric_params, &seeds, sink)
        })
        .map_err(|e| {
            error!("Enrichment run failed for {}: {}", ranked_list.name, e);
            e
        })?;

    let name = ranked_list.name.clone();
    let db = EnrichmentDb::new(
        &name,
        ranked_list,
        None,
        None,
        results,
        Metric::None,
        metric_params,
        SortMode::Real,
        Order::Descending,
        nperm,
        None,
        None,
    );

    info!("Finished permutations for {} ... creating reports", db.name);
    Ok(db)
}
