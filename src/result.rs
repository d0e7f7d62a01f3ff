use chrono::Local;

use crate::dataset::{Dataset, Metric, MetricParams, Template};
use crate::geneset::GeneSet;
use crate::kernel::EnrichmentScore;
use crate::permutation::MarkerPermutationTest;
use crate::ranked::{Order, RankedList, SortMode};

/// One gene set's outcome: the real (deep) enrichment score and the ES of
/// the same set under every permutation. Pure structural binding, no
/// computation happens here.
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub gene_set: GeneSet,
    pub real: EnrichmentScore,
    pub rnd_ess: Vec<f32>,
}

impl EnrichmentResult {
    pub fn num_perms(&self) -> usize {
        self.rnd_ess.len()
    }
}

/// The full output of one enrichment run: the real ranking, the per-set
/// results, the configuration that produced them and an optional marker
/// test. Downstream code derives NES/p/FDR/FWER from the raw ES vectors;
/// nothing here is normalized or persisted.
#[derive(Debug)]
pub struct EnrichmentDb {
    pub name: String,
    pub ranked_list: RankedList,
    pub dataset: Option<Dataset>,
    pub template: Option<Template>,
    pub results: Vec<EnrichmentResult>,
    pub metric: Metric,
    pub metric_params: MetricParams,
    pub sort: SortMode,
    pub order: Order,
    pub num_perms: usize,
    pub marker_test: Option<MarkerPermutationTest>,
    /// Random ranked lists retained for marker analysis, when requested.
    pub rnd_ranked_lists: Option<Vec<RankedList>>,
    /// Library version and build that produced this run.
    pub version: String,
    pub timestamp: String,
}

impl EnrichmentDb {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        ranked_list: RankedList,
        dataset: Option<Dataset>,
        template: Option<Template>,
        results: Vec<EnrichmentResult>,
        metric: Metric,
        metric_params: MetricParams,
        sort: SortMode,
        order: Order,
        num_perms: usize,
        marker_test: Option<MarkerPermutationTest>,
        rnd_ranked_lists: Option<Vec<RankedList>>,
    ) -> EnrichmentDb {
        let git_hash = option_env!("RSGSEA_GIT_SHA").unwrap_or("unknown");
        let version = format!("{}#{}", env!("CARGO_PKG_VERSION"), git_hash);
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();

        EnrichmentDb {
            name: name.to_string(),
            ranked_list,
            dataset,
            template,
            results,
            metric,
            metric_params,
            sort,
            order,
            num_perms,
            marker_test,
            rnd_ranked_lists,
            version,
            timestamp,
        }
    }

    pub fn num_results(&self) -> usize {
        self.results.len()
    }

    /// Result for a gene set by name.
    pub fn result(&self, gene_set_name: &str) -> Option<&EnrichmentResult> {
        self.results.iter().find(|r| r.gene_set.name == gene_set_name)
    }
}
