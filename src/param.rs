use std::fs::File;
use std::io::BufReader;

use serde::{Deserialize, Serialize};

use crate::dataset::{Metric, MetricParams};
use crate::permutation::TemplateRandomizerType;
use crate::ranked::{Order, SortMode};
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub general: General,
    pub gsea: Gsea,
    pub metric: MetricConf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct General {
    pub seed: u64,
    #[serde(default = "thread_number_default")]
    pub thread_number: usize,
    #[serde(default = "log_level_default")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gsea {
    #[serde(default = "nperm_default")]
    pub nperm: usize,
    #[serde(default = "permute_template_default")]
    pub permute_template: bool,
    #[serde(default = "randomizer_default")]
    pub randomizer: String,
    #[serde(default = "num_markers_default")]
    pub num_markers: usize,
    #[serde(default = "save_rnd_ranked_lists_default")]
    pub save_rnd_ranked_lists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConf {
    #[serde(default = "method_default")]
    pub method: String,
    #[serde(default = "sort_default")]
    pub sort: String,
    #[serde(default = "order_default")]
    pub order: String,
    #[serde(default = "use_median_default")]
    pub use_median: bool,
    #[serde(default = "use_biased_default")]
    pub use_biased: bool,
    #[serde(default = "fix_low_default")]
    pub fix_low: bool,
    #[serde(default = "weight_exponent_default")]
    pub weight_exponent: f64,
}

/// Load a parameter tree from a YAML file.
pub fn get(param_file: &str) -> Result<Param> {
    let param_file_reader = File::open(param_file)?;
    let param_reader = BufReader::new(param_file_reader);
    let config: Param = serde_yaml::from_reader(param_reader)?;
    Ok(config)
}

impl Default for Param {
    fn default() -> Param {
        Param {
            general: General {
                seed: 0,
                thread_number: thread_number_default(),
                log_level: log_level_default(),
            },
            gsea: Gsea {
                nperm: nperm_default(),
                permute_template: permute_template_default(),
                randomizer: randomizer_default(),
                num_markers: num_markers_default(),
                save_rnd_ranked_lists: save_rnd_ranked_lists_default(),
            },
            metric: MetricConf {
                method: method_default(),
                sort: sort_default(),
                order: order_default(),
                use_median: use_median_default(),
                use_biased: use_biased_default(),
                fix_low: fix_low_default(),
                weight_exponent: weight_exponent_default(),
            },
        }
    }
}

impl Param {
    /// The metric knobs as the scoring layer consumes them.
    pub fn metric_params(&self) -> MetricParams {
        MetricParams {
            use_median: self.metric.use_median,
            use_biased: self.metric.use_biased,
            fix_low: self.metric.fix_low,
            weight_exponent: self.metric.weight_exponent,
        }
    }
}

pub fn metric(metric_string: &str) -> Metric {
    match metric_string.to_lowercase().as_str() {
        "signal2noise" | "s2n" => Metric::SignalToNoise,
        "ttest" => Metric::TTest,
        "ratio_of_classes" | "ratio" => Metric::RatioOfClasses,
        "log2_ratio_of_classes" | "log2_ratio" => Metric::LogRatioOfClasses,
        "diff_of_classes" | "diff" => Metric::Difference,
        "none" => Metric::None,
        other => panic!("Unrecognized metric {}", other),
    }
}

pub fn sort_mode(sort_string: &str) -> SortMode {
    match sort_string.to_lowercase().as_str() {
        "real" => SortMode::Real,
        "abs" | "absolute" => SortMode::Abs,
        other => panic!("Unrecognized sort mode {}", other),
    }
}

pub fn order(order_string: &str) -> Order {
    match order_string.to_lowercase().as_str() {
        "descending" | "desc" => Order::Descending,
        "ascending" | "asc" => Order::Ascending,
        other => panic!("Unrecognized order {}", other),
    }
}

pub fn randomizer(randomizer_string: &str) -> TemplateRandomizerType {
    match randomizer_string.to_lowercase().as_str() {
        "no_balance" => TemplateRandomizerType::NoBalance,
        "balance_within_class" | "balanced" => TemplateRandomizerType::BalanceWithinClass,
        other => panic!("Unrecognized template randomizer {}", other),
    }
}

fn thread_number_default() -> usize {
    1
}
fn log_level_default() -> String {
    "info".to_string()
}
fn nperm_default() -> usize {
    1000
}
fn permute_template_default() -> bool {
    true
}
fn randomizer_default() -> String {
    "no_balance".to_string()
}
fn num_markers_default() -> usize {
    100
}
fn save_rnd_ranked_lists_default() -> bool {
    false
}
fn method_default() -> String {
    "signal2noise".to_string()
}
fn sort_default() -> String {
    "real".to_string()
}
fn order_default() -> String {
    "descending".to_string()
}
fn use_median_default() -> bool {
    false
}
fn use_biased_default() -> bool {
    false
}
fn fix_low_default() -> bool {
    true
}
fn weight_exponent_default() -> f64 {
    1.0
}
