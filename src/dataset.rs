use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ranked::{Order, RankedList, SortMode};
use crate::utils;
use crate::{GseaError, Result};

/// A features x samples numeric matrix with row and column labels.
///
/// Values are stored sparsely, keyed `(sample, feature)`; absent entries
/// read as 0.0. Immutable once built.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: HashMap<(usize, usize), f64>,
    pub features: Vec<String>,
    pub samples: Vec<String>,
    pub feature_len: usize,
    pub sample_len: usize,
}

impl Dataset {
    /// Build a dataset from dense rows (one row per feature).
    pub fn from_rows(
        features: Vec<String>,
        samples: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Dataset> {
        if features.is_empty() || samples.is_empty() {
            return Err(GseaError::InvalidArgument(
                "dataset needs at least one feature and one sample".to_string(),
            ));
        }
        if rows.len() != features.len() {
            return Err(GseaError::InvalidArgument(format!(
                "dataset has {} rows for {} features",
                rows.len(),
                features.len()
            )));
        }

        let mut seen = HashMap::with_capacity(features.len());
        for (j, f) in features.iter().enumerate() {
            if seen.insert(f.clone(), j).is_some() {
                return Err(GseaError::InvalidArgument(format!(
                    "duplicate feature '{}' in dataset",
                    f
                )));
            }
        }

        let mut x = HashMap::new();
        for (j, row) in rows.iter().enumerate() {
            if row.len() != samples.len() {
                return Err(GseaError::InvalidArgument(format!(
                    "feature '{}' has {} values for {} samples",
                    features[j],
                    row.len(),
                    samples.len()
                )));
            }
            for (i, &v) in row.iter().enumerate() {
                if v != 0.0 {
                    x.insert((i, j), v);
                }
            }
        }

        let feature_len = features.len();
        let sample_len = samples.len();
        Ok(Dataset {
            x,
            features,
            samples,
            feature_len,
            sample_len,
        })
    }

    /// Value for `(sample, feature)`; absent entries are 0.0.
    pub fn value(&self, sample: usize, feature: usize) -> f64 {
        self.x.get(&(sample, feature)).copied().unwrap_or(0.0)
    }
}

/// A class-label assignment over the samples of a dataset.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub assignments: Vec<u8>,
    pub class_names: Vec<String>,
}

impl Template {
    pub fn new(name: &str, assignments: Vec<u8>, class_names: Vec<String>) -> Result<Template> {
        if class_names.len() < 2 {
            return Err(GseaError::InvalidArgument(format!(
                "template '{}' needs at least two classes",
                name
            )));
        }
        for (i, &a) in assignments.iter().enumerate() {
            if (a as usize) >= class_names.len() {
                return Err(GseaError::InvalidArgument(format!(
                    "template '{}': sample {} assigned to unknown class {}",
                    name, i, a
                )));
            }
        }
        Ok(Template {
            name: name.to_string(),
            assignments,
            class_names,
        })
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Number of samples assigned to class `c`.
    pub fn class_count(&self, c: u8) -> usize {
        self.assignments.iter().filter(|&&a| a == c).count()
    }

    /// Sample indices assigned to class `c`.
    pub fn class_indices(&self, c: u8) -> Vec<usize> {
        self.assignments
            .iter()
            .enumerate()
            .filter(|(_, &a)| a == c)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Ranking metric comparing the two template classes per feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    SignalToNoise,
    TTest,
    RatioOfClasses,
    LogRatioOfClasses,
    Difference,
    /// Pre-ranked input, no metric was applied.
    None,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::SignalToNoise => "signal2noise",
            Metric::TTest => "ttest",
            Metric::RatioOfClasses => "ratio_of_classes",
            Metric::LogRatioOfClasses => "log2_ratio_of_classes",
            Metric::Difference => "diff_of_classes",
            Metric::None => "none",
        }
    }
}

/// Knobs shared by all metrics plus the KS weighting exponent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricParams {
    /// Median instead of mean as the class location.
    pub use_median: bool,
    /// Biased (n) instead of unbiased (n-1) variance.
    pub use_biased: bool,
    /// Raise each class standard deviation to at least 0.2 * |location|.
    pub fix_low: bool,
    /// Exponent p applied to |score| when weighting hits.
    pub weight_exponent: f64,
}

impl Default for MetricParams {
    fn default() -> MetricParams {
        MetricParams {
            use_median: false,
            use_biased: false,
            fix_low: true,
            weight_exponent: 1.0,
        }
    }
}

/// Score every dataset row against the two-class template and rank the
/// features. Deterministic for identical inputs: ties keep feature order.
///
/// The output has exactly one entry per dataset row; a non-finite metric
/// value for any row is an error rather than a silent skip.
pub fn score_dataset(
    metric: Metric,
    sort: SortMode,
    order: Order,
    params: &MetricParams,
    dataset: &Dataset,
    template: &Template,
) -> Result<RankedList> {
    if metric == Metric::None {
        return Err(GseaError::InvalidArgument(
            "cannot score a dataset with the null metric".to_string(),
        ));
    }
    if template.len() != dataset.sample_len {
        return Err(GseaError::InvalidArgument(format!(
            "template '{}' covers {} samples but dataset has {}",
            template.name,
            template.len(),
            dataset.sample_len
        )));
    }

    let idx0 = template.class_indices(0);
    let idx1 = template.class_indices(1);
    if idx0.is_empty() || idx1.is_empty() {
        return Err(GseaError::InvalidArgument(format!(
            "template '{}' leaves a class without samples ({} vs {})",
            template.name,
            idx0.len(),
            idx1.len()
        )));
    }

    let mut scored: Vec<(String, f32)> = Vec::with_capacity(dataset.feature_len);
    for j in 0..dataset.feature_len {
        let c0: Vec<f64> = idx0.iter().map(|&i| dataset.value(i, j)).collect();
        let c1: Vec<f64> = idx1.iter().map(|&i| dataset.value(i, j)).collect();
        let score = metric_score(metric, &c0, &c1, params);
        if !score.is_finite() {
            return Err(GseaError::InvalidArgument(format!(
                "metric {} produced a non-finite score for feature '{}'",
                metric.name(),
                dataset.features[j]
            )));
        }
        scored.push((dataset.features[j].clone(), score as f32));
    }

    // stable sort: equal keys keep dataset row order
    let mut by_rank: Vec<usize> = (0..scored.len()).collect();
    let key = |i: usize| -> f64 {
        match sort {
            SortMode::Real => scored[i].1 as f64,
            SortMode::Abs => (scored[i].1 as f64).abs(),
        }
    };
    by_rank.sort_by(|&a, &b| {
        let ord = key(a)
            .partial_cmp(&key(b))
            .unwrap_or(std::cmp::Ordering::Equal);
        match order {
            Order::Descending => ord.reverse(),
            Order::Ascending => ord,
        }
    });

    let name = format!("{}_{}", template.name, metric.name());
    let pairs = by_rank.into_iter().map(|i| scored[i].clone()).collect();
    RankedList::new(&name, pairs)
}

fn metric_score(metric: Metric, c0: &[f64], c1: &[f64], params: &MetricParams) -> f64 {
    let m0 = location(c0, params.use_median);
    let m1 = location(c1, params.use_median);

    match metric {
        Metric::SignalToNoise => {
            let s0 = fixed_sd(c0, m0, params);
            let s1 = fixed_sd(c1, m1, params);
            (m0 - m1) / (s0 + s1)
        }
        Metric::TTest => {
            let s0 = fixed_sd(c0, m0, params);
            let s1 = fixed_sd(c1, m1, params);
            let n0 = c0.len() as f64;
            let n1 = c1.len() as f64;
            (m0 - m1) / (s0 * s0 / n0 + s1 * s1 / n1).sqrt()
        }
        Metric::RatioOfClasses => m0 / m1,
        Metric::LogRatioOfClasses => (m0 / m1).log2(),
        Metric::Difference => m0 - m1,
        Metric::None => f64::NAN,
    }
}

fn location(xs: &[f64], use_median: bool) -> f64 {
    if use_median {
        utils::median(xs)
    } else {
        utils::mean(xs)
    }
}

/// Class standard deviation with the low-variance floor: never below
/// 0.2 * |location|, and 0.2 when location and spread are both zero.
fn fixed_sd(xs: &[f64], center: f64, params: &MetricParams) -> f64 {
    let sd = utils::variance(xs, center, params.use_biased).sqrt();
    if !params.fix_low {
        return sd;
    }
    let s = sd.max(0.2 * center.abs());
    if s == 0.0 {
        0.2
    } else {
        s
    }
}

// unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::string_vec;

    fn two_class_template(n0: usize, n1: usize) -> Template {
        let mut assignments = vec![0u8; n0];
        assignments.extend(vec![1u8; n1]);
        Template::new("phen", assignments, string_vec!["A", "B"]).unwrap()
    }

    fn small_dataset() -> Dataset {
        // 3 features x 4 samples, classes split 2/2
        Dataset::from_rows(
            string_vec!["g1", "g2", "g3"],
            string_vec!["s1", "s2", "s3", "s4"],
            vec![
                vec![2.0, 2.0, 1.0, 1.0], // up in class A
                vec![1.0, 1.0, 3.0, 3.0], // up in class B
                vec![1.0, 1.0, 1.0, 1.0], // flat
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_signal_to_noise_known_value() {
        // constant classes: sd floors kick in, s2n = (2-1)/(0.4+0.2)
        let ds = small_dataset();
        let t = two_class_template(2, 2);
        let rl = score_dataset(
            Metric::SignalToNoise,
            SortMode::Real,
            Order::Descending,
            &MetricParams::default(),
            &ds,
            &t,
        )
        .unwrap();

        assert_eq!(rl.len(), 3);
        assert_eq!(rl.rank_name(0), "g1");
        let expected = 1.0 / 0.6;
        assert!(
            (rl.score(0) - expected as f32).abs() < 1e-5,
            "s2n for g1 should be {}, got {}",
            expected,
            rl.score(0)
        );
        assert!(rl.score(rl.rank_of("g2").unwrap()) < 0.0, "g2 is up in class B");
    }

    #[test]
    fn test_difference_and_ratio_metrics() {
        let ds = small_dataset();
        let t = two_class_template(2, 2);
        let mp = MetricParams::default();

        let diff = score_dataset(Metric::Difference, SortMode::Real, Order::Descending, &mp, &ds, &t)
            .unwrap();
        assert!((diff.score(diff.rank_of("g1").unwrap()) - 1.0).abs() < 1e-6);
        assert!((diff.score(diff.rank_of("g2").unwrap()) + 2.0).abs() < 1e-6);
        assert_eq!(diff.score(diff.rank_of("g3").unwrap()), 0.0);

        let ratio = score_dataset(
            Metric::RatioOfClasses,
            SortMode::Real,
            Order::Descending,
            &mp,
            &ds,
            &t,
        )
        .unwrap();
        assert!((ratio.score(ratio.rank_of("g1").unwrap()) - 2.0).abs() < 1e-6);

        let log_ratio = score_dataset(
            Metric::LogRatioOfClasses,
            SortMode::Real,
            Order::Descending,
            &mp,
            &ds,
            &t,
        )
        .unwrap();
        assert!((log_ratio.score(log_ratio.rank_of("g1").unwrap()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sort_modes_and_order() {
        let ds = small_dataset();
        let t = two_class_template(2, 2);
        let mp = MetricParams::default();

        let desc =
            score_dataset(Metric::Difference, SortMode::Real, Order::Descending, &mp, &ds, &t)
                .unwrap();
        assert_eq!(desc.rank_name(0), "g1");
        assert_eq!(desc.rank_name(2), "g2");

        let asc =
            score_dataset(Metric::Difference, SortMode::Real, Order::Ascending, &mp, &ds, &t)
                .unwrap();
        assert_eq!(asc.rank_name(0), "g2");

        // |−2| ranks first in abs mode
        let abs =
            score_dataset(Metric::Difference, SortMode::Abs, Order::Descending, &mp, &ds, &t)
                .unwrap();
        assert_eq!(abs.rank_name(0), "g2");
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let ds = small_dataset();
        let t = two_class_template(2, 2);
        let mp = MetricParams::default();
        let a = score_dataset(Metric::SignalToNoise, SortMode::Real, Order::Descending, &mp, &ds, &t)
            .unwrap();
        let b = score_dataset(Metric::SignalToNoise, SortMode::Real, Order::Descending, &mp, &ds, &t)
            .unwrap();
        assert_eq!(a.names(), b.names());
        assert_eq!(a.scores(), b.scores());
    }

    #[test]
    fn test_template_size_mismatch_is_an_error() {
        let ds = small_dataset();
        let t = two_class_template(2, 1);
        assert!(score_dataset(
            Metric::SignalToNoise,
            SortMode::Real,
            Order::Descending,
            &MetricParams::default(),
            &ds,
            &t
        )
        .is_err());
    }

    #[test]
    fn test_single_class_template_is_an_error() {
        let ds = small_dataset();
        let t = Template::new("solo", vec![0, 0, 0, 0], string_vec!["A", "B"]).unwrap();
        assert!(score_dataset(
            Metric::SignalToNoise,
            SortMode::Real,
            Order::Descending,
            &MetricParams::default(),
            &ds,
            &t
        )
        .is_err());
    }

    #[test]
    fn test_non_finite_metric_score_is_an_error() {
        // the ratio metric divides by a zero class-B mean
        let ds = Dataset::from_rows(
            string_vec!["g1"],
            string_vec!["s1", "s2", "s3", "s4"],
            vec![vec![1.0, 1.0, 0.0, 0.0]],
        )
        .unwrap();
        let t = two_class_template(2, 2);
        let err = score_dataset(
            Metric::RatioOfClasses,
            SortMode::Real,
            Order::Descending,
            &MetricParams::default(),
            &ds,
            &t,
        );
        assert!(err.is_err(), "a division by a zero class mean must surface");
    }

    #[test]
    fn test_template_validation() {
        assert!(Template::new("t", vec![0, 1], string_vec!["A"]).is_err());
        assert!(Template::new("t", vec![0, 7], string_vec!["A", "B"]).is_err());
        let t = Template::new("t", vec![0, 1, 0], string_vec!["A", "B"]).unwrap();
        assert_eq!(t.class_count(0), 2);
        assert_eq!(t.class_indices(1), vec![1]);
    }

    #[test]
    fn test_dataset_validation() {
        assert!(Dataset::from_rows(string_vec!["g1"], string_vec!["s1"], vec![]).is_err());
        assert!(Dataset::from_rows(
            string_vec!["g1", "g1"],
            string_vec!["s1"],
            vec![vec![1.0], vec![2.0]]
        )
        .is_err());
        assert!(
            Dataset::from_rows(string_vec!["g1"], string_vec!["s1", "s2"], vec![vec![1.0]])
                .is_err()
        );
    }
}
