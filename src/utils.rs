use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use statrs::distribution::{ContinuousCDF, Normal};

/// a macro to declare simple Vec<String>
#[macro_export]
macro_rules! string_vec {
    ($($x:expr),*) => {
        vec![$($x.into()),*]
    };
}

/// Source of reproducible per-permutation RNG sub-streams.
///
/// Every random draw in the crate flows through a `ChaCha8Rng` handed out by
/// this generator. Sub-stream `i` is always the same sequence for a given
/// base seed, no matter which worker consumes it or in which order, so
/// permutation results are bit-identical across thread counts.
#[derive(Debug, Clone, Copy)]
pub struct SeedGenerator {
    base: u64,
}

impl SeedGenerator {
    pub fn new(base: u64) -> SeedGenerator {
        SeedGenerator { base }
    }

    /// RNG for sub-stream `index`.
    pub fn stream(&self, index: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.base);
        rng.set_stream(index);
        rng
    }
}

//-----------------------------------------------------------------------------
// Statistical utilities
//-----------------------------------------------------------------------------

/// Mann-Whitney rank-sum summary for one gene set's hit positions.
#[derive(Debug, Clone, Copy)]
pub struct MannWhitney {
    /// U statistic of the hit ranks against the rest of the list.
    pub u: f64,
    /// Normal-approximation z value.
    pub z: f64,
    /// Two-sided p-value from the normal approximation.
    pub p: f64,
}

/// Rank-sum test of hit positions (0-based, distinct) against a list of
/// `n_total` positions. Positions are distinct by construction so the
/// no-ties normal approximation applies.
pub fn mann_whitney(hit_ranks: &[usize], n_total: usize) -> MannWhitney {
    let n1 = hit_ranks.len() as f64;
    let n2 = (n_total - hit_ranks.len()) as f64;

    let rank_sum: f64 = hit_ranks.iter().map(|&r| (r + 1) as f64).sum();
    let u = rank_sum - n1 * (n1 + 1.0) / 2.0;

    let mean_u = n1 * n2 / 2.0;
    let std_u = ((n1 * n2 * (n1 + n2 + 1.0)) / 12.0).sqrt();
    if std_u == 0.0 {
        return MannWhitney { u, z: 0.0, p: 1.0 };
    }

    let z = (u - mean_u) / std_u;
    let normal_dist = Normal::new(0.0, 1.0).unwrap();
    let p = (2.0 * (1.0 - normal_dist.cdf(z.abs()))).min(1.0);

    MannWhitney { u, z, p }
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

pub fn median(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Variance around `center`; `biased` divides by n, otherwise n-1.
pub fn variance(xs: &[f64], center: f64, biased: bool) -> f64 {
    let n = xs.len() as f64;
    let denom = if biased { n } else { n - 1.0 };
    xs.iter().map(|x| (x - center).powi(2)).sum::<f64>() / denom
}

//-----------------------------------------------------------------------------
// Progress reporting
//-----------------------------------------------------------------------------

/// Collaborator notified every few permutation iterations.
pub trait ProgressSink: Sync {
    fn on_progress(&self, iter: usize, total: usize, label: &str);
}

/// Reports through the `log` facade.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, iter: usize, total: usize, label: &str) {
        info!("Iteration: {}/{} for {}", iter, total, label);
    }
}

/// Discards all progress events.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn on_progress(&self, _iter: usize, _total: usize, _label: &str) {}
}
