//! End-to-end tests for the pre-ranked pipeline: gene-set shuffling against
//! a synthetic ranked list, checking null-distribution behavior and the
//! seed-determinism contract.

use rsgsea::dataset::Metric;
use rsgsea::geneset::GeneSet;
use rsgsea::param::Param;
use rsgsea::ranked::RankedList;
use rsgsea::run_gsea_preranked;
use rsgsea::utils::SilentProgress;

fn synthetic_ranking(n: usize) -> RankedList {
    // symmetric scores, n/2 positive then n/2 negative
    let pairs = (0..n)
        .map(|i| (format!("g{}", i + 1), (n as f32 / 2.0) - i as f32 - 0.5))
        .collect();
    RankedList::new("preranked", pairs).unwrap()
}

fn gene_sets() -> Vec<GeneSet> {
    vec![
        GeneSet::new(
            "top_block",
            (1..=5).map(|i| format!("g{}", i)).collect(),
        )
        .unwrap(),
        GeneSet::new(
            "bottom_block",
            (196..=200).map(|i| format!("g{}", i)).collect(),
        )
        .unwrap(),
        GeneSet::new(
            "spread",
            vec![20, 60, 100, 140, 180]
                .into_iter()
                .map(|i| format!("g{}", i))
                .collect(),
        )
        .unwrap(),
    ]
}

fn param(seed: u64, nperm: usize) -> Param {
    let mut param = Param::default();
    param.general.seed = seed;
    param.gsea.nperm = nperm;
    param
}

#[test]
fn test_preranked_run_structure() {
    let db = run_gsea_preranked(
        synthetic_ranking(200),
        &gene_sets(),
        &param(42, 100),
        &SilentProgress,
    )
    .unwrap();

    assert_eq!(db.num_results(), 3);
    assert_eq!(db.num_perms, 100);
    assert_eq!(db.metric, Metric::None);
    assert!(db.dataset.is_none() && db.template.is_none());
    assert!(db.marker_test.is_none(), "no marker test without a dataset");

    for r in &db.results {
        assert_eq!(r.rnd_ess.len(), 100, "one null ES per permutation");
        assert!(
            r.real.hit_indices().is_ok(),
            "real scoring keeps deep vectors"
        );
        assert_eq!(r.real.num_hits(), 5);
    }

    let top = db.result("top_block").unwrap();
    assert!(top.real.es() > 0.5, "top-packed set must score high");
    let bottom = db.result("bottom_block").unwrap();
    assert!(bottom.real.es() < -0.5, "bottom-packed set must score low");
    let spread = db.result("spread").unwrap();
    assert!(
        spread.real.es().abs() < top.real.es(),
        "an evenly spread set scores closer to zero than a packed one"
    );
}

#[test]
fn test_gene_set_shuffle_null_distribution() {
    // nperm = 1000, fixed seed: the null mean must be within 3 standard
    // errors of zero
    let db = run_gsea_preranked(
        synthetic_ranking(200),
        &gene_sets(),
        &param(42, 1000),
        &SilentProgress,
    )
    .unwrap();

    for r in &db.results {
        let n = r.rnd_ess.len() as f64;
        let mean = r.rnd_ess.iter().map(|&e| e as f64).sum::<f64>() / n;
        let var = r
            .rnd_ess
            .iter()
            .map(|&e| (e as f64 - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        let stderr = (var / n).sqrt();
        assert!(
            mean.abs() < 3.0 * stderr + 0.01,
            "{}: null mean {} too far from zero (stderr {})",
            r.gene_set.name,
            mean,
            stderr
        );
        assert!(var > 0.0, "null ES must vary across random sets");
    }
}

#[test]
fn test_identical_seeds_give_identical_null_matrices() {
    let a = run_gsea_preranked(
        synthetic_ranking(200),
        &gene_sets(),
        &param(7, 300),
        &SilentProgress,
    )
    .unwrap();
    let b = run_gsea_preranked(
        synthetic_ranking(200),
        &gene_sets(),
        &param(7, 300),
        &SilentProgress,
    )
    .unwrap();

    for (ra, rb) in a.results.iter().zip(b.results.iter()) {
        assert_eq!(
            ra.rnd_ess, rb.rnd_ess,
            "same seed must reproduce the null matrix bit for bit"
        );
    }
}

#[test]
fn test_different_seeds_give_different_null_matrices() {
    let a = run_gsea_preranked(
        synthetic_ranking(200),
        &gene_sets(),
        &param(7, 100),
        &SilentProgress,
    )
    .unwrap();
    let b = run_gsea_preranked(
        synthetic_ranking(200),
        &gene_sets(),
        &param(8, 100),
        &SilentProgress,
    )
    .unwrap();

    let differs = a
        .results
        .iter()
        .zip(b.results.iter())
        .any(|(ra, rb)| ra.rnd_ess != rb.rnd_ess);
    assert!(differs, "different seeds must draw different null sets");

    // the real scores do not depend on the seed at all
    for (ra, rb) in a.results.iter().zip(b.results.iter()) {
        assert_eq!(ra.real.es(), rb.real.es());
    }
}

#[test]
fn test_thread_count_does_not_change_results() {
    let mut one = param(42, 200);
    one.general.thread_number = 1;
    let mut four = param(42, 200);
    four.general.thread_number = 4;

    let a = run_gsea_preranked(synthetic_ranking(200), &gene_sets(), &one, &SilentProgress)
        .unwrap();
    let b = run_gsea_preranked(synthetic_ranking(200), &gene_sets(), &four, &SilentProgress)
        .unwrap();

    for (ra, rb) in a.results.iter().zip(b.results.iter()) {
        assert_eq!(
            ra.rnd_ess, rb.rnd_ess,
            "permutation sub-streams must make thread count irrelevant"
        );
    }
}

#[test]
fn test_degenerate_gene_set_fails_the_run() {
    let sets = vec![GeneSet::new("absent", vec!["nope1".to_string(), "nope2".to_string()]).unwrap()];
    let err = run_gsea_preranked(
        synthetic_ranking(50),
        &sets,
        &param(42, 10),
        &SilentProgress,
    );
    assert!(
        err.is_err(),
        "a gene set with no qualified members must be rejected, not skipped"
    );
}
