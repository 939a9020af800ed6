//! End-to-end pipeline tests over the fixture extracts in tests/fixtures.

use prevalence::analysis::{AnalysisOptions, PrevalenceEngine};
use prevalence::cleaner::{clean, CleanedSurvey};
use prevalence::config::Config;
use prevalence::loader::Loader;
use prevalence::reporter::SummaryTable;
use prevalence::{AgeBand, Report, SourceCount};
use std::path::PathBuf;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_config() -> Config {
    serde_json::from_str(
        r#"{
            "sources": [
                { "tag": "CHC", "label": "Community health centers", "path": "chc.csv" },
                { "tag": "PPP", "label": "Private physician practices", "path": "ppp.csv" }
            ]
        }"#,
    )
    .unwrap()
}

fn load(config: &Config) -> (CleanedSurvey, Vec<SourceCount>) {
    let mut loader = Loader::new(fixtures_dir(), config.delimiter());
    let raw = loader.load(&config.get_sources()).unwrap();
    let survey = clean(&raw, config).unwrap();
    (survey, raw.counts())
}

fn run(config: &Config) -> Report {
    let (survey, loaded) = load(config);
    PrevalenceEngine::from_config(config).run(&survey, loaded)
}

#[test]
fn loads_both_extracts_with_source_tags() {
    let (survey, loaded) = load(&fixture_config());
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].source.as_str(), "CHC");
    assert_eq!(loaded[0].rows, 768);
    assert_eq!(loaded[1].rows, 768);
    assert_eq!(survey.observations.len(), 1536);

    // Provider and answered-count filters narrow the domain, not the design
    let cleaned = survey.domain_counts();
    assert!(cleaned[0].rows < 768 && cleaned[0].rows > 500);
    assert_eq!(survey.design.strata_count(), 24);
    assert_eq!(survey.design.psu_count(), 96);
}

#[test]
fn every_estimate_is_a_bracketed_proportion() {
    let (survey, _) = load(&fixture_config());
    let engine = PrevalenceEngine::new(AnalysisOptions::default(), AgeBand::defaults());
    for row in engine.evaluate(&survey) {
        let e = &row.estimate;
        match e.mean {
            Some(mean) => {
                assert!((0.0..=1.0).contains(&mean));
                let (lo, hi) = (e.ci_lower.unwrap(), e.ci_upper.unwrap());
                assert!(lo <= mean && mean <= hi, "{:?}", e);
                assert!(lo >= 0.0 && hi <= 1.0);
            }
            None => assert_eq!(e.count, 0),
        }
    }
}

#[test]
fn all_ages_band_is_estimated_from_the_full_data() {
    let (survey, _) = load(&fixture_config());
    let engine = PrevalenceEngine::new(AnalysisOptions::default(), AgeBand::defaults());
    let rows = engine.evaluate(&survey);

    for condition in &survey.conditions {
        for source in ["CHC", "PPP"] {
            let find = |band: &str| {
                rows.iter()
                    .find(|r| {
                        r.estimate.age_band == band
                            && r.estimate.condition == condition.code
                            && r.estimate.source.as_str() == source
                    })
                    .map(|r| r.estimate.clone())
                    .unwrap()
            };
            let parts = [find("0_17"), find("18_64"), find("65_100")];
            let all = find("0_100");
            assert_eq!(all.count, parts.iter().map(|p| p.count).sum::<usize>());
            // The union estimate lies between the sub-band extremes
            let means: Vec<f64> = parts.iter().filter_map(|p| p.mean).collect();
            let lo = means.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = means.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let mean = all.mean.unwrap();
            assert!(mean >= lo - 1e-12 && mean <= hi + 1e-12);
        }
    }
}

#[test]
fn retained_pairs_are_reliable_and_complete() {
    let config = fixture_config();
    let report = run(&config);
    let rule = config.reliability_rule();

    assert!(report.correction.m > 0);
    assert_eq!(report.rows.len(), report.correction.m * 2);
    assert_eq!(
        report.correction.m + report.dropped.len(),
        report.stats.combinations
    );
    assert_eq!(report.stats.combinations, 4 * 14);

    for row in &report.rows {
        assert!(rule.is_reliable(&row.estimate));
        let pair = report.rows_for(&row.estimate.age_band, &row.estimate.condition);
        assert_eq!(pair.len(), 2);
        assert_eq!(pair[0].estimate.source.as_str(), "CHC");
        assert_eq!(pair[1].estimate.source.as_str(), "PPP");
    }
    for dropped in &report.dropped {
        assert!(!dropped.unreliable.is_empty());
        assert!(report.rows_for(&dropped.age_band, &dropped.condition).is_empty());
    }
}

#[test]
fn significance_follows_the_bonferroni_threshold() {
    let report = run(&fixture_config());
    let threshold = report.correction.threshold.unwrap();
    assert!((threshold - 0.05 / report.correction.m as f64).abs() < 1e-15);

    for row in &report.rows {
        let expected = row
            .test
            .outcome
            .p_value()
            .map(|p| p <= threshold)
            .unwrap_or(false);
        assert_eq!(row.significant, expected);
    }
}

#[test]
fn directional_summary_for_all_ages() {
    let report = run(&fixture_config());
    let summary = SummaryTable::from_report(&report);
    let all_ages = summary
        .bands
        .iter()
        .find(|b| b.age_band == "All ages")
        .unwrap();

    assert!(all_ages.higher_in[0].contains(&"Hypertension".to_string()));
    assert!(all_ages.higher_in[1].contains(&"Hyperlipidemia".to_string()));
}

#[test]
fn alpha_override_changes_threshold_only() {
    let strict = run(&fixture_config().merge_with_cli(Some(0.001)));
    let default = run(&fixture_config());

    assert_eq!(strict.correction.m, default.correction.m);
    assert!(strict.correction.threshold < default.correction.threshold);
    let strict_hits = strict.rows.iter().filter(|r| r.significant).count();
    let default_hits = default.rows.iter().filter(|r| r.significant).count();
    assert!(strict_hits <= default_hits);
}

#[test]
fn results_do_not_depend_on_thread_count() {
    let config = fixture_config();
    let (survey, _) = load(&config);
    let engine = PrevalenceEngine::from_config(&config);

    let single = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap()
        .install(|| engine.evaluate(&survey));
    let many = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap()
        .install(|| engine.evaluate(&survey));

    assert_eq!(single, many);
}

#[test]
fn stricter_reliability_rule_retains_fewer_pairs() {
    let mut config = fixture_config();
    let default = run(&config);
    config.reliability.max_rse = Some(0.15);
    let strict = run(&config);

    assert!(strict.correction.m < default.correction.m);
    assert!(strict.correction.threshold > default.correction.threshold);
}
