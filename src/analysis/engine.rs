//! Prevalence engine - runs every stage over the (age band, condition) grid

use crate::cleaner::CleanedSurvey;
use crate::config::Config;
use crate::{AgeBand, JoinedRow, Report, RunStats, SourceCount, SourceTag};
use chrono::Utc;

use super::correction::bonferroni;
use super::estimator::{estimate, IntervalOptions};
use super::reliability::{filter, ReliabilityRule};
use super::significance::test;

/// Tunables for one analysis run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisOptions {
    pub interval: IntervalOptions,
    pub reliability: ReliabilityRule,
    /// Family-wise significance level before correction
    pub alpha: f64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            interval: IntervalOptions::default(),
            reliability: ReliabilityRule::default(),
            alpha: 0.05,
        }
    }
}

impl AnalysisOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: IntervalOptions {
                level: config.confidence_level(),
                method: config.ci_method(),
            },
            reliability: config.reliability_rule(),
            alpha: config.alpha(),
        }
    }
}

/// Orchestrates estimation, testing, filtering and correction
pub struct PrevalenceEngine {
    options: AnalysisOptions,
    age_bands: Vec<AgeBand>,
}

impl PrevalenceEngine {
    pub fn new(options: AnalysisOptions, age_bands: Vec<AgeBand>) -> Self {
        Self { options, age_bands }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(AnalysisOptions::from_config(config), config.get_age_bands())
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Estimate and test every (band, condition) pair.
    ///
    /// Rows come back band-major, then condition, then source, whatever the
    /// thread count.
    pub fn evaluate(&self, survey: &CleanedSurvey) -> Vec<JoinedRow> {
        use rayon::prelude::*;

        let pairs: Vec<(&AgeBand, usize)> = self
            .age_bands
            .iter()
            .flat_map(|band| (0..survey.conditions.len()).map(move |c| (band, c)))
            .collect();

        let groups: Vec<Vec<JoinedRow>> = pairs
            .par_iter()
            .map(|&(band, condition)| {
                let record = test(survey, condition, band);
                estimate(survey, condition, band, &self.options.interval)
                    .into_iter()
                    .map(|estimate| JoinedRow {
                        estimate,
                        test: record.clone(),
                    })
                    .collect()
            })
            .collect();

        groups.into_iter().flatten().collect()
    }

    /// Full pipeline from a cleaned survey to a report
    pub fn run(&self, survey: &CleanedSurvey, loaded: Vec<SourceCount>) -> Report {
        let joined = self.evaluate(survey);
        let combinations = self.age_bands.len() * survey.conditions.len();
        tracing::debug!(rows = joined.len(), combinations, "estimated all combinations");

        let tags: Vec<SourceTag> = survey.sources.iter().map(|s| s.tag.clone()).collect();
        let (reliable, dropped) = filter(joined, &tags, &self.options.reliability);
        let (rows, correction) = bonferroni(reliable, self.options.alpha);

        tracing::info!(
            combinations,
            retained = correction.m,
            dropped = dropped.len(),
            threshold = ?correction.threshold,
            "analysis complete"
        );

        Report {
            generated_at: Utc::now(),
            sources: survey.sources.clone(),
            age_bands: self.age_bands.clone(),
            conditions: survey.conditions.clone(),
            confidence_level: self.options.interval.level,
            stats: RunStats {
                loaded,
                cleaned: survey.domain_counts(),
                combinations,
                retained: correction.m,
            },
            rows,
            dropped,
            correction,
        }
    }
}
