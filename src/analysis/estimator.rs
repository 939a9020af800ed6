//! Weighted prevalence per source for one condition and age band

use crate::cleaner::CleanedSurvey;
use crate::{AgeBand, EstimateRecord};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Confidence interval construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiMethod {
    /// Symmetric on the logit scale, back-transformed; always inside [0, 1]
    #[default]
    Logit,
    /// Mean +/- t * SE, clamped to [0, 1]
    Wald,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalOptions {
    pub level: f64,
    pub method: CiMethod,
}

impl Default for IntervalOptions {
    fn default() -> Self {
        Self {
            level: 0.95,
            method: CiMethod::Logit,
        }
    }
}

/// Estimate the prevalence of `condition` (catalogue index) within `band`,
/// one record per configured source.
///
/// A source without qualifying rows still yields a record, with `count == 0`
/// and every statistic undefined.
pub fn estimate(
    survey: &CleanedSurvey,
    condition: usize,
    band: &AgeBand,
    options: &IntervalOptions,
) -> Vec<EstimateRecord> {
    let obs = &survey.observations;
    let code = &survey.conditions[condition].code;
    let in_band = survey
        .domain
        .restrict(|i| obs[i].age.map(|a| band.contains(a)).unwrap_or(false));

    survey
        .sources
        .iter()
        .enumerate()
        .map(|(s, info)| {
            let domain = in_band
                .restrict(|i| obs[i].source == s && obs[i].conditions[condition].is_some());
            let est = survey.design.mean(&domain, |i| {
                if obs[i].conditions[condition] == Some(true) {
                    1.0
                } else {
                    0.0
                }
            });

            let (ci_lower, ci_upper) = match (est.mean, est.std_error) {
                (Some(mean), Some(se)) => {
                    let df = survey.design.domain_degrees_of_freedom(&domain);
                    let (lo, hi) = confidence_interval(mean, se, df, options);
                    (Some(lo), Some(hi))
                }
                _ => (None, None),
            };

            let rse = match (est.mean, est.std_error) {
                (Some(mean), Some(se)) if mean > 0.0 => Some(se / mean),
                _ => None,
            };

            EstimateRecord {
                source: info.tag.clone(),
                age_band: band.code.clone(),
                condition: code.clone(),
                count: est.count,
                mean: est.mean,
                ci_lower,
                ci_upper,
                std_error: est.std_error,
                rse,
            }
        })
        .collect()
}

/// Two-sided critical value; Student t on `df` design degrees of freedom,
/// standard normal when the design has fewer than one.
pub fn critical_value(level: f64, df: f64) -> f64 {
    let p = 1.0 - (1.0 - level) / 2.0;
    if df.is_finite() && df >= 1.0 {
        if let Ok(t) = StudentsT::new(0.0, 1.0, df) {
            return t.inverse_cdf(p);
        }
    }
    Normal::new(0.0, 1.0)
        .map(|n| n.inverse_cdf(p))
        .unwrap_or(1.959_963_984_540_054)
}

/// Interval around a proportion. The bounds always bracket `mean`.
pub fn confidence_interval(mean: f64, se: f64, df: f64, options: &IntervalOptions) -> (f64, f64) {
    if se <= 0.0 || !se.is_finite() {
        return (mean, mean);
    }
    let q = critical_value(options.level, df);

    let (lo, hi) = match options.method {
        CiMethod::Logit => {
            if mean <= 0.0 || mean >= 1.0 {
                return (mean, mean);
            }
            let eta = (mean / (1.0 - mean)).ln();
            let se_eta = se / (mean * (1.0 - mean));
            (expit(eta - q * se_eta), expit(eta + q * se_eta))
        }
        CiMethod::Wald => ((mean - q * se).max(0.0), (mean + q * se).min(1.0)),
    };

    // expit(logit(p)) can land one ulp away from p
    (lo.min(mean), hi.max(mean))
}

fn expit(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn interval_brackets_mean(
            mean in 0.0f64..=1.0,
            se in 0.0f64..0.5,
            df in 0.0f64..500.0,
            wald in any::<bool>(),
        ) {
            let options = IntervalOptions {
                level: 0.95,
                method: if wald { CiMethod::Wald } else { CiMethod::Logit },
            };
            let (lo, hi) = confidence_interval(mean, se, df, &options);
            prop_assert!(lo >= 0.0 && hi <= 1.0);
            prop_assert!(lo <= mean && mean <= hi);
        }
    }
}
