//! Design-adjusted chi-squared test of independence between a condition and
//! the data source (Rao-Scott).
//!
//! The 2x2 table is condition (absent/present) by source. The Pearson
//! statistic computed on the weighted cell proportions is divided by the
//! estimated design effect of the interaction contrast; with a single
//! contrast the first- and second-order corrections coincide and the result
//! is referred to F(1, nu), nu being the design degrees of freedom.

use crate::cleaner::CleanedSurvey;
use crate::{AgeBand, TestOutcome, TestRecord, UndefinedReason};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

/// Test the association between `condition` and source within `band`
pub fn test(survey: &CleanedSurvey, condition: usize, band: &AgeBand) -> TestRecord {
    TestRecord {
        age_band: band.code.clone(),
        condition: survey.conditions[condition].code.clone(),
        outcome: rao_scott(survey, condition, band),
    }
}

fn rao_scott(survey: &CleanedSurvey, condition: usize, band: &AgeBand) -> TestOutcome {
    let obs = &survey.observations;
    let design = &survey.design;
    let undefined = |reason| TestOutcome::Undefined { reason };

    let domain = survey.domain.restrict(|i| {
        obs[i].source < 2
            && obs[i].conditions[condition].is_some()
            && obs[i].age.map(|a| band.contains(a)).unwrap_or(false)
    });

    // Cell k = 2 * source + present
    let cell = |i: usize| 2 * obs[i].source + usize::from(obs[i].conditions[condition] == Some(true));

    let mut cell_weight = [0.0f64; 4];
    for i in domain.indices() {
        cell_weight[cell(i)] += design.weight(i);
    }
    let total: f64 = cell_weight.iter().sum();
    if total <= 0.0 {
        return undefined(UndefinedReason::EmptySource);
    }
    let p: Vec<f64> = cell_weight.iter().map(|w| w / total).collect();

    let source_margin = [p[0] + p[1], p[2] + p[3]];
    let condition_margin = [p[0] + p[2], p[1] + p[3]];
    if source_margin.iter().any(|&m| m <= 0.0) {
        return undefined(UndefinedReason::EmptySource);
    }
    if condition_margin.iter().any(|&m| m <= 0.0) {
        return undefined(UndefinedReason::NoConditionVariation);
    }
    // The linearised contrast needs every cell; a zero cell has no defined 1/p_k
    if p.iter().any(|&pk| pk <= 0.0) {
        return undefined(UndefinedReason::EmptyCell);
    }

    let nu = design.degrees_of_freedom();
    if nu <= 0.0 {
        return undefined(UndefinedReason::NoDegreesOfFreedom);
    }

    // Pearson X^2 / N on the proportions
    let mut pearson = 0.0;
    for (k, &pk) in p.iter().enumerate() {
        let expected = source_margin[k / 2] * condition_margin[k % 2];
        pearson += (pk - expected).powi(2) / expected;
    }

    // Interaction contrast (+1, -1, -1, +1) scaled by 1/p_k
    let contrast: Vec<f64> = p
        .iter()
        .enumerate()
        .map(|(k, &pk)| {
            let sign = if k / 2 == k % 2 { 1.0 } else { -1.0 };
            sign / pk
        })
        .collect();
    let inverse_sum: f64 = p.iter().map(|pk| 1.0 / pk).sum();

    // Design variance of sum_k contrast_k * p_k
    let variance = design
        .mean(&domain, |i| contrast[cell(i)])
        .std_error
        .map(|se| se * se)
        .unwrap_or(0.0);
    if !(variance > 0.0 && variance.is_finite()) {
        return undefined(UndefinedReason::ZeroVariance);
    }

    let statistic = pearson * inverse_sum / variance;
    let p_value = match FisherSnedecor::new(1.0, nu) {
        Ok(dist) => (1.0 - dist.cdf(statistic)).clamp(0.0, 1.0),
        Err(_) => return undefined(UndefinedReason::NoDegreesOfFreedom),
    };

    TestOutcome::Defined {
        statistic,
        df_num: 1.0,
        df_den: nu,
        p_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::Observation;
    use crate::survey::{Domain, LonelyPsu, SurveyDesign};
    use crate::{Condition, ProviderType, SourceInfo, SourceTag};

    /// Simple random sample: every row its own PSU in one stratum
    fn srs(cells: [(usize, bool, usize); 4]) -> CleanedSurvey {
        let mut observations = Vec::new();
        for (source, present, n) in cells {
            for _ in 0..n {
                let id = observations.len().to_string();
                observations.push(Observation {
                    source,
                    stratum: "1".to_string(),
                    cluster: id,
                    weight: 1.0,
                    provider: Some(ProviderType::PrimaryCare),
                    total_chronic: Some(1),
                    conditions: vec![Some(present)],
                    age: Some(40),
                });
            }
        }
        build(observations)
    }

    fn build(observations: Vec<Observation>) -> CleanedSurvey {
        let design = SurveyDesign::new(
            observations
                .iter()
                .map(|o| (o.stratum.clone(), o.cluster.clone(), o.weight)),
            LonelyPsu::Adjust,
        )
        .unwrap();
        CleanedSurvey {
            sources: vec![
                SourceInfo {
                    tag: SourceTag::new("CHC"),
                    label: "CHC".to_string(),
                },
                SourceInfo {
                    tag: SourceTag::new("PPP"),
                    label: "PPP".to_string(),
                },
            ],
            conditions: vec![Condition::new("HTN", "Hypertension")],
            domain: Domain::full(observations.len()),
            design,
            observations,
        }
    }

    fn band() -> AgeBand {
        AgeBand::new("18_64", "18-64", 18, 64)
    }

    #[test]
    fn test_strong_association_is_significant() {
        let survey = srs([(0, true, 80), (0, false, 20), (1, true, 20), (1, false, 80)]);
        let record = test(&survey, 0, &band());
        assert_eq!(record.condition, "HTN");
        assert_eq!(record.age_band, "18_64");
        match record.outcome {
            TestOutcome::Defined {
                statistic,
                df_num,
                df_den,
                p_value,
            } => {
                assert_eq!(df_num, 1.0);
                assert_eq!(df_den, 199.0);
                // Close to the Pearson statistic (72) under simple random sampling
                assert!(statistic > 60.0 && statistic < 80.0, "F = {}", statistic);
                assert!(p_value < 1e-6);
            }
            other => panic!("expected defined outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_no_association_is_not_significant() {
        let survey = srs([(0, true, 30), (0, false, 70), (1, true, 30), (1, false, 70)]);
        let p = test(&survey, 0, &band()).outcome.p_value().unwrap();
        assert!(p > 0.99, "p = {}", p);
    }

    #[test]
    fn test_missing_source_is_undefined() {
        let survey = srs([(0, true, 30), (0, false, 70), (1, true, 0), (1, false, 0)]);
        assert_eq!(
            test(&survey, 0, &band()).outcome,
            TestOutcome::Undefined {
                reason: UndefinedReason::EmptySource
            }
        );
    }

    #[test]
    fn test_constant_condition_is_undefined() {
        let survey = srs([(0, true, 30), (0, false, 0), (1, true, 40), (1, false, 0)]);
        assert_eq!(
            test(&survey, 0, &band()).outcome,
            TestOutcome::Undefined {
                reason: UndefinedReason::NoConditionVariation
            }
        );
    }

    #[test]
    fn test_condition_constant_within_one_source_is_undefined() {
        // Every CHC row has the condition; PPP varies, so both margins are positive
        let survey = srs([(0, true, 100), (0, false, 0), (1, true, 90), (1, false, 10)]);
        assert_eq!(
            test(&survey, 0, &band()).outcome,
            TestOutcome::Undefined {
                reason: UndefinedReason::EmptyCell
            }
        );
    }

    #[test]
    fn test_out_of_band_rows_are_ignored() {
        let survey = srs([(0, true, 30), (0, false, 70), (1, true, 30), (1, false, 70)]);
        let children = AgeBand::new("0_17", "0-17", 0, 17);
        assert_eq!(
            test(&survey, 0, &children).outcome,
            TestOutcome::Undefined {
                reason: UndefinedReason::EmptySource
            }
        );
    }

    #[test]
    fn test_single_psu_design_has_no_degrees_of_freedom() {
        let observations = [(0, true), (0, false), (1, true), (1, false)]
            .iter()
            .map(|&(source, present)| Observation {
                source,
                stratum: "1".to_string(),
                cluster: "1".to_string(),
                weight: 1.0,
                provider: Some(ProviderType::PrimaryCare),
                total_chronic: Some(1),
                conditions: vec![Some(present)],
                age: Some(40),
            })
            .collect();
        let survey = build(observations);
        assert_eq!(
            test(&survey, 0, &band()).outcome,
            TestOutcome::Undefined {
                reason: UndefinedReason::NoDegreesOfFreedom
            }
        );
    }
}
