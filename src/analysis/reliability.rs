//! Reliability filter - drops (band, condition) pairs with an unreliable estimate

use crate::{DroppedCombination, EstimateRecord, JoinedRow, SourceTag, Unreliability};
use serde::{Deserialize, Serialize};

/// Minimum sample size and maximum relative standard error for a reportable estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReliabilityRule {
    pub min_count: usize,
    pub max_rse: f64,
}

impl Default for ReliabilityRule {
    fn default() -> Self {
        Self {
            min_count: 30,
            max_rse: 0.30,
        }
    }
}

impl ReliabilityRule {
    /// First failing check, or `None` when the estimate is reliable
    pub fn check(&self, estimate: &EstimateRecord) -> Option<Unreliability> {
        if estimate.count < self.min_count {
            return Some(Unreliability::SmallSample {
                count: estimate.count,
            });
        }
        match estimate.rse {
            None => Some(Unreliability::UndefinedRse),
            Some(rse) if rse > self.max_rse => Some(Unreliability::HighRse { rse }),
            Some(_) => None,
        }
    }

    pub fn is_reliable(&self, estimate: &EstimateRecord) -> bool {
        self.check(estimate).is_none()
    }
}

/// Keep the pairs whose estimates are reliable for every source.
///
/// A source without a row for a pair counts as an empty sample. Output keeps
/// the input order.
pub fn filter(
    rows: Vec<JoinedRow>,
    sources: &[SourceTag],
    rule: &ReliabilityRule,
) -> (Vec<JoinedRow>, Vec<DroppedCombination>) {
    let mut groups: Vec<Vec<JoinedRow>> = Vec::new();
    for row in rows {
        match groups.iter_mut().find(|g| g[0].key() == row.key()) {
            Some(group) => group.push(row),
            None => groups.push(vec![row]),
        }
    }

    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for group in groups {
        let unreliable: Vec<(SourceTag, Unreliability)> = sources
            .iter()
            .filter_map(|tag| {
                let failure = match group.iter().find(|r| &r.estimate.source == tag) {
                    Some(row) => rule.check(&row.estimate),
                    None => Some(Unreliability::SmallSample { count: 0 }),
                };
                failure.map(|f| (tag.clone(), f))
            })
            .collect();

        if unreliable.is_empty() {
            kept.extend(group);
        } else {
            let (age_band, condition) = group[0].key();
            tracing::debug!(age_band, condition, "dropping unreliable combination");
            dropped.push(DroppedCombination {
                age_band: age_band.to_string(),
                condition: condition.to_string(),
                unreliable,
            });
        }
    }

    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TestOutcome, TestRecord};

    fn estimate(source: &str, condition: &str, count: usize, mean: f64, se: f64) -> EstimateRecord {
        EstimateRecord {
            source: SourceTag::new(source),
            age_band: "18_64".to_string(),
            condition: condition.to_string(),
            count,
            mean: Some(mean),
            ci_lower: Some(mean),
            ci_upper: Some(mean),
            std_error: Some(se),
            rse: if mean > 0.0 { Some(se / mean) } else { None },
        }
    }

    fn joined(estimate: EstimateRecord) -> JoinedRow {
        let test = TestRecord {
            age_band: estimate.age_band.clone(),
            condition: estimate.condition.clone(),
            outcome: TestOutcome::Defined {
                statistic: 1.0,
                df_num: 1.0,
                df_den: 100.0,
                p_value: 0.3,
            },
        };
        JoinedRow { estimate, test }
    }

    fn sources() -> Vec<SourceTag> {
        vec![SourceTag::new("CHC"), SourceTag::new("PPP")]
    }

    #[test]
    fn test_rule_thresholds() {
        let rule = ReliabilityRule::default();
        assert!(rule.is_reliable(&estimate("CHC", "HTN", 30, 0.5, 0.15)));
        assert_eq!(
            rule.check(&estimate("CHC", "HTN", 29, 0.5, 0.01)),
            Some(Unreliability::SmallSample { count: 29 })
        );
        assert!(matches!(
            rule.check(&estimate("CHC", "HTN", 500, 0.1, 0.031)),
            Some(Unreliability::HighRse { .. })
        ));
        // RSE exactly at the limit is still reliable
        assert!(rule.is_reliable(&estimate("CHC", "HTN", 500, 0.5, 0.15)));
        assert_eq!(
            rule.check(&estimate("CHC", "HTN", 500, 0.0, 0.0)),
            Some(Unreliability::UndefinedRse)
        );
    }

    #[test]
    fn test_pair_dropped_when_one_source_small() {
        let rows = vec![
            joined(estimate("CHC", "HTN", 25, 0.4, 0.02)),
            joined(estimate("PPP", "HTN", 200, 0.3, 0.02)),
            joined(estimate("CHC", "ASTHMA", 100, 0.1, 0.01)),
            joined(estimate("PPP", "ASTHMA", 200, 0.1, 0.01)),
        ];
        let (kept, dropped) = filter(rows, &sources(), &ReliabilityRule::default());

        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.estimate.condition == "ASTHMA"));
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].condition, "HTN");
        assert_eq!(
            dropped[0].unreliable,
            vec![(SourceTag::new("CHC"), Unreliability::SmallSample { count: 25 })]
        );
    }

    #[test]
    fn test_missing_source_row_counts_as_empty() {
        let rows = vec![joined(estimate("PPP", "HTN", 200, 0.3, 0.02))];
        let (kept, dropped) = filter(rows, &sources(), &ReliabilityRule::default());
        assert!(kept.is_empty());
        assert_eq!(
            dropped[0].unreliable,
            vec![(SourceTag::new("CHC"), Unreliability::SmallSample { count: 0 })]
        );
    }

    #[test]
    fn test_undefined_estimate_is_dropped() {
        let mut empty = estimate("CHC", "HTN", 0, 0.0, 0.0);
        empty.mean = None;
        empty.std_error = None;
        let rows = vec![joined(empty), joined(estimate("PPP", "HTN", 200, 0.3, 0.02))];
        let (kept, dropped) = filter(rows, &sources(), &ReliabilityRule::default());
        assert!(kept.is_empty());
        assert_eq!(dropped.len(), 1);
    }

    #[test]
    fn test_custom_rule() {
        let rule = ReliabilityRule {
            min_count: 10,
            max_rse: 0.5,
        };
        assert!(rule.is_reliable(&estimate("CHC", "HTN", 12, 0.1, 0.04)));
    }
}
