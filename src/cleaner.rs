//! Cleaner - recodes raw rows into observations and builds the survey design
//!
//! The design is built over every loaded row. Restricting to the configured
//! provider types and to answered chronic condition counts narrows the
//! analysis [`Domain`] only, so strata and PSUs keep their full membership.

use crate::config::Config;
use crate::loader::{RawDataset, RawFrame};
use crate::survey::{Domain, SurveyDesign};
use crate::{
    Condition, PrevalenceError, ProviderType, Result, SourceCount, SourceInfo, SourceTag,
};

/// One surveyed patient visit
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Index into [`CleanedSurvey::sources`]
    pub source: usize,
    pub stratum: String,
    pub cluster: String,
    pub weight: f64,
    pub provider: Option<ProviderType>,
    /// `None` when the count was left unanswered
    pub total_chronic: Option<u32>,
    /// One entry per catalogued condition; `None` is missing
    pub conditions: Vec<Option<bool>>,
    pub age: Option<u32>,
}

/// Cleaned, design-weighted dataset consumed by the analysis stage
#[derive(Debug, Clone)]
pub struct CleanedSurvey {
    pub sources: Vec<SourceInfo>,
    pub conditions: Vec<Condition>,
    pub observations: Vec<Observation>,
    pub design: SurveyDesign,
    /// Rows kept by the provider and answered-count filters
    pub domain: Domain,
}

impl CleanedSurvey {
    /// Rows inside the analysis domain per source
    pub fn domain_counts(&self) -> Vec<SourceCount> {
        self.sources
            .iter()
            .enumerate()
            .map(|(s, info)| SourceCount {
                source: info.tag.clone(),
                rows: self
                    .domain
                    .indices()
                    .filter(|&i| self.observations[i].source == s)
                    .count(),
            })
            .collect()
    }

    pub fn condition_index(&self, code: &str) -> Option<usize> {
        self.conditions.iter().position(|c| c.code == code)
    }
}

/// Column positions of one frame
struct FrameColumns {
    stratum: usize,
    cluster: usize,
    weight: usize,
    specialty: usize,
    total_chronic: usize,
    age: usize,
    conditions: Vec<usize>,
}

impl FrameColumns {
    fn resolve(frame: &RawFrame, config: &Config, conditions: &[Condition]) -> Result<Self> {
        let find = |name: &str| {
            frame.column(name).ok_or_else(|| PrevalenceError::MissingColumn {
                tag: frame.source.to_string(),
                column: name.to_string(),
            })
        };
        let columns = &config.columns;
        Ok(Self {
            stratum: find(columns.stratum())?,
            cluster: find(columns.cluster())?,
            weight: find(columns.weight())?,
            specialty: find(columns.specialty())?,
            total_chronic: find(columns.total_chronic())?,
            age: find(columns.age())?,
            conditions: conditions
                .iter()
                .map(|c| find(&c.code))
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

/// Clean the raw extracts and build the survey design
pub fn clean(raw: &RawDataset, config: &Config) -> Result<CleanedSurvey> {
    let conditions = config.get_conditions();
    let provider_types = config.get_provider_types();
    let sentinel = config.unanswered_sentinel();
    let column_names = &config.columns;

    let sources: Vec<SourceInfo> = config
        .get_sources()
        .iter()
        .map(|s| s.info())
        .collect();

    let mut observations = Vec::with_capacity(raw.row_count());
    for frame in &raw.frames {
        let source = source_index(&sources, &frame.source)?;
        let cols = FrameColumns::resolve(frame, config, &conditions)?;
        let tag = frame.source.as_str();

        for (row, record) in frame.records.iter().enumerate() {
            let field = |idx: usize| record.get(idx).unwrap_or("");
            let invalid = |column: &str, value: &str| PrevalenceError::InvalidValue {
                tag: tag.to_string(),
                row: row + 1,
                column: column.to_string(),
                value: value.to_string(),
            };

            let weight_raw = field(cols.weight);
            let weight = parse_number(weight_raw)
                .filter(|w| w.is_finite() && *w >= 0.0)
                .ok_or_else(|| invalid(column_names.weight(), weight_raw))?;

            let age_raw = field(cols.age);
            let age = parse_age(age_raw).map_err(|_| invalid(column_names.age(), age_raw))?;

            let total_raw = field(cols.total_chronic);
            let total_chronic = parse_count(total_raw, sentinel)
                .map_err(|_| invalid(column_names.total_chronic(), total_raw))?;

            let indicators = conditions
                .iter()
                .zip(&cols.conditions)
                .map(|(condition, &idx)| {
                    let value = field(idx);
                    recode_indicator(value, sentinel).map_err(|_| invalid(&condition.code, value))
                })
                .collect::<Result<Vec<_>>>()?;

            observations.push(Observation {
                source,
                stratum: field(cols.stratum).to_string(),
                cluster: field(cols.cluster).to_string(),
                weight,
                provider: ProviderType::parse(field(cols.specialty)),
                total_chronic,
                conditions: indicators,
                age,
            });
        }
    }

    let design = SurveyDesign::new(
        observations
            .iter()
            .map(|o| (o.stratum.as_str(), o.cluster.as_str(), o.weight)),
        config.lonely_psu(),
    )?;

    let domain = Domain::full(observations.len()).restrict(|i| {
        let obs = &observations[i];
        obs.total_chronic.is_some()
            && obs
                .provider
                .map(|p| provider_types.contains(&p))
                .unwrap_or(false)
    });

    tracing::info!(
        rows = observations.len(),
        in_domain = domain.count(),
        strata = design.strata_count(),
        psus = design.psu_count(),
        "built survey design"
    );

    Ok(CleanedSurvey {
        sources,
        conditions,
        observations,
        design,
        domain,
    })
}

fn source_index(sources: &[SourceInfo], tag: &SourceTag) -> Result<usize> {
    sources
        .iter()
        .position(|s| &s.tag == tag)
        .ok_or_else(|| PrevalenceError::Design(format!("unknown source tag '{}'", tag)))
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

fn is_blank_label(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v.is_empty() || v == "." || v == "na" || v.contains("blank") || v.contains("missing")
}

/// Age in whole years; blank is missing
fn parse_age(raw: &str) -> std::result::Result<Option<u32>, ()> {
    if is_blank_label(raw) {
        return Ok(None);
    }
    if raw.trim().to_lowercase().starts_with("under 1") {
        return Ok(Some(0));
    }
    match parse_number(raw) {
        Some(age) if age.is_finite() && age >= 0.0 => Ok(Some(age.floor() as u32)),
        Some(_) => Ok(None),
        None => Err(()),
    }
}

/// Chronic condition count; the sentinel and blank labels are unanswered
fn parse_count(raw: &str, sentinel: i64) -> std::result::Result<Option<u32>, ()> {
    if is_blank_label(raw) {
        return Ok(None);
    }
    match parse_number(raw) {
        Some(n) if n == sentinel as f64 => Ok(None),
        Some(n) if n.is_finite() && n >= 0.0 && n.fract() == 0.0 => Ok(Some(n as u32)),
        _ => Err(()),
    }
}

/// Recode an indicator label to present / absent / missing
pub fn recode_indicator(raw: &str, sentinel: i64) -> std::result::Result<Option<bool>, ()> {
    if is_blank_label(raw) {
        return Ok(None);
    }
    match raw.trim().to_lowercase().as_str() {
        "yes" | "true" | "y" => return Ok(Some(true)),
        "no" | "false" | "n" => return Ok(Some(false)),
        _ => {}
    }
    match parse_number(raw) {
        Some(n) if n == 1.0 => Ok(Some(true)),
        Some(n) if n == 0.0 => Ok(Some(false)),
        Some(n) if n == sentinel as f64 => Ok(None),
        _ => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Loader;

    const HEADER: &str = "CSTRATM,CPSUM,PATWT,SPECCAT,TOTCHRON,AGE,HTN,ASTHMA";

    fn config() -> Config {
        serde_json::from_str(
            r#"{
                "conditions": [
                    { "code": "HTN", "label": "Hypertension" },
                    { "code": "ASTHMA", "label": "Asthma" }
                ]
            }"#,
        )
        .unwrap()
    }

    fn dataset(chc: &str, ppp: &str) -> RawDataset {
        let loader = Loader::new(".", b',');
        RawDataset {
            frames: vec![
                loader
                    .parse(SourceTag::new("CHC"), "chc", format!("{}\n{}", HEADER, chc).as_bytes())
                    .unwrap(),
                loader
                    .parse(SourceTag::new("PPP"), "ppp", format!("{}\n{}", HEADER, ppp).as_bytes())
                    .unwrap(),
            ],
        }
    }

    #[test]
    fn test_recode_indicator_labels() {
        assert_eq!(recode_indicator("Yes", -9), Ok(Some(true)));
        assert_eq!(recode_indicator("no", -9), Ok(Some(false)));
        assert_eq!(recode_indicator("1", -9), Ok(Some(true)));
        assert_eq!(recode_indicator("0.0", -9), Ok(Some(false)));
        assert_eq!(recode_indicator("-9", -9), Ok(None));
        assert_eq!(recode_indicator("", -9), Ok(None));
        assert_eq!(recode_indicator("Blank", -9), Ok(None));
        assert!(recode_indicator("maybe", -9).is_err());
        assert!(recode_indicator("2", -9).is_err());
    }

    #[test]
    fn test_parse_count_sentinel_is_unanswered() {
        assert_eq!(parse_count("-9", -9), Ok(None));
        assert_eq!(parse_count("3", -9), Ok(Some(3)));
        assert_eq!(parse_count("Entire item blank", -9), Ok(None));
        assert!(parse_count("1.5", -9).is_err());
    }

    #[test]
    fn test_parse_age_labels() {
        assert_eq!(parse_age("45"), Ok(Some(45)));
        assert_eq!(parse_age("Under 1 year"), Ok(Some(0)));
        assert_eq!(parse_age(""), Ok(None));
        assert!(parse_age("old").is_err());
    }

    #[test]
    fn test_clean_builds_domain_from_filters() {
        let raw = dataset(
            "1,10,100,1,2,40,1,0\n1,11,100,2,2,40,1,0\n2,10,100,Primary care,-9,40,-9,-9",
            "3,20,50,1,0,10,No,Yes\n3,21,50,1,1,70,Yes,",
        );
        let survey = clean(&raw, &config()).unwrap();

        assert_eq!(survey.observations.len(), 5);
        assert_eq!(survey.design.strata_count(), 3);
        assert_eq!(survey.design.psu_count(), 5);
        // Row 2 is surgical care, row 3 has an unanswered count
        assert!(survey.domain.contains(0));
        assert!(!survey.domain.contains(1));
        assert!(!survey.domain.contains(2));
        assert!(survey.domain.contains(3));
        assert!(survey.domain.contains(4));

        let counts = survey.domain_counts();
        assert_eq!(counts[0].rows, 1);
        assert_eq!(counts[1].rows, 2);

        let last = &survey.observations[4];
        assert_eq!(last.source, 1);
        assert_eq!(last.conditions, vec![Some(true), None]);
        assert_eq!(survey.condition_index("ASTHMA"), Some(1));
    }

    #[test]
    fn test_missing_column_is_reported() {
        let loader = Loader::new(".", b',');
        let raw = RawDataset {
            frames: vec![loader
                .parse(SourceTag::new("CHC"), "chc", b"CSTRATM,CPSUM,PATWT\n1,1,1\n")
                .unwrap()],
        };
        let err = clean(&raw, &config()).unwrap_err();
        assert!(
            matches!(err, PrevalenceError::MissingColumn { ref column, .. } if column == "SPECCAT")
        );
    }

    #[test]
    fn test_invalid_weight_is_reported_with_row() {
        let raw = dataset("1,10,heavy,1,2,40,1,0", "3,20,50,1,0,10,0,1");
        let err = clean(&raw, &config()).unwrap_err();
        assert!(matches!(
            err,
            PrevalenceError::InvalidValue { ref column, row: 1, .. } if column == "PATWT"
        ));
    }

    #[test]
    fn test_unknown_source_tag_rejected() {
        let loader = Loader::new(".", b',');
        let raw = RawDataset {
            frames: vec![loader
                .parse(
                    SourceTag::new("XYZ"),
                    "xyz",
                    format!("{}\n1,1,1,1,0,1,0,0", HEADER).as_bytes(),
                )
                .unwrap()],
        };
        assert!(matches!(
            clean(&raw, &config()).unwrap_err(),
            PrevalenceError::Design(_)
        ));
    }
}
