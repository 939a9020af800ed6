//! Prevalence: survey-weighted chronic condition report
//!
//! This library loads two survey extracts (one per data source), builds a
//! stratified cluster sampling design, estimates the weighted prevalence of
//! each chronic condition per age band and source, compares the two sources
//! with a design-adjusted chi-squared test, and renders comparison tables.

pub mod analysis;
pub mod cache;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod loader;
pub mod reporter;
pub mod survey;

pub use error::{PrevalenceError, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a data source (e.g. `CHC`, `PPP`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTag(String);

impl SourceTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A data source as it appears in reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub tag: SourceTag,
    /// Human-readable name used in table headers
    pub label: String,
}

/// Inclusive integer age range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeBand {
    /// Short code (e.g. "18_64")
    pub code: String,
    /// Label used in rendered tables (e.g. "18-64 years")
    pub label: String,
    pub min: u32,
    pub max: u32,
}

impl AgeBand {
    pub fn new(code: &str, label: &str, min: u32, max: u32) -> Self {
        Self {
            code: code.to_string(),
            label: label.to_string(),
            min,
            max,
        }
    }

    pub fn contains(&self, age: u32) -> bool {
        (self.min..=self.max).contains(&age)
    }

    /// The four report bands. The last one is the union of the first three.
    pub fn defaults() -> Vec<AgeBand> {
        vec![
            AgeBand::new("0_17", "0-17 years", 0, 17),
            AgeBand::new("18_64", "18-64 years", 18, 64),
            AgeBand::new("65_100", "65 years and over", 65, 100),
            AgeBand::new("0_100", "All ages", 0, 100),
        ]
    }
}

/// A chronic condition column and its display label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Column name in the survey extract (e.g. "HTN")
    pub code: String,
    pub label: String,
}

impl Condition {
    pub fn new(code: &str, label: &str) -> Self {
        Self {
            code: code.to_string(),
            label: label.to_string(),
        }
    }

    /// Default catalogue of chronic condition indicators
    pub fn default_catalog() -> Vec<Condition> {
        vec![
            Condition::new("ARTHRTIS", "Arthritis"),
            Condition::new("ASTHMA", "Asthma"),
            Condition::new("CANCER", "Cancer"),
            Condition::new("CEBVD", "Cerebrovascular disease"),
            Condition::new("CHF", "Congestive heart failure"),
            Condition::new("CKD", "Chronic kidney disease"),
            Condition::new("COPD", "COPD"),
            Condition::new("DEPRN", "Depression"),
            Condition::new("DIABTYP2", "Diabetes, type 2"),
            Condition::new("HPE", "History of pulmonary embolism"),
            Condition::new("HTN", "Hypertension"),
            Condition::new("HYPLIPID", "Hyperlipidemia"),
            Condition::new("IHD", "Ischemic heart disease"),
            Condition::new("OBESITY", "Obesity"),
        ]
    }
}

/// Provider specialty category of the visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    PrimaryCare,
    SurgicalCare,
    MedicalCare,
}

impl ProviderType {
    /// Recode a raw specialty value: numeric code (1-3) or its label
    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim().to_lowercase();
        match value.as_str() {
            "1" | "1.0" | "primary care" | "primary-care" | "primary care specialty" => {
                Some(ProviderType::PrimaryCare)
            }
            "2" | "2.0" | "surgical care" | "surgical-care" | "surgical care specialty" => {
                Some(ProviderType::SurgicalCare)
            }
            "3" | "3.0" | "medical care" | "medical-care" | "medical care specialty" => {
                Some(ProviderType::MedicalCare)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::PrimaryCare => write!(f, "primary-care"),
            ProviderType::SurgicalCare => write!(f, "surgical-care"),
            ProviderType::MedicalCare => write!(f, "medical-care"),
        }
    }
}

/// Weighted prevalence of one condition, in one age band, for one source.
///
/// Undefined quantities are `None`, never zero: a group without qualifying
/// observations has `count == 0` and no mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRecord {
    pub source: SourceTag,
    pub age_band: String,
    pub condition: String,
    /// Unweighted number of non-missing indicator values
    pub count: usize,
    /// Weighted proportion (0-1)
    pub mean: Option<f64>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
    pub std_error: Option<f64>,
    /// Relative standard error (SE / mean)
    pub rse: Option<f64>,
}

/// Why a significance test could not be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UndefinedReason {
    /// One source has no weighted observations in the domain
    EmptySource,
    /// The condition is all-present or all-absent in the domain
    NoConditionVariation,
    /// One source has the condition always present or always absent
    EmptyCell,
    /// The design variance of the association contrast is zero
    ZeroVariance,
    /// The design has no denominator degrees of freedom
    NoDegreesOfFreedom,
}

impl std::fmt::Display for UndefinedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UndefinedReason::EmptySource => write!(f, "a source has no observations"),
            UndefinedReason::NoConditionVariation => write!(f, "condition does not vary"),
            UndefinedReason::EmptyCell => write!(f, "a source-by-condition cell is empty"),
            UndefinedReason::ZeroVariance => write!(f, "zero design variance"),
            UndefinedReason::NoDegreesOfFreedom => write!(f, "no design degrees of freedom"),
        }
    }
}

/// Result of the design-adjusted test of independence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TestOutcome {
    #[serde(rename_all = "camelCase")]
    Defined {
        /// Rao-Scott F statistic
        statistic: f64,
        df_num: f64,
        df_den: f64,
        p_value: f64,
    },
    Undefined { reason: UndefinedReason },
}

impl TestOutcome {
    pub fn p_value(&self) -> Option<f64> {
        match self {
            TestOutcome::Defined { p_value, .. } => Some(*p_value),
            TestOutcome::Undefined { .. } => None,
        }
    }
}

/// Association test between condition presence and source, per age band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub age_band: String,
    pub condition: String,
    pub outcome: TestOutcome,
}

/// One estimate joined to the test record shared by its (band, condition)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedRow {
    pub estimate: EstimateRecord,
    pub test: TestRecord,
}

impl JoinedRow {
    pub fn key(&self) -> (&str, &str) {
        (&self.estimate.age_band, &self.estimate.condition)
    }
}

/// A joined row that survived the reliability filter, annotated after correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedRow {
    pub estimate: EstimateRecord,
    pub test: TestRecord,
    pub significant: bool,
}

/// Why an estimate failed the reliability rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Unreliability {
    SmallSample { count: usize },
    HighRse { rse: f64 },
    UndefinedRse,
}

impl std::fmt::Display for Unreliability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unreliability::SmallSample { count } => write!(f, "n={}", count),
            Unreliability::HighRse { rse } => write!(f, "RSE={:.2}", rse),
            Unreliability::UndefinedRse => write!(f, "RSE undefined"),
        }
    }
}

/// A (band, condition) pair excluded by the reliability filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedCombination {
    pub age_band: String,
    pub condition: String,
    /// Every unreliable source with its first failing check
    pub unreliable: Vec<(SourceTag, Unreliability)>,
}

/// Bonferroni correction parameters actually applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub alpha: f64,
    /// Number of surviving (band, condition) tests
    pub m: usize,
    /// alpha / m, absent when nothing survived
    pub threshold: Option<f64>,
}

/// Row counts for one source at a pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCount {
    pub source: SourceTag,
    pub rows: usize,
}

/// Bookkeeping shown in the run summary
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    /// Rows read per source
    pub loaded: Vec<SourceCount>,
    /// Rows inside the cleaned analysis domain per source
    pub cleaned: Vec<SourceCount>,
    /// (band, condition) pairs evaluated
    pub combinations: usize,
    /// Pairs that survived the reliability filter
    pub retained: usize,
}

/// Everything the reporters need
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub sources: Vec<SourceInfo>,
    pub age_bands: Vec<AgeBand>,
    pub conditions: Vec<Condition>,
    pub rows: Vec<AnnotatedRow>,
    pub dropped: Vec<DroppedCombination>,
    pub correction: Correction,
    /// Coverage of the confidence intervals (e.g. 0.95)
    pub confidence_level: f64,
    pub stats: RunStats,
}

impl Report {
    /// Significance-annotated rows for one (band, condition) pair, in source order
    pub fn rows_for(&self, age_band: &str, condition: &str) -> Vec<&AnnotatedRow> {
        let mut rows: Vec<&AnnotatedRow> = self
            .rows
            .iter()
            .filter(|r| r.estimate.age_band == age_band && r.estimate.condition == condition)
            .collect();
        rows.sort_by_key(|r| {
            self.sources
                .iter()
                .position(|s| s.tag == r.estimate.source)
                .unwrap_or(usize::MAX)
        });
        rows
    }
}
