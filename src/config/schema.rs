//! Config schema and deserialization

use crate::analysis::{CiMethod, ReliabilityRule};
use crate::survey::LonelyPsu;
use crate::{AgeBand, Condition, ProviderType, SourceInfo, SourceTag};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One survey extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Tag attached to every row of this extract (e.g. "CHC")
    pub tag: String,

    /// Display name (default: the tag)
    #[serde(default)]
    pub label: Option<String>,

    /// Local file, relative to the working directory. `.gz` files are decompressed.
    pub path: String,

    /// Where to download the file from when it is not present locally
    #[serde(default)]
    pub url: Option<String>,
}

impl SourceConfig {
    pub fn info(&self) -> SourceInfo {
        SourceInfo {
            tag: SourceTag::new(&self.tag),
            label: self.label.clone().unwrap_or_else(|| self.tag.clone()),
        }
    }
}

/// Column names of the design and demographic fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConfig {
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub total_chronic: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
}

impl ColumnConfig {
    pub fn stratum(&self) -> &str {
        self.stratum.as_deref().unwrap_or("CSTRATM")
    }

    pub fn cluster(&self) -> &str {
        self.cluster.as_deref().unwrap_or("CPSUM")
    }

    pub fn weight(&self) -> &str {
        self.weight.as_deref().unwrap_or("PATWT")
    }

    pub fn specialty(&self) -> &str {
        self.specialty.as_deref().unwrap_or("SPECCAT")
    }

    pub fn total_chronic(&self) -> &str {
        self.total_chronic.as_deref().unwrap_or("TOTCHRON")
    }

    pub fn age(&self) -> &str {
        self.age.as_deref().unwrap_or("AGE")
    }

    fn merge_from(&mut self, base: ColumnConfig) {
        if self.stratum.is_none() {
            self.stratum = base.stratum;
        }
        if self.cluster.is_none() {
            self.cluster = base.cluster;
        }
        if self.weight.is_none() {
            self.weight = base.weight;
        }
        if self.specialty.is_none() {
            self.specialty = base.specialty;
        }
        if self.total_chronic.is_none() {
            self.total_chronic = base.total_chronic;
        }
        if self.age.is_none() {
            self.age = base.age;
        }
    }
}

/// Partial reliability thresholds (unset values fall back to the defaults)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReliabilityConfig {
    #[serde(default)]
    pub min_count: Option<usize>,
    #[serde(default)]
    pub max_rse: Option<f64>,
}

/// Root config structure for .prevalencerc.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Extend another config file (path relative to this config)
    #[serde(default)]
    pub extends: Option<String>,

    /// Exactly two survey extracts
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub columns: ColumnConfig,

    /// Value marking an unanswered chronic condition count. Default: -9
    #[serde(default)]
    pub unanswered_sentinel: Option<i64>,

    /// Field delimiter of the extracts. Default: ','
    #[serde(default)]
    pub delimiter: Option<char>,

    /// Condition indicator columns and labels (default: built-in catalogue)
    #[serde(default)]
    pub conditions: Option<Vec<Condition>>,

    /// Age bands (default: 0-17, 18-64, 65-100 and 0-100)
    #[serde(default)]
    pub age_bands: Vec<AgeBand>,

    /// Provider specialties kept in the analysis domain (default: primary care)
    #[serde(default)]
    pub provider_types: Vec<ProviderType>,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    /// Family-wise significance level before correction. Default: 0.05
    #[serde(default)]
    pub alpha: Option<f64>,

    /// Confidence level of the intervals. Default: 0.95
    #[serde(default)]
    pub confidence_level: Option<f64>,

    #[serde(default)]
    pub ci_method: Option<CiMethod>,

    #[serde(default)]
    pub lonely_psu: Option<LonelyPsu>,
}

impl Config {
    /// Merge CLI overrides into config. CLI values take precedence.
    pub fn merge_with_cli(mut self, cli_alpha: Option<f64>) -> Self {
        if cli_alpha.is_some() {
            self.alpha = cli_alpha;
        }
        self
    }

    /// Merge another config into this one (for extends)
    pub fn merge_from(&mut self, base: Config) {
        // Base values are overridden by this config's values
        if self.extends.is_none() {
            self.extends = base.extends;
        }
        if self.sources.is_empty() {
            self.sources = base.sources;
        }
        self.columns.merge_from(base.columns);
        if self.unanswered_sentinel.is_none() {
            self.unanswered_sentinel = base.unanswered_sentinel;
        }
        if self.delimiter.is_none() {
            self.delimiter = base.delimiter;
        }
        if self.conditions.is_none() {
            self.conditions = base.conditions;
        }
        if self.age_bands.is_empty() {
            self.age_bands = base.age_bands;
        }
        if self.provider_types.is_empty() {
            self.provider_types = base.provider_types;
        }
        if self.reliability.min_count.is_none() {
            self.reliability.min_count = base.reliability.min_count;
        }
        if self.reliability.max_rse.is_none() {
            self.reliability.max_rse = base.reliability.max_rse;
        }
        if self.alpha.is_none() {
            self.alpha = base.alpha;
        }
        if self.confidence_level.is_none() {
            self.confidence_level = base.confidence_level;
        }
        if self.ci_method.is_none() {
            self.ci_method = base.ci_method;
        }
        if self.lonely_psu.is_none() {
            self.lonely_psu = base.lonely_psu;
        }
    }

    pub fn get_sources(&self) -> Vec<SourceConfig> {
        if self.sources.is_empty() {
            vec![
                SourceConfig {
                    tag: "CHC".to_string(),
                    label: Some("Community health centers".to_string()),
                    path: "data/chc.csv".to_string(),
                    url: None,
                },
                SourceConfig {
                    tag: "PPP".to_string(),
                    label: Some("Private physician practices".to_string()),
                    path: "data/ppp.csv".to_string(),
                    url: None,
                },
            ]
        } else {
            self.sources.clone()
        }
    }

    /// Configured conditions, the built-in catalogue when the key is absent
    pub fn get_conditions(&self) -> Vec<Condition> {
        self.conditions
            .clone()
            .unwrap_or_else(Condition::default_catalog)
    }

    pub fn get_age_bands(&self) -> Vec<AgeBand> {
        if self.age_bands.is_empty() {
            AgeBand::defaults()
        } else {
            self.age_bands.clone()
        }
    }

    pub fn get_provider_types(&self) -> Vec<ProviderType> {
        if self.provider_types.is_empty() {
            vec![ProviderType::PrimaryCare]
        } else {
            self.provider_types.clone()
        }
    }

    pub fn reliability_rule(&self) -> ReliabilityRule {
        let defaults = ReliabilityRule::default();
        ReliabilityRule {
            min_count: self.reliability.min_count.unwrap_or(defaults.min_count),
            max_rse: self.reliability.max_rse.unwrap_or(defaults.max_rse),
        }
    }

    pub fn unanswered_sentinel(&self) -> i64 {
        self.unanswered_sentinel.unwrap_or(-9)
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter.map(|c| c as u8).unwrap_or(b',')
    }

    pub fn alpha(&self) -> f64 {
        self.alpha.unwrap_or(0.05)
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level.unwrap_or(0.95)
    }

    pub fn ci_method(&self) -> CiMethod {
        self.ci_method.unwrap_or_default()
    }

    pub fn lonely_psu(&self) -> LonelyPsu {
        self.lonely_psu.unwrap_or_default()
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), String> {
        let sources = self.get_sources();
        if sources.len() != 2 {
            return Err(format!(
                "exactly two sources are required, found {}",
                sources.len()
            ));
        }
        if sources[0].tag == sources[1].tag {
            return Err(format!("duplicate source tag '{}'", sources[0].tag));
        }

        let conditions = self.get_conditions();
        if conditions.is_empty() {
            return Err("at least one condition is required".to_string());
        }
        let mut seen = HashSet::new();
        for condition in &conditions {
            if !seen.insert(condition.code.as_str()) {
                return Err(format!("duplicate condition '{}'", condition.code));
            }
        }

        let mut seen = HashSet::new();
        for band in self.get_age_bands() {
            if band.min > band.max {
                return Err(format!(
                    "age band '{}' has min {} above max {}",
                    band.code, band.min, band.max
                ));
            }
            if !seen.insert(band.code.clone()) {
                return Err(format!("duplicate age band '{}'", band.code));
            }
        }

        let alpha = self.alpha();
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(format!("alpha must be between 0 and 1, got {}", alpha));
        }
        let level = self.confidence_level();
        if !(level > 0.0 && level < 1.0) {
            return Err(format!(
                "confidenceLevel must be between 0 and 1, got {}",
                level
            ));
        }
        if let Some(c) = self.delimiter {
            if !c.is_ascii() {
                return Err(format!("delimiter must be an ASCII character, got '{}'", c));
            }
        }
        Ok(())
    }
}
