//! Stratified cluster sampling design
//!
//! PSUs are nested within strata and treated as sampled with replacement.
//! Variances of ratio estimates use Taylor linearisation: the influence
//! values of the estimate are summed per PSU, and the PSU totals are
//! compared within each stratum.
//!
//! Subsets are expressed as a [`Domain`] mask over the full design. Rows
//! outside the domain keep their stratum and PSU membership and contribute
//! zero, so a PSU without domain rows still counts towards its stratum.

use crate::{PrevalenceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// How a stratum with a single PSU contributes to the variance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LonelyPsu {
    /// Centre the lone PSU total on the grand mean of all PSU totals
    #[default]
    Adjust,
    /// Lone PSUs contribute nothing
    Remove,
    /// Refuse to build the design
    Fail,
}

/// Subset of design rows an estimate refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    mask: Vec<bool>,
}

impl Domain {
    /// Domain containing every row
    pub fn full(len: usize) -> Self {
        Self {
            mask: vec![true; len],
        }
    }

    pub fn from_mask(mask: Vec<bool>) -> Self {
        Self { mask }
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn contains(&self, row: usize) -> bool {
        self.mask.get(row).copied().unwrap_or(false)
    }

    /// Number of rows inside the domain
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| if m { Some(i) } else { None })
    }

    /// Narrow the domain to the rows for which `keep` holds
    pub fn restrict<F>(&self, keep: F) -> Domain
    where
        F: Fn(usize) -> bool,
    {
        let mask = self
            .mask
            .iter()
            .enumerate()
            .map(|(i, &m)| m && keep(i))
            .collect();
        Domain { mask }
    }
}

/// Weighted mean over a domain with its linearised standard error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioEstimate {
    /// Unweighted number of domain rows
    pub count: usize,
    pub weight_total: f64,
    /// `None` when the domain carries no weight
    pub mean: Option<f64>,
    pub std_error: Option<f64>,
}

#[derive(Debug, Clone)]
struct Stratum {
    name: String,
    psus: Vec<usize>,
}

/// Immutable sampling design over all loaded observations
#[derive(Debug, Clone)]
pub struct SurveyDesign {
    weights: Vec<f64>,
    /// PSU index of each row
    psu: Vec<usize>,
    /// Stratum index of each row
    row_stratum: Vec<usize>,
    strata: Vec<Stratum>,
    psu_count: usize,
    lonely_psu: LonelyPsu,
}

impl SurveyDesign {
    /// Build a design from (stratum, cluster, weight) triples, one per row.
    ///
    /// Cluster ids are nested: the same id in two strata names two PSUs.
    pub fn new<I, S, C>(rows: I, lonely_psu: LonelyPsu) -> Result<Self>
    where
        I: IntoIterator<Item = (S, C, f64)>,
        S: AsRef<str>,
        C: AsRef<str>,
    {
        let mut strata: Vec<Stratum> = Vec::new();
        let mut stratum_index: HashMap<String, usize> = HashMap::new();
        let mut psu_index: HashMap<(usize, String), usize> = HashMap::new();
        let mut weights = Vec::new();
        let mut psu = Vec::new();
        let mut row_stratum = Vec::new();

        for (row, (stratum, cluster, weight)) in rows.into_iter().enumerate() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(PrevalenceError::Design(format!(
                    "row {}: weight {} is not a non-negative number",
                    row + 1,
                    weight
                )));
            }

            let name = stratum.as_ref();
            let h = match stratum_index.get(name) {
                Some(&h) => h,
                None => {
                    strata.push(Stratum {
                        name: name.to_string(),
                        psus: Vec::new(),
                    });
                    stratum_index.insert(name.to_string(), strata.len() - 1);
                    strata.len() - 1
                }
            };

            let key = (h, cluster.as_ref().to_string());
            let g = match psu_index.get(&key) {
                Some(&g) => g,
                None => {
                    let g = psu_index.len();
                    strata[h].psus.push(g);
                    psu_index.insert(key, g);
                    g
                }
            };

            weights.push(weight);
            psu.push(g);
            row_stratum.push(h);
        }

        if weights.is_empty() {
            return Err(PrevalenceError::Design("no observations".to_string()));
        }

        if lonely_psu == LonelyPsu::Fail {
            if let Some(lonely) = strata.iter().find(|s| s.psus.len() == 1) {
                return Err(PrevalenceError::LonelyPsu(lonely.name.clone()));
            }
        }

        Ok(Self {
            weights,
            psu,
            row_stratum,
            strata,
            psu_count: psu_index.len(),
            lonely_psu,
        })
    }

    /// Number of rows in the design
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weight(&self, row: usize) -> f64 {
        self.weights[row]
    }

    pub fn strata_count(&self) -> usize {
        self.strata.len()
    }

    pub fn psu_count(&self) -> usize {
        self.psu_count
    }

    /// Design degrees of freedom: PSUs minus strata over the whole design
    pub fn degrees_of_freedom(&self) -> f64 {
        self.psu_count as f64 - self.strata.len() as f64
    }

    /// PSUs minus strata, counting only those with positive weight in `domain`
    pub fn domain_degrees_of_freedom(&self, domain: &Domain) -> f64 {
        let mut psus = HashSet::new();
        let mut strata = HashSet::new();
        for i in domain.indices() {
            if self.weights[i] > 0.0 {
                psus.insert(self.psu[i]);
                strata.insert(self.row_stratum[i]);
            }
        }
        psus.len() as f64 - strata.len() as f64
    }

    /// Weighted mean of `y` over `domain` (ratio estimator) with its standard error
    pub fn mean<F>(&self, domain: &Domain, y: F) -> RatioEstimate
    where
        F: Fn(usize) -> f64,
    {
        debug_assert_eq!(domain.len(), self.len());

        let mut count = 0usize;
        let mut weight_total = 0.0;
        let mut weighted_sum = 0.0;
        for i in domain.indices() {
            count += 1;
            weight_total += self.weights[i];
            weighted_sum += self.weights[i] * y(i);
        }

        if weight_total <= 0.0 {
            return RatioEstimate {
                count,
                weight_total,
                mean: None,
                std_error: None,
            };
        }

        let mean = weighted_sum / weight_total;
        let totals = self.psu_totals(domain, |i| self.weights[i] * (y(i) - mean) / weight_total);
        let variance = self.variance_of_totals(&totals);

        RatioEstimate {
            count,
            weight_total,
            mean: Some(mean),
            std_error: Some(variance.max(0.0).sqrt()),
        }
    }

    /// Sum influence values per PSU (rows outside the domain add nothing)
    fn psu_totals<F>(&self, domain: &Domain, influence: F) -> Vec<f64>
    where
        F: Fn(usize) -> f64,
    {
        let mut totals = vec![0.0; self.psu_count];
        for i in domain.indices() {
            totals[self.psu[i]] += influence(i);
        }
        totals
    }

    /// With-replacement variance of an estimated total from its PSU totals
    fn variance_of_totals(&self, totals: &[f64]) -> f64 {
        let grand_mean = totals.iter().sum::<f64>() / self.psu_count as f64;
        let mut variance = 0.0;

        for stratum in &self.strata {
            let n_h = stratum.psus.len();
            if n_h == 1 {
                if self.lonely_psu == LonelyPsu::Adjust {
                    let d = totals[stratum.psus[0]] - grand_mean;
                    variance += d * d;
                }
                continue;
            }

            let mean = stratum.psus.iter().map(|&g| totals[g]).sum::<f64>() / n_h as f64;
            let ss: f64 = stratum
                .psus
                .iter()
                .map(|&g| (totals[g] - mean).powi(2))
                .sum();
            variance += ss * n_h as f64 / (n_h as f64 - 1.0);
        }

        variance
    }
}
