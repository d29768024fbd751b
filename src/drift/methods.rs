//! Univariate drift methods and their registry

use super::stats::{chi2_contingency, doane_bin_edges, histogram, jensen_shannon_distance, ks_two_sample};
use crate::error::{DriftGuardError, Result};
use crate::thresholds::{calculate_threshold_values, ThresholdBounds, ThresholdConfig, ValueLimits};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub const JENSEN_SHANNON: &str = "jensen_shannon";
pub const KOLMOGOROV_SMIRNOV: &str = "kolmogorov_smirnov";
pub const CHI2: &str = "chi2";

/// Significance level of the hypothesis-test methods
pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Numeric columns with more unique values than this are continuous
pub const CONTINUOUS_UNIQUE_COUNT: usize = 50;
/// Numeric columns with a larger unique-to-total ratio are continuous
pub const CONTINUOUS_UNIQUE_RATIO: f64 = 0.1;

/// How a column is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    Continuous,
    Categorical,
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureType::Continuous => write!(f, "continuous"),
            FeatureType::Categorical => write!(f, "categorical"),
        }
    }
}

/// Non-missing values of one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Continuous(Vec<f64>),
    Categorical(Vec<String>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Continuous(v) => v.len(),
            ColumnValues::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn feature_type(&self) -> FeatureType {
        match self {
            ColumnValues::Continuous(_) => FeatureType::Continuous,
            ColumnValues::Categorical(_) => FeatureType::Categorical,
        }
    }
}

/// Cardinality rule for numeric columns
pub fn is_high_cardinality(n_unique: usize, n_values: usize) -> bool {
    n_values > 0 && (n_unique > CONTINUOUS_UNIQUE_COUNT || n_unique as f64 / n_values as f64 > CONTINUOUS_UNIQUE_RATIO)
}

fn count_unique(values: &[f64]) -> usize {
    let mut bits: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
    bits.sort_unstable();
    bits.dedup();
    bits.len()
}

fn category_counts<'a>(values: impl Iterator<Item = &'a str>) -> BTreeMap<String, f64> {
    let mut counts = BTreeMap::new();
    for v in values {
        *counts.entry(v.to_string()).or_insert(0.0) += 1.0;
    }
    counts
}

/// Outcome of one method on one chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MethodEvaluation {
    pub value: f64,
    pub p_value: Option<f64>,
    pub alert: bool,
}

/// A statistical comparison of a chunk against the reference
pub trait DriftMethod: fmt::Debug + Send + Sync {
    /// Registry key, also used in result columns
    fn key(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    /// Prepare the reference distribution
    fn fit(&mut self, reference: &ColumnValues) -> Result<()>;

    /// Statistic and optional p-value of a chunk
    fn statistic(&self, chunk: &ColumnValues) -> Result<(f64, Option<f64>)>;

    /// Derive alert bounds from the statistic over reference chunks
    fn fit_thresholds(&mut self, reference_values: &[f64]);

    /// Bounds reported next to each value
    fn threshold_bounds(&self) -> ThresholdBounds;

    fn lower_threshold_limit(&self) -> Option<f64>;

    fn upper_threshold_limit(&self) -> Option<f64>;

    /// Whether a computed value should raise an alert
    fn alert(&self, value: f64, _p_value: Option<f64>) -> bool {
        self.threshold_bounds().is_alert(value)
    }

    /// Range the statistic can take
    fn limits(&self) -> ValueLimits {
        ValueLimits::new(self.lower_threshold_limit(), self.upper_threshold_limit())
    }

    fn evaluate(&self, chunk: &ColumnValues) -> Result<MethodEvaluation> {
        let (value, p_value) = self.statistic(chunk)?;
        Ok(MethodEvaluation {
            value,
            p_value,
            alert: self.alert(value, p_value),
        })
    }
}

/// Settings handed to method constructors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodSettings {
    /// Overrides the method's default threshold policy
    #[serde(default)]
    pub threshold: Option<ThresholdConfig>,
}

impl MethodSettings {
    pub fn with_threshold(mut self, threshold: ThresholdConfig) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

#[derive(Debug, Clone)]
enum ReferenceBins {
    Edges(Vec<f64>),
    Values(Vec<f64>),
    Categories(Vec<String>),
}

/// Jensen-Shannon distance between binned distributions
#[derive(Debug, Clone)]
pub struct JensenShannonDistance {
    threshold: ThresholdConfig,
    bounds: ThresholdBounds,
    bins: Option<ReferenceBins>,
    reference_proba: Vec<f64>,
}

impl JensenShannonDistance {
    pub fn new(settings: &MethodSettings) -> Self {
        Self {
            threshold: settings
                .threshold
                .clone()
                .unwrap_or_else(|| ThresholdConfig::constant(None, Some(0.1))),
            bounds: ThresholdBounds::default(),
            bins: None,
            reference_proba: Vec::new(),
        }
    }

    fn chunk_proba(bins: &ReferenceBins, chunk: &ColumnValues) -> Result<Vec<f64>> {
        let n = chunk.len() as f64;
        let counts = match (bins, chunk) {
            (ReferenceBins::Edges(edges), ColumnValues::Continuous(values)) => histogram(values, edges),
            (ReferenceBins::Values(reference), ColumnValues::Continuous(values)) => {
                let mut counts = vec![0.0; reference.len()];
                for v in values {
                    if let Some(i) = reference.iter().position(|r| r.to_bits() == v.to_bits()) {
                        counts[i] += 1.0;
                    }
                }
                counts
            }
            (ReferenceBins::Categories(reference), ColumnValues::Categorical(values)) => {
                let observed = category_counts(values.iter().map(String::as_str));
                reference
                    .iter()
                    .map(|c| observed.get(c).copied().unwrap_or(0.0))
                    .collect()
            }
            _ => {
                return Err(DriftGuardError::Calculator(format!(
                    "{} was fitted on a different feature type than {}",
                    JENSEN_SHANNON,
                    chunk.feature_type()
                )))
            }
        };
        Ok(counts.into_iter().map(|c| c / n).collect())
    }
}

impl DriftMethod for JensenShannonDistance {
    fn key(&self) -> &'static str {
        JENSEN_SHANNON
    }

    fn display_name(&self) -> &'static str {
        "Jensen-Shannon distance"
    }

    fn fit(&mut self, reference: &ColumnValues) -> Result<()> {
        if reference.is_empty() {
            return Err(DriftGuardError::invalid(format!(
                "{} needs non-missing reference values",
                JENSEN_SHANNON
            )));
        }
        let n = reference.len() as f64;
        let (bins, counts) = match reference {
            ColumnValues::Continuous(values) => {
                if is_high_cardinality(count_unique(values), values.len()) {
                    let edges = doane_bin_edges(values);
                    let counts = histogram(values, &edges);
                    (ReferenceBins::Edges(edges), counts)
                } else {
                    let mut unique = values.clone();
                    unique.sort_by(|a, b| a.total_cmp(b));
                    unique.dedup_by(|a, b| a.to_bits() == b.to_bits());
                    let counts = unique
                        .iter()
                        .map(|u| values.iter().filter(|v| v.to_bits() == u.to_bits()).count() as f64)
                        .collect();
                    (ReferenceBins::Values(unique), counts)
                }
            }
            ColumnValues::Categorical(values) => {
                let counts = category_counts(values.iter().map(String::as_str));
                let categories = counts.keys().cloned().collect();
                (ReferenceBins::Categories(categories), counts.into_values().collect())
            }
        };
        self.reference_proba = counts.into_iter().map(|c: f64| c / n).collect();
        self.bins = Some(bins);
        Ok(())
    }

    fn statistic(&self, chunk: &ColumnValues) -> Result<(f64, Option<f64>)> {
        let bins = self
            .bins
            .as_ref()
            .ok_or_else(|| DriftGuardError::not_fitted(JENSEN_SHANNON))?;
        if chunk.is_empty() {
            return Ok((f64::NAN, None));
        }
        let mut chunk_proba = Self::chunk_proba(bins, chunk)?;
        let mut reference_proba = self.reference_proba.clone();

        let leftover = 1.0 - chunk_proba.iter().sum::<f64>();
        if leftover > 1e-12 {
            chunk_proba.push(leftover);
            reference_proba.push(0.0);
        }
        Ok((jensen_shannon_distance(&reference_proba, &chunk_proba), None))
    }

    fn fit_thresholds(&mut self, reference_values: &[f64]) {
        self.bounds = calculate_threshold_values(&self.threshold, reference_values, self.limits());
    }

    fn threshold_bounds(&self) -> ThresholdBounds {
        self.bounds
    }

    fn lower_threshold_limit(&self) -> Option<f64> {
        Some(0.0)
    }

    fn upper_threshold_limit(&self) -> Option<f64> {
        Some(1.0)
    }
}

/// Significance level from a constant lower-bound policy on the p-value
fn significance_level(key: &str, settings: &MethodSettings) -> Result<f64> {
    match &settings.threshold {
        None => Ok(DEFAULT_SIGNIFICANCE_LEVEL),
        Some(ThresholdConfig::Constant { lower: Some(alpha), .. }) if *alpha > 0.0 && *alpha < 1.0 => Ok(*alpha),
        Some(other) => Err(DriftGuardError::invalid(format!(
            "{} alerts on its p-value and takes a constant lower threshold in (0, 1), got {:?}",
            key, other
        ))),
    }
}

/// Two-sample Kolmogorov-Smirnov test
#[derive(Debug, Clone)]
pub struct KolmogorovSmirnovStatistic {
    significance_level: f64,
    reference: Option<Vec<f64>>,
}

impl KolmogorovSmirnovStatistic {
    pub fn new(settings: &MethodSettings) -> Result<Self> {
        Ok(Self {
            significance_level: significance_level(KOLMOGOROV_SMIRNOV, settings)?,
            reference: None,
        })
    }
}

impl DriftMethod for KolmogorovSmirnovStatistic {
    fn key(&self) -> &'static str {
        KOLMOGOROV_SMIRNOV
    }

    fn display_name(&self) -> &'static str {
        "Kolmogorov-Smirnov statistic"
    }

    fn fit(&mut self, reference: &ColumnValues) -> Result<()> {
        match reference {
            ColumnValues::Continuous(values) if !values.is_empty() => {
                self.reference = Some(values.clone());
                Ok(())
            }
            ColumnValues::Continuous(_) => Err(DriftGuardError::invalid(format!(
                "{} needs non-missing reference values",
                KOLMOGOROV_SMIRNOV
            ))),
            ColumnValues::Categorical(_) => Err(DriftGuardError::invalid(format!(
                "{} only supports continuous columns",
                KOLMOGOROV_SMIRNOV
            ))),
        }
    }

    fn statistic(&self, chunk: &ColumnValues) -> Result<(f64, Option<f64>)> {
        let reference = self
            .reference
            .as_ref()
            .ok_or_else(|| DriftGuardError::not_fitted(KOLMOGOROV_SMIRNOV))?;
        match chunk {
            ColumnValues::Continuous(values) if values.is_empty() => Ok((f64::NAN, None)),
            ColumnValues::Continuous(values) => {
                let (d, p) = ks_two_sample(reference, values);
                Ok((d, Some(p)))
            }
            ColumnValues::Categorical(_) => Err(DriftGuardError::Calculator(format!(
                "{} received categorical chunk values",
                KOLMOGOROV_SMIRNOV
            ))),
        }
    }

    fn fit_thresholds(&mut self, _reference_values: &[f64]) {}

    fn threshold_bounds(&self) -> ThresholdBounds {
        ThresholdBounds::new(Some(self.significance_level), None)
    }

    fn lower_threshold_limit(&self) -> Option<f64> {
        Some(0.0)
    }

    fn upper_threshold_limit(&self) -> Option<f64> {
        Some(1.0)
    }

    fn alert(&self, _value: f64, p_value: Option<f64>) -> bool {
        p_value.map_or(false, |p| p < self.significance_level)
    }
}

/// Chi-squared test on category counts
#[derive(Debug, Clone)]
pub struct Chi2Statistic {
    significance_level: f64,
    reference_counts: Option<BTreeMap<String, f64>>,
}

impl Chi2Statistic {
    pub fn new(settings: &MethodSettings) -> Result<Self> {
        Ok(Self {
            significance_level: significance_level(CHI2, settings)?,
            reference_counts: None,
        })
    }
}

impl DriftMethod for Chi2Statistic {
    fn key(&self) -> &'static str {
        CHI2
    }

    fn display_name(&self) -> &'static str {
        "Chi2"
    }

    fn fit(&mut self, reference: &ColumnValues) -> Result<()> {
        match reference {
            ColumnValues::Categorical(values) if !values.is_empty() => {
                self.reference_counts = Some(category_counts(values.iter().map(String::as_str)));
                Ok(())
            }
            ColumnValues::Categorical(_) => Err(DriftGuardError::invalid(format!(
                "{} needs non-missing reference values",
                CHI2
            ))),
            ColumnValues::Continuous(_) => Err(DriftGuardError::invalid(format!(
                "{} only supports categorical columns",
                CHI2
            ))),
        }
    }

    fn statistic(&self, chunk: &ColumnValues) -> Result<(f64, Option<f64>)> {
        let reference = self
            .reference_counts
            .as_ref()
            .ok_or_else(|| DriftGuardError::not_fitted(CHI2))?;
        let values = match chunk {
            ColumnValues::Categorical(values) if values.is_empty() => return Ok((f64::NAN, None)),
            ColumnValues::Categorical(values) => values,
            ColumnValues::Continuous(_) => {
                return Err(DriftGuardError::Calculator(format!(
                    "{} received continuous chunk values",
                    CHI2
                )))
            }
        };

        let observed = category_counts(values.iter().map(String::as_str));
        let mut categories: Vec<&String> = reference.keys().chain(observed.keys()).collect();
        categories.sort();
        categories.dedup();
        let reference_counts: Vec<f64> = categories.iter().map(|c| reference.get(*c).copied().unwrap_or(0.0)).collect();
        let chunk_counts: Vec<f64> = categories.iter().map(|c| observed.get(*c).copied().unwrap_or(0.0)).collect();

        let (statistic, p_value) = chi2_contingency(&reference_counts, &chunk_counts);
        Ok((statistic, Some(p_value)))
    }

    fn fit_thresholds(&mut self, _reference_values: &[f64]) {}

    fn threshold_bounds(&self) -> ThresholdBounds {
        ThresholdBounds::new(Some(self.significance_level), None)
    }

    fn lower_threshold_limit(&self) -> Option<f64> {
        Some(0.0)
    }

    fn upper_threshold_limit(&self) -> Option<f64> {
        None
    }

    fn alert(&self, _value: f64, p_value: Option<f64>) -> bool {
        p_value.map_or(false, |p| p < self.significance_level)
    }
}

/// Builds a method from its settings
pub type MethodConstructor = fn(&MethodSettings) -> Result<Box<dyn DriftMethod>>;

/// Constructor map keyed by method key and feature type
#[derive(Clone)]
pub struct MethodRegistry {
    constructors: HashMap<(String, FeatureType), MethodConstructor>,
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.constructors.keys().collect();
        keys.sort();
        f.debug_struct("MethodRegistry").field("methods", &keys).finish()
    }
}

impl MethodRegistry {
    /// Registry without any methods
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register(&mut self, key: impl Into<String>, feature_type: FeatureType, constructor: MethodConstructor) {
        self.constructors.insert((key.into(), feature_type), constructor);
    }

    pub fn supports(&self, key: &str, feature_type: FeatureType) -> bool {
        self.constructors.contains_key(&(key.to_string(), feature_type))
    }

    /// Instantiate an unfitted method
    pub fn create(&self, key: &str, feature_type: FeatureType, settings: &MethodSettings) -> Result<Box<dyn DriftMethod>> {
        let known = self.constructors.keys().any(|(k, _)| k == key);
        match self.constructors.get(&(key.to_string(), feature_type)) {
            Some(constructor) => constructor(settings),
            None if known => Err(DriftGuardError::invalid(format!(
                "method '{}' does not support {} columns",
                key, feature_type
            ))),
            None => Err(DriftGuardError::invalid(format!("unknown drift method '{}'", key))),
        }
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for feature_type in [FeatureType::Continuous, FeatureType::Categorical] {
            registry.register(JENSEN_SHANNON, feature_type, |s| Ok(Box::new(JensenShannonDistance::new(s))));
        }
        registry.register(KOLMOGOROV_SMIRNOV, FeatureType::Continuous, |s| {
            Ok(Box::new(KolmogorovSmirnovStatistic::new(s)?))
        });
        registry.register(CHI2, FeatureType::Categorical, |s| Ok(Box::new(Chi2Statistic::new(s)?)));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categorical(values: &[&str]) -> ColumnValues {
        ColumnValues::Categorical(values.iter().map(|v| v.to_string()).collect())
    }

    fn continuous(n: usize, offset: f64) -> ColumnValues {
        ColumnValues::Continuous((0..n).map(|i| offset + (i as f64 * 0.731).sin() * 3.0 + i as f64 * 0.01).collect())
    }

    #[test]
    fn test_registry_lookup() {
        let registry = MethodRegistry::default();
        let settings = MethodSettings::default();
        assert!(registry.create(JENSEN_SHANNON, FeatureType::Continuous, &settings).is_ok());
        assert!(registry.create(CHI2, FeatureType::Categorical, &settings).is_ok());
        assert!(matches!(
            registry.create(CHI2, FeatureType::Continuous, &settings),
            Err(DriftGuardError::InvalidArguments(_))
        ));
        assert!(matches!(
            registry.create("wasserstein", FeatureType::Continuous, &settings),
            Err(DriftGuardError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_js_identical_is_zero() {
        let mut js = JensenShannonDistance::new(&MethodSettings::default());
        let reference = continuous(2000, 0.0);
        js.fit(&reference).unwrap();
        let eval = js.evaluate(&reference).unwrap();
        assert!(eval.value.abs() < 1e-9);
        assert!(eval.p_value.is_none());
    }

    #[test]
    fn test_js_unseen_categories_stay_bounded() {
        let mut js = JensenShannonDistance::new(&MethodSettings::default());
        js.fit(&categorical(&["a", "a", "b", "c"])).unwrap();
        js.fit_thresholds(&[0.0, 0.01]);
        let eval = js.evaluate(&categorical(&["x", "y", "z"])).unwrap();
        assert!((eval.value - 1.0).abs() < 1e-9);
        assert!(eval.alert);
        let partial = js.evaluate(&categorical(&["a", "x"])).unwrap();
        assert!(partial.value > 0.0 && partial.value < 1.0);
    }

    #[test]
    fn test_js_out_of_range_values_go_to_leftover() {
        let mut js = JensenShannonDistance::new(&MethodSettings::default());
        js.fit(&continuous(1000, 0.0)).unwrap();
        let shifted = js.evaluate(&continuous(1000, 100.0)).unwrap();
        assert!((shifted.value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_js_default_threshold() {
        let mut js = JensenShannonDistance::new(&MethodSettings::default());
        js.fit_thresholds(&[0.01, 0.02]);
        assert_eq!(js.threshold_bounds(), ThresholdBounds::new(None, Some(0.1)));

        // distance methods alert on the value alone
        assert!(js.alert(0.2, Some(0.9)));
        assert!(!js.alert(0.05, Some(0.0)));
    }

    #[test]
    fn test_ks_alerts_on_p_value() {
        let mut ks = KolmogorovSmirnovStatistic::new(&MethodSettings::default()).unwrap();
        ks.fit(&continuous(500, 0.0)).unwrap();
        let same = ks.evaluate(&continuous(500, 0.0)).unwrap();
        assert!(!same.alert);
        let shifted = ks.evaluate(&continuous(500, 5.0)).unwrap();
        assert!(shifted.alert);
        assert!(shifted.p_value.unwrap() < 0.05);
        assert_eq!(ks.threshold_bounds().lower, Some(0.05));
    }

    #[test]
    fn test_p_value_methods_reject_std_policy() {
        let settings = MethodSettings::default().with_threshold(ThresholdConfig::default());
        assert!(KolmogorovSmirnovStatistic::new(&settings).is_err());
        let custom = MethodSettings::default().with_threshold(ThresholdConfig::constant(Some(0.01), None));
        let chi2 = Chi2Statistic::new(&custom).unwrap();
        assert_eq!(chi2.threshold_bounds().lower, Some(0.01));
    }

    #[test]
    fn test_chi2_collapsed_category() {
        let mut chi2 = Chi2Statistic::new(&MethodSettings::default()).unwrap();
        let mut reference = vec!["a"; 50];
        reference.extend(vec!["b"; 30]);
        reference.extend(vec!["c"; 20]);
        chi2.fit(&categorical(&reference)).unwrap();
        let mut chunk = vec!["a"; 60];
        chunk.extend(vec!["b"; 40]);
        let eval = chi2.evaluate(&categorical(&chunk)).unwrap();
        assert!(eval.value.is_finite());
        assert!(eval.p_value.unwrap().is_finite());
    }

    #[test]
    fn test_unfitted_method_errors() {
        let chi2 = Chi2Statistic::new(&MethodSettings::default()).unwrap();
        assert!(matches!(chi2.evaluate(&categorical(&["a"])), Err(DriftGuardError::NotFitted(_))));
    }

    #[test]
    fn test_cardinality_rule() {
        assert!(is_high_cardinality(51, 10_000));
        assert!(is_high_cardinality(20, 100));
        assert!(!is_high_cardinality(5, 10_000));
        assert!(!is_high_cardinality(0, 0));
    }
}
