//! Pipeline configuration loaded from JSON
//!
//! Every field has a default, so `{}` is a valid configuration.

use crate::aggregate::Reduction;
use crate::error::{PipelineError, Result};
use crate::features::{ExogenousFeature, FeatureSetKind, FeatureSpec};
use crate::forecast::ProjectionMode;
use crate::models::RegressorKind;
use crate::segmentation::KMeans;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How long a loaded snapshot stays fresh
    pub cache_ttl_secs: u64,
    pub forecast: ForecastConfig,
    pub segmentation: SegmentationConfig,
    pub export: ExportConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            forecast: ForecastConfig::default(),
            segmentation: SegmentationConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_secs == 0 {
            return Err(PipelineError::InvalidParameter(
                "cache_ttl_secs must be positive".to_string(),
            ));
        }
        self.forecast.validate()?;
        self.segmentation.validate()?;
        self.export.validate()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Forecasting stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub date_field: String,
    pub target: String,
    pub exogenous: Vec<ExogenousFeature>,
    pub rolling_windows: Vec<usize>,
    pub train_fraction: f64,
    pub future_days: usize,
    pub projection: ProjectionMode,
    pub feature_set: FeatureSetKind,
    pub regressor: RegressorKind,
    pub seed: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            date_field: "Date".to_string(),
            target: "Revenue".to_string(),
            exogenous: vec![
                ExogenousFeature::new("OrderID", Reduction::Count),
                ExogenousFeature::new("Quantity", Reduction::Sum),
            ],
            rolling_windows: vec![7, 30],
            train_fraction: 0.8,
            future_days: 30,
            projection: ProjectionMode::default(),
            feature_set: FeatureSetKind::default(),
            regressor: RegressorKind::default(),
            seed: 42,
        }
    }
}

impl ForecastConfig {
    /// Settings for a single numeric series without exogenous features
    pub fn for_target(date_field: &str, target: &str) -> Self {
        Self {
            date_field: date_field.to_string(),
            target: target.to_string(),
            exogenous: Vec::new(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(PipelineError::InvalidParameter(format!(
                "train_fraction must be in (0, 1), got {}",
                self.train_fraction
            )));
        }
        if self.future_days == 0 {
            return Err(PipelineError::InvalidParameter(
                "future_days must be at least 1".to_string(),
            ));
        }
        if self.rolling_windows.contains(&0) {
            return Err(PipelineError::InvalidParameter(
                "Rolling windows must be at least 1".to_string(),
            ));
        }
        // Features are named after their field, so names must not collide
        let mut seen = BTreeSet::new();
        for feature in &self.exogenous {
            if feature.field == self.target || !seen.insert(feature.field.as_str()) {
                return Err(PipelineError::InvalidParameter(format!(
                    "Exogenous field '{}' repeats the target or another exogenous field",
                    feature.field
                )));
            }
        }
        self.regressor.validate()
    }

    pub fn feature_spec(&self) -> FeatureSpec {
        FeatureSpec {
            date_field: self.date_field.clone(),
            target: self.target.clone(),
            exogenous: self.exogenous.clone(),
            rolling_windows: self.rolling_windows.clone(),
            kind: self.feature_set,
        }
    }
}

/// Segmentation stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub k: usize,
    pub seed: u64,
    pub n_init: usize,
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            k: 3,
            seed: 42,
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<()> {
        self.kmeans().validate()
    }

    pub fn kmeans(&self) -> KMeans {
        KMeans::new(self.k)
            .with_seed(self.seed)
            .with_n_init(self.n_init)
            .with_max_iter(self.max_iter)
            .with_tolerance(self.tolerance)
    }
}

/// Delimited export settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub delimiter: char,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<()> {
        self.delimiter_byte().map(|_| ())
    }

    /// The delimiter as the single byte the CSV writer needs
    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(|b| b.is_ascii() && !matches!(b, b'"' | b'\n' | b'\r'))
            .ok_or_else(|| {
                PipelineError::InvalidParameter(format!(
                    "Delimiter must be a single ASCII character, got {:?}",
                    self.delimiter
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = PipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.forecast.rolling_windows, vec![7, 30]);
        assert_eq!(config.segmentation.n_init, 10);
    }

    #[test]
    fn test_partial_override() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "forecast": {
                    "future_days": 7,
                    "projection": "shifted_target",
                    "feature_set": "target_only",
                    "regressor": {"type": "random_forest", "n_trees": 10}
                },
                "segmentation": {"k": 4},
                "export": {"delimiter": ";"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.forecast.future_days, 7);
        assert_eq!(config.forecast.train_fraction, 0.8);
        assert_eq!(config.forecast.projection, ProjectionMode::ShiftedTarget);
        assert_eq!(config.forecast.feature_set, FeatureSetKind::TargetOnly);
        assert_eq!(config.segmentation.k, 4);
        assert_eq!(config.segmentation.seed, 42);
        assert_eq!(config.export.delimiter_byte().unwrap(), b';');
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        for raw in [
            r#"{"forecast": {"train_fraction": 1.0}}"#,
            r#"{"forecast": {"future_days": 0}}"#,
            r#"{"segmentation": {"k": 0}}"#,
            r#"{"export": {"delimiter": "é"}}"#,
            r#"{"cache_ttl_secs": 0}"#,
        ] {
            assert!(
                matches!(
                    PipelineConfig::from_json_str(raw),
                    Err(PipelineError::InvalidParameter(_))
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_colliding_exogenous_fields_are_rejected() {
        let mut config = ForecastConfig::default();
        config.exogenous.push(ExogenousFeature::new("Revenue", Reduction::Mean));
        assert!(matches!(config.validate(), Err(PipelineError::InvalidParameter(_))));

        let mut config = ForecastConfig::default();
        config.exogenous.push(ExogenousFeature::new("Quantity", Reduction::Mean));
        assert!(matches!(config.validate(), Err(PipelineError::InvalidParameter(_))));

        assert!(ForecastConfig::default().validate().is_ok());
    }

    #[test]
    fn test_malformed_json_is_a_json_error() {
        assert!(matches!(
            PipelineConfig::from_json_str("{"),
            Err(PipelineError::JsonError(_))
        ));
    }
}
