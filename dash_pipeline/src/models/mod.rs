//! Regression models used by the forecasting stage

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub mod forest;
pub mod linear;

pub use forest::ForestRegressor;
pub use linear::LinearRegressor;

/// A regression model after training
pub trait FittedRegressor: Debug {
    /// Predict the target for one feature row
    fn predict_row(&self, row: &[f64]) -> f64;

    /// Predict the target for many feature rows
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }

    /// Relative importance per feature column, summing to 1 (or all 0)
    fn feature_importances(&self) -> &[f64];

    /// Name of the model
    fn name(&self) -> &str;
}

/// Regression model that can be trained on a feature matrix
pub trait Regressor: Debug + Clone {
    /// The type of trained model produced
    type Fitted: FittedRegressor + 'static;

    /// Train on rows of features and their targets
    fn fit(&self, rows: &[Vec<f64>], target: &[f64]) -> Result<Self::Fitted>;

    /// Get the name of the model
    fn name(&self) -> &str;
}

impl FittedRegressor for Box<dyn FittedRegressor> {
    fn predict_row(&self, row: &[f64]) -> f64 {
        (**self).predict_row(row)
    }

    fn feature_importances(&self) -> &[f64] {
        (**self).feature_importances()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Configurable choice of regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegressorKind {
    Linear {
        #[serde(default = "default_ridge")]
        ridge: f64,
    },
    RandomForest {
        #[serde(default = "default_n_trees")]
        n_trees: usize,
        #[serde(default)]
        max_depth: Option<usize>,
        #[serde(default = "default_min_samples_split")]
        min_samples_split: usize,
    },
}

fn default_ridge() -> f64 {
    1e-6
}

fn default_n_trees() -> usize {
    100
}

fn default_min_samples_split() -> usize {
    2
}

impl Default for RegressorKind {
    fn default() -> Self {
        RegressorKind::Linear {
            ridge: default_ridge(),
        }
    }
}

impl RegressorKind {
    /// Check the hyperparameters
    pub fn validate(&self) -> Result<()> {
        match self {
            RegressorKind::Linear { ridge } if !(ridge.is_finite() && *ridge >= 0.0) => Err(
                PipelineError::InvalidParameter(format!("Ridge penalty must be >= 0, got {ridge}")),
            ),
            RegressorKind::RandomForest { n_trees: 0, .. } => Err(PipelineError::InvalidParameter(
                "A forest needs at least one tree".to_string(),
            )),
            RegressorKind::RandomForest {
                min_samples_split, ..
            } if *min_samples_split < 2 => Err(PipelineError::InvalidParameter(
                "min_samples_split must be at least 2".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Train the selected model; `seed` drives any randomness
    pub fn fit(&self, rows: &[Vec<f64>], target: &[f64], seed: u64) -> Result<Box<dyn FittedRegressor>> {
        self.validate()?;
        Ok(match self {
            RegressorKind::Linear { ridge } => Box::new(LinearRegressor::new(*ridge).fit(rows, target)?),
            RegressorKind::RandomForest {
                n_trees,
                max_depth,
                min_samples_split,
            } => Box::new(
                ForestRegressor::new(*n_trees, seed)
                    .with_max_depth(*max_depth)
                    .with_min_samples_split(*min_samples_split)
                    .fit(rows, target)?,
            ),
        })
    }
}

/// Check a training matrix is non-empty and rectangular, returning its width
pub(crate) fn check_training_data(rows: &[Vec<f64>], target: &[f64]) -> Result<usize> {
    if rows.is_empty() {
        return Err(PipelineError::InsufficientHistory {
            required: 1,
            available: 0,
        });
    }
    if rows.len() != target.len() {
        return Err(PipelineError::InvalidParameter(format!(
            "{} feature rows but {} targets",
            rows.len(),
            target.len()
        )));
    }
    let width = rows[0].len();
    if rows.iter().any(|r| r.len() != width) {
        return Err(PipelineError::InvalidParameter(
            "Feature rows differ in width".to_string(),
        ));
    }
    Ok(width)
}

/// Scale non-negative weights so they sum to 1; all-zero weights stay zero
pub(crate) fn normalize(weights: Vec<f64>) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.into_iter().map(|w| w / total).collect()
    } else {
        weights
    }
}
