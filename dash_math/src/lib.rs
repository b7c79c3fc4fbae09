//! # Dash Math
//!
//! Numeric kernels shared by the dashlens pipeline stages.
//! This crate provides trailing-window averages, descriptive statistics,
//! a small dense linear solver and goodness-of-fit measures for regressions.

use thiserror::Error;

pub mod accuracy;
pub mod descriptive;
pub mod linalg;
pub mod moving_averages;

/// Errors that can occur in numeric calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;

pub use accuracy::{mean_absolute_error, r_squared, root_mean_squared_error, FitAccuracy};
pub use descriptive::{mean, population_std_dev, sample_std_dev};
pub use moving_averages::{rolling_mean, SimpleMovingAverage};
