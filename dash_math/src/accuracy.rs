//! Goodness-of-fit measures for regression predictions

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

fn check_lengths(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return Err(MathError::InvalidInput(
            "Actual and predicted values must have the same non-zero length".to_string(),
        ));
    }
    Ok(())
}

/// Mean absolute error
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual, predicted)?;
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    Ok(sum / actual.len() as f64)
}

/// Root mean squared error
pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual, predicted)?;
    let mse: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64;
    Ok(mse.sqrt())
}

/// Coefficient of determination.
///
/// When the actual values are constant the total sum of squares is zero; the
/// score is then 1.0 for a perfect prediction and 0.0 otherwise.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual, predicted)?;
    let y_mean = actual.iter().sum::<f64>() / actual.len() as f64;

    let ss_total: f64 = actual.iter().map(|a| (a - y_mean).powi(2)).sum();
    let ss_residual: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();

    if ss_total.abs() < 1e-12 {
        return Ok(if ss_residual.abs() < 1e-12 { 1.0 } else { 0.0 });
    }

    Ok(1.0 - ss_residual / ss_total)
}

/// Accuracy of a set of predictions against held-out actuals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitAccuracy {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Coefficient of determination
    pub r2: f64,
}

impl FitAccuracy {
    /// Compute every measure in one pass over the inputs
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        Ok(Self {
            mae: mean_absolute_error(actual, predicted)?,
            rmse: root_mean_squared_error(actual, predicted)?,
            r2: r_squared(actual, predicted)?,
        })
    }
}

impl std::fmt::Display for FitAccuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Fit Accuracy:")?;
        writeln!(f, "  MAE:  {:.4}", self.mae)?;
        writeln!(f, "  RMSE: {:.4}", self.rmse)?;
        writeln!(f, "  R²:   {:.4}", self.r2)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_regression_metrics() {
        let actual = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        let predicted = vec![12.0, 18.0, 33.0, 37.0, 52.0];

        assert_relative_eq!(mean_absolute_error(&actual, &predicted).unwrap(), 2.4);
        assert_relative_eq!(
            root_mean_squared_error(&actual, &predicted).unwrap(),
            6.0_f64.sqrt(),
            epsilon = 1e-12
        );
        // ss_res = 30, ss_tot = 1000
        assert_relative_eq!(r_squared(&actual, &predicted).unwrap(), 0.97, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_actuals() {
        assert_eq!(r_squared(&[5.0, 5.0], &[5.0, 5.0]).unwrap(), 1.0);
        assert_eq!(r_squared(&[5.0, 5.0], &[4.0, 6.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(mean_absolute_error(&[1.0], &[1.0, 2.0]).is_err());
        assert!(FitAccuracy::evaluate(&[], &[]).is_err());
    }
}
