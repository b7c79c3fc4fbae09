//! Ridge-stabilised linear least squares

use super::{check_training_data, normalize, FittedRegressor, Regressor};
use crate::error::Result;
use dash_math::linalg::solve;

/// Linear regression on standardized features with a small ridge penalty
///
/// Zero-variance feature columns get a coefficient of exactly 0.
#[derive(Debug, Clone)]
pub struct LinearRegressor {
    name: String,
    ridge: f64,
}

/// Trained linear model
#[derive(Debug, Clone)]
pub struct FittedLinear {
    name: String,
    intercept: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
    /// Coefficients on the standardized features
    coefficients: Vec<f64>,
    importances: Vec<f64>,
}

impl LinearRegressor {
    pub fn new(ridge: f64) -> Self {
        Self {
            name: format!("Linear Regression (ridge={ridge})"),
            ridge,
        }
    }
}

impl Regressor for LinearRegressor {
    type Fitted = FittedLinear;

    fn fit(&self, rows: &[Vec<f64>], target: &[f64]) -> Result<Self::Fitted> {
        let width = check_training_data(rows, target)?;
        let n = rows.len() as f64;

        let means: Vec<f64> = (0..width)
            .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n)
            .collect();
        let scales: Vec<f64> = (0..width)
            .map(|j| {
                let var = rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n;
                var.sqrt()
            })
            .collect();
        let constant: Vec<bool> = scales.iter().map(|s| *s < 1e-12).collect();

        let standardized: Vec<Vec<f64>> = rows
            .iter()
            .map(|r| {
                (0..width)
                    .map(|j| if constant[j] { 0.0 } else { (r[j] - means[j]) / scales[j] })
                    .collect()
            })
            .collect();

        let y_mean = target.iter().sum::<f64>() / n;

        // Normal equations (ZᵀZ + λI) w = Zᵀ(y - ȳ)
        let mut gram = vec![vec![0.0; width]; width];
        let mut rhs = vec![0.0; width];
        for (z, y) in standardized.iter().zip(target) {
            let centered = y - y_mean;
            for a in 0..width {
                rhs[a] += z[a] * centered;
                for b in 0..width {
                    gram[a][b] += z[a] * z[b];
                }
            }
        }
        for (j, row) in gram.iter_mut().enumerate() {
            row[j] += if constant[j] { 1.0 } else { self.ridge };
        }

        let coefficients = if width == 0 { Vec::new() } else { solve(gram, rhs)? };
        let importances = normalize(coefficients.iter().map(|c| c.abs()).collect());

        Ok(FittedLinear {
            name: self.name.clone(),
            intercept: y_mean,
            means,
            scales: scales
                .into_iter()
                .zip(&constant)
                .map(|(s, c)| if *c { 1.0 } else { s })
                .collect(),
            coefficients,
            importances,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl FittedLinear {
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

impl FittedRegressor for FittedLinear {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(row)
            .zip(self.means.iter().zip(&self.scales))
            .fold(self.intercept, |acc, ((w, x), (m, s))| acc + w * (x - m) / s)
    }

    fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    fn name(&self) -> &str {
        &self.name
    }
}
