//! Forecasting stage
//!
//! A forecast moves through a fixed sequence of states, each consuming the
//! previous one:
//!
//! ```text
//! FeatureSet -> ChronologicalSplit -> TrainedForecast -> EvaluatedForecast -> ForecastReport
//! ```
//!
//! Evaluation only ever sees rows at or after the split boundary, and rows
//! are never reordered.

use crate::config::ForecastConfig;
use crate::error::{PipelineError, Result};
use crate::features::{FeatureSet, ProjectionBasis};
use crate::filter::FilteredView;
use crate::models::{FittedRegressor, Regressor};
use crate::schema::Value;
use crate::table::Table;
use crate::utils::{future_dates, min_split_len, split_boundary};
use chrono::NaiveDate;
use dash_math::FitAccuracy;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// How future values are projected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    /// Apply the model to the most recent `future_days` feature rows
    #[default]
    RecentFeatures,
    /// Train against the target shifted `future_days` rows ahead, then
    /// predict from the last `future_days` rows
    ShiftedTarget,
}

/// Features split chronologically into a training head and a held-out tail
#[derive(Debug, Clone)]
pub struct ChronologicalSplit {
    features: FeatureSet,
    boundary: usize,
}

impl FeatureSet {
    /// Split at `floor(train_fraction * len)`.
    ///
    /// Both sides must keep at least one row.
    pub fn split(self, train_fraction: f64) -> Result<ChronologicalSplit> {
        let boundary = split_boundary(self.len(), train_fraction)?;
        if boundary == 0 || boundary == self.len() {
            return Err(PipelineError::InsufficientHistory {
                required: min_split_len(train_fraction)?,
                available: self.len(),
            });
        }
        Ok(ChronologicalSplit {
            features: self,
            boundary,
        })
    }
}

impl ChronologicalSplit {
    /// Index of the first held-out row
    pub fn boundary(&self) -> usize {
        self.boundary
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn train_rows(&self) -> &[Vec<f64>] {
        &self.features.rows()[..self.boundary]
    }

    pub fn train_target(&self) -> &[f64] {
        &self.features.target()[..self.boundary]
    }

    pub fn test_rows(&self) -> &[Vec<f64>] {
        &self.features.rows()[self.boundary..]
    }

    pub fn test_target(&self) -> &[f64] {
        &self.features.target()[self.boundary..]
    }

    /// Train a regressor on the rows before the boundary
    pub fn fit<R: Regressor>(self, regressor: &R) -> Result<TrainedForecast<R::Fitted>> {
        let model = regressor.fit(self.train_rows(), self.train_target())?;
        Ok(TrainedForecast { split: self, model })
    }

    /// Attach a model the caller trained on `train_rows`
    pub fn with_model<M: FittedRegressor>(self, model: M) -> TrainedForecast<M> {
        TrainedForecast { split: self, model }
    }
}

/// A model trained on the head of a split
#[derive(Debug)]
pub struct TrainedForecast<M: FittedRegressor> {
    split: ChronologicalSplit,
    model: M,
}

impl<M: FittedRegressor> TrainedForecast<M> {
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Score the model on the held-out tail
    pub fn evaluate(self) -> Result<EvaluatedForecast<M>> {
        let predictions = self.model.predict(self.split.test_rows());
        let accuracy = FitAccuracy::evaluate(self.split.test_target(), &predictions)?;
        Ok(EvaluatedForecast {
            split: self.split,
            model: self.model,
            predictions,
            accuracy,
        })
    }
}

/// A trained model with held-out metrics
#[derive(Debug)]
pub struct EvaluatedForecast<M: FittedRegressor> {
    split: ChronologicalSplit,
    model: M,
    predictions: Vec<f64>,
    accuracy: FitAccuracy,
}

impl<M: FittedRegressor> EvaluatedForecast<M> {
    pub fn accuracy(&self) -> &FitAccuracy {
        &self.accuracy
    }

    /// Predictions for the held-out rows, in date order
    pub fn predictions(&self) -> &[f64] {
        &self.predictions
    }

    /// Predict one value per basis row, dated on the days after the last date
    pub fn project(self, basis: ProjectionBasis) -> ForecastReport {
        let features = &self.split.features;

        let mut importances: Vec<(String, f64)> = features
            .feature_names()
            .iter()
            .cloned()
            .zip(self.model.feature_importances().iter().copied())
            .collect();
        importances.sort_by(|a, b| b.1.total_cmp(&a.1));

        let test_dates = &features.dates()[self.split.boundary..];
        let comparison = test_dates
            .iter()
            .zip(self.split.test_target())
            .zip(&self.predictions)
            .map(|((date, actual), predicted)| ComparisonPoint {
                date: *date,
                actual: *actual,
                predicted: *predicted,
            })
            .collect();

        let projection = future_dates(basis.last_date, basis.horizon())
            .into_iter()
            .zip(self.model.predict(&basis.rows))
            .collect();

        ForecastReport {
            model_name: self.model.name().to_string(),
            target: features.target_name().to_string(),
            boundary: self.split.boundary,
            train_len: self.split.boundary,
            test_len: features.len() - self.split.boundary,
            accuracy: self.accuracy,
            importances,
            comparison,
            projection,
        }
    }
}

/// Actual and predicted target for one held-out date
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComparisonPoint {
    pub date: NaiveDate,
    pub actual: f64,
    pub predicted: f64,
}

/// Everything the presentation layer shows for a forecast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub model_name: String,
    pub target: String,
    /// Index of the first held-out row
    pub boundary: usize,
    pub train_len: usize,
    pub test_len: usize,
    pub accuracy: FitAccuracy,
    /// Feature importances, largest first
    pub importances: Vec<(String, f64)>,
    pub comparison: Vec<ComparisonPoint>,
    pub projection: Vec<(NaiveDate, f64)>,
}

impl ForecastReport {
    /// `Feature`, `Importance` table, largest first
    pub fn importance_table(&self) -> Result<Table> {
        let rows = self
            .importances
            .iter()
            .map(|(name, weight)| vec![Value::from(name.as_str()), Value::Number(*weight)])
            .collect();
        Table::from_rows(vec!["Feature".into(), "Importance".into()], rows)
    }

    /// `Date`, `Actual`, `Predicted` over the held-out rows
    pub fn comparison_table(&self) -> Result<Table> {
        let rows = self
            .comparison
            .iter()
            .map(|p| {
                vec![
                    Value::Date(p.date),
                    Value::Number(p.actual),
                    Value::Number(p.predicted),
                ]
            })
            .collect();
        Table::from_rows(
            vec!["Date".into(), "Actual".into(), "Predicted".into()],
            rows,
        )
    }

    /// `Date`, `Forecast` over the projected days
    pub fn projection_table(&self) -> Result<Table> {
        let rows = self
            .projection
            .iter()
            .map(|(date, value)| vec![Value::Date(*date), Value::Number(*value)])
            .collect();
        Table::from_rows(vec!["Date".into(), "Forecast".into()], rows)
    }
}

impl fmt::Display for ForecastReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Forecast of {} ({})", self.target, self.model_name)?;
        writeln!(f, "  Train rows: {}  Test rows: {}", self.train_len, self.test_len)?;
        write!(f, "{}", self.accuracy)?;
        if let Some((name, weight)) = self.importances.first() {
            writeln!(f, "  Top feature: {name} ({weight:.3})")?;
        }
        writeln!(f, "  Projected days: {}", self.projection.len())
    }
}

/// Run the whole forecasting stage over a filtered view
pub fn forecast_view(view: &FilteredView, config: &ForecastConfig) -> Result<ForecastReport> {
    config.validate()?;
    let features = FeatureSet::from_view(view, &config.feature_spec())?;

    // Fail before training when the projection cannot be made
    if config.future_days > features.len() {
        return Err(PipelineError::InsufficientHistory {
            required: config.future_days,
            available: features.len(),
        });
    }

    let (supervised, basis) = match config.projection {
        ProjectionMode::RecentFeatures => {
            let basis = features.recent_basis(config.future_days)?;
            (features, basis)
        }
        ProjectionMode::ShiftedTarget => features.shift_target(config.future_days)?,
    };

    let split = supervised.split(config.train_fraction)?;
    let model = config
        .regressor
        .fit(split.train_rows(), split.train_target(), config.seed)?;
    let evaluated = split.with_model(model).evaluate()?;
    let report = evaluated.project(basis);

    info!(
        target = %report.target,
        train = report.train_len,
        test = report.test_len,
        mae = report.accuracy.mae,
        r2 = report.accuracy.r2,
        "forecast complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSetKind;
    use crate::models::LinearRegressor;
    use chrono::Duration;

    fn linear_series(n: usize) -> FeatureSet {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows = (0..n)
            .map(|i| {
                vec![
                    Value::Date(start + Duration::days(i as i64)),
                    Value::Number(100.0 + 5.0 * i as f64),
                ]
            })
            .collect();
        let table = Table::from_rows(vec!["Date".into(), "Revenue".into()], rows).unwrap();
        FeatureSet::from_daily_table(
            &table,
            "Date",
            "Revenue",
            &[],
            &[7, 30],
            FeatureSetKind::CalendarRolling,
        )
        .unwrap()
    }

    #[test]
    fn test_split_boundary_is_floor_of_fraction() {
        let split = linear_series(17).split(0.8).unwrap();
        assert_eq!(split.boundary(), 13);
        assert_eq!(split.train_rows().len(), 13);
        assert_eq!(split.test_rows().len(), 4);
        assert_eq!(split.test_target()[0], 100.0 + 5.0 * 13.0);
    }

    #[test]
    fn test_split_of_single_row_fails() {
        assert!(matches!(
            linear_series(1).split(0.8),
            Err(PipelineError::InsufficientHistory { .. })
        ));
    }

    #[test]
    fn test_short_split_reports_a_length_that_works() {
        let Err(PipelineError::InsufficientHistory { required, available }) =
            linear_series(3).split(0.3)
        else {
            panic!("three rows cannot be split at 0.3");
        };
        assert_eq!((required, available), (4, 3));
        assert!(linear_series(required).split(0.3).is_ok());
    }

    #[test]
    fn test_linear_series_scores_high() {
        let evaluated = linear_series(100)
            .split(0.8)
            .unwrap()
            .fit(&LinearRegressor::new(1e-6))
            .unwrap()
            .evaluate()
            .unwrap();
        assert!(evaluated.accuracy().r2 >= 0.99, "r2 = {}", evaluated.accuracy().r2);
        assert_eq!(evaluated.predictions().len(), 20);
    }

    #[test]
    fn test_report_dates_follow_the_series() {
        let features = linear_series(40);
        let basis = features.recent_basis(5).unwrap();
        let report = features
            .split(0.8)
            .unwrap()
            .fit(&LinearRegressor::new(1e-6))
            .unwrap()
            .evaluate()
            .unwrap()
            .project(basis);

        assert_eq!(report.boundary, 32);
        assert_eq!(report.comparison.len(), 8);
        assert_eq!(report.comparison[0].date, NaiveDate::from_ymd_opt(2024, 2, 2).unwrap());
        assert_eq!(report.projection.len(), 5);
        assert_eq!(report.projection[0].0, NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
        assert_eq!(report.importances.len(), 7);
        assert!(report.importances[0].1 >= report.importances[6].1);
        assert_eq!(report.projection_table().unwrap().len(), 5);
    }
}
