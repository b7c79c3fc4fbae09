//! Feature engineering for the forecasting stage
//!
//! A [`FeatureSet`] is one row per date: the numeric target, the calendar
//! features of the date, trailing means of the target and any exogenous
//! per-date aggregates.

use crate::aggregate::{aggregate, AggregationKeySpec, Reduction};
use crate::error::{PipelineError, Result};
use crate::filter::FilteredView;
use crate::schema::{FieldKind, Value};
use crate::table::Table;
use chrono::{Datelike, NaiveDate};
use dash_math::rolling_mean;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Calendar features derived from a date, in feature-column order
pub const CALENDAR_FEATURES: [&str; 5] = ["DayOfYear", "Month", "DayOfWeek", "Quarter", "WeekOfYear"];

/// Which features to engineer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSetKind {
    /// Calendar features, exogenous aggregates and trailing means
    #[default]
    CalendarRolling,
    /// The target value as its only feature
    TargetOnly,
}

/// An exogenous per-date aggregate carried as a feature, named after its field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExogenousFeature {
    pub field: String,
    pub reduction: Reduction,
}

impl ExogenousFeature {
    pub fn new(field: &str, reduction: Reduction) -> Self {
        Self {
            field: field.to_string(),
            reduction,
        }
    }
}

/// How to derive a [`FeatureSet`] from a filtered view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSpec {
    pub date_field: String,
    pub target: String,
    pub exogenous: Vec<ExogenousFeature>,
    pub rolling_windows: Vec<usize>,
    pub kind: FeatureSetKind,
}

fn calendar_features(date: NaiveDate) -> [f64; 5] {
    [
        date.ordinal() as f64,
        date.month() as f64,
        date.weekday().num_days_from_monday() as f64,
        ((date.month() - 1) / 3 + 1) as f64,
        date.iso_week().week() as f64,
    ]
}

/// Feature matrix and target vector indexed by date, in date order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    dates: Vec<NaiveDate>,
    feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
    target_name: String,
    target: Vec<f64>,
}

impl FeatureSet {
    /// Aggregate a view to one row per date and engineer features from it.
    ///
    /// The target is summed per date.
    pub fn from_view(view: &FilteredView, spec: &FeatureSpec) -> Result<Self> {
        let mut key_spec =
            AggregationKeySpec::by([spec.date_field.as_str()]).reduce(&spec.target, &[Reduction::Sum]);
        for exo in &spec.exogenous {
            key_spec = key_spec.reduce(&exo.field, &[exo.reduction]);
        }
        let daily = aggregate(view, &key_spec)?.into_table();

        let mut names = vec![spec.date_field.clone(), spec.target.clone()];
        names.extend(spec.exogenous.iter().map(|e| e.field.clone()));
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let daily = daily.rename_columns(&names)?;

        let exogenous: Vec<&str> = spec.exogenous.iter().map(|e| e.field.as_str()).collect();
        Self::from_daily_table(
            &daily,
            &spec.date_field,
            &spec.target,
            &exogenous,
            &spec.rolling_windows,
            spec.kind,
        )
    }

    /// Engineer features from a table that already has one row per date.
    ///
    /// Rows without a date are dropped, the rest are sorted by date. Null
    /// target or exogenous cells count as 0.
    pub fn from_daily_table(
        table: &Table,
        date_column: &str,
        target_column: &str,
        exogenous: &[&str],
        windows: &[usize],
        kind: FeatureSetKind,
    ) -> Result<Self> {
        let table = table.sort_by(date_column, false)?;
        let date_idx = table.column_index(date_column)?;

        let mut dates = Vec::with_capacity(table.len());
        for row in table.rows() {
            match &row[date_idx] {
                Value::Date(d) => dates.push(*d),
                Value::Null => break,
                _ => {
                    return Err(PipelineError::FieldType {
                        field: date_column.to_string(),
                        expected: FieldKind::Temporal.to_string(),
                    })
                }
            }
        }

        let numeric = |name: &str| -> Result<Vec<f64>> {
            Ok(table
                .numeric_column(name)?
                .into_iter()
                .take(dates.len())
                .map(|v| v.unwrap_or(0.0))
                .collect())
        };
        let target = numeric(target_column)?;

        let mut feature_names: Vec<String> = Vec::new();
        let mut columns: Vec<Vec<f64>> = Vec::new();

        match kind {
            FeatureSetKind::TargetOnly => {
                feature_names.push(target_column.to_string());
                columns.push(target.clone());
            }
            FeatureSetKind::CalendarRolling => {
                let calendar: Vec<[f64; 5]> = dates.iter().map(|d| calendar_features(*d)).collect();
                for (i, name) in CALENDAR_FEATURES.iter().enumerate() {
                    feature_names.push(name.to_string());
                    columns.push(calendar.iter().map(|c| c[i]).collect());
                }
                for name in exogenous {
                    feature_names.push(name.to_string());
                    columns.push(numeric(name)?);
                }
                for &window in windows {
                    feature_names.push(format!("{target_column}_MA{window}"));
                    columns.push(rolling_mean(&target, window)?);
                }
            }
        }

        let rows = (0..dates.len())
            .map(|i| columns.iter().map(|c| c[i]).collect())
            .collect();

        debug!(rows = dates.len(), features = feature_names.len(), "built feature set");
        Ok(Self {
            dates,
            feature_names,
            rows,
            target_name: target_column.to_string(),
            target,
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Feature rows, aligned with `dates`
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn target(&self) -> &[f64] {
        &self.target
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Feature rows of the most recent `future_days` dates, used to project forward
    pub fn recent_basis(&self, future_days: usize) -> Result<ProjectionBasis> {
        if future_days == 0 {
            return Err(PipelineError::InvalidParameter(
                "future_days must be at least 1".to_string(),
            ));
        }
        let last_date = match self.last_date() {
            Some(d) if future_days <= self.len() => d,
            _ => {
                return Err(PipelineError::InsufficientHistory {
                    required: future_days,
                    available: self.len(),
                })
            }
        };
        Ok(ProjectionBasis {
            rows: self.rows[self.len() - future_days..].to_vec(),
            last_date,
        })
    }

    /// Pair every row with the target `future_days` rows ahead.
    ///
    /// Returns the supervised rows (all but the last `future_days`) and the
    /// trailing rows whose future is still unknown.
    pub fn shift_target(self, future_days: usize) -> Result<(FeatureSet, ProjectionBasis)> {
        let basis = self.recent_basis(future_days)?;
        let keep = self.len() - future_days;

        let mut supervised = self;
        supervised.target = supervised.target[future_days..].to_vec();
        supervised.target_name = format!("{}_ahead{future_days}", supervised.target_name);
        supervised.dates.truncate(keep);
        supervised.rows.truncate(keep);

        Ok((supervised, basis))
    }
}

/// Feature rows to project from, and the last observed date
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionBasis {
    pub rows: Vec<Vec<f64>>,
    pub last_date: NaiveDate,
}

impl ProjectionBasis {
    pub fn horizon(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn daily(values: &[f64]) -> Table {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                vec![
                    Value::Date(start + chrono::Duration::days(i as i64)),
                    Value::Number(*v),
                    Value::Number(1.0),
                ]
            })
            .rev()
            .collect();
        Table::from_rows(
            vec!["Date".to_string(), "Revenue".to_string(), "Orders".to_string()],
            rows,
        )
        .unwrap()
    }

    #[test]
    fn test_calendar_features() {
        // Monday 2024-01-01
        let f = calendar_features(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(f, [1.0, 1.0, 0.0, 1.0, 1.0]);
        let f = calendar_features(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(f, [365.0, 12.0, 6.0, 4.0, 52.0]);
    }

    #[test]
    fn test_rich_feature_columns_sorted_by_date() {
        let fs = FeatureSet::from_daily_table(
            &daily(&[1.0, 2.0, 3.0]),
            "Date",
            "Revenue",
            &["Orders"],
            &[2],
            FeatureSetKind::CalendarRolling,
        )
        .unwrap();
        assert_eq!(
            fs.feature_names(),
            &["DayOfYear", "Month", "DayOfWeek", "Quarter", "WeekOfYear", "Orders", "Revenue_MA2"]
        );
        assert_eq!(fs.target(), &[1.0, 2.0, 3.0]);
        assert_eq!(fs.rows()[2][6], 2.5);
        assert_eq!(fs.rows()[0][6], 1.0);
    }

    #[test]
    fn test_target_only_uses_the_value_itself() {
        let fs = FeatureSet::from_daily_table(
            &daily(&[5.0, 6.0]),
            "Date",
            "Revenue",
            &[],
            &[7],
            FeatureSetKind::TargetOnly,
        )
        .unwrap();
        assert_eq!(fs.feature_names(), &["Revenue"]);
        assert_eq!(fs.rows(), &[vec![5.0], vec![6.0]]);
    }

    #[test]
    fn test_shift_target() {
        let fs = FeatureSet::from_daily_table(
            &daily(&[1.0, 2.0, 3.0, 4.0]),
            "Date",
            "Revenue",
            &[],
            &[],
            FeatureSetKind::TargetOnly,
        )
        .unwrap();
        let (supervised, basis) = fs.shift_target(1).unwrap();
        assert_eq!(supervised.target(), &[2.0, 3.0, 4.0]);
        assert_eq!(supervised.len(), 3);
        assert_eq!(basis.rows, vec![vec![4.0]]);
        assert_eq!(basis.last_date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
    }

    #[test]
    fn test_projection_longer_than_history_fails() {
        let fs = FeatureSet::from_daily_table(
            &daily(&[1.0, 2.0]),
            "Date",
            "Revenue",
            &[],
            &[],
            FeatureSetKind::TargetOnly,
        )
        .unwrap();
        assert!(matches!(
            fs.recent_basis(3),
            Err(PipelineError::InsufficientHistory { required: 3, available: 2 })
        ));
    }
}
