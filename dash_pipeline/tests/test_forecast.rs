use chrono::{Duration, NaiveDate};
use dash_pipeline::config::ForecastConfig;
use dash_pipeline::data::{Record, RecordSet};
use dash_pipeline::features::{FeatureSet, FeatureSetKind};
use dash_pipeline::filter::FilteredView;
use dash_pipeline::forecast::{forecast_view, ProjectionMode};
use dash_pipeline::models::{LinearRegressor, RegressorKind};
use dash_pipeline::schema::{Field, FieldKind, Schema, Value};
use dash_pipeline::PipelineError;
use rstest::rstest;
use std::sync::Arc;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// Two transactions per day whose daily revenue follows `f(day)`
fn series_view(days: usize, f: impl Fn(usize) -> f64) -> FilteredView {
    let schema = Schema::new(vec![
        Field::required("Date", FieldKind::Temporal),
        Field::required("Revenue", FieldKind::Numeric),
    ])
    .unwrap();
    let records = (0..days)
        .flat_map(|d| {
            let date = Value::Date(start() + Duration::days(d as i64));
            let total = f(d);
            [
                Record::new(vec![date.clone(), Value::Number(total * 0.25)]),
                Record::new(vec![date, Value::Number(total * 0.75)]),
            ]
        })
        .collect();
    FilteredView::all(&Arc::new(RecordSet::new(schema, records).unwrap()))
}

fn config(future_days: usize) -> ForecastConfig {
    ForecastConfig {
        future_days,
        ..ForecastConfig::for_target("Date", "Revenue")
    }
}

#[rstest]
#[case(10, 8)]
#[case(17, 13)]
#[case(50, 40)]
#[case(99, 79)]
fn test_boundary_is_floor_of_80_percent(#[case] n: usize, #[case] boundary: usize) {
    let view = series_view(n, |d| d as f64);
    let features = FeatureSet::from_view(&view, &config(1).feature_spec()).unwrap();
    let split = features.clone().split(0.8).unwrap();

    assert_eq!(split.boundary(), boundary);
    assert_eq!(split.train_rows(), &features.rows()[..boundary]);
    assert_eq!(split.test_target(), &features.target()[boundary..]);
}

#[test]
fn test_linear_series_reaches_high_r2() {
    let view = series_view(100, |d| 200.0 + 3.5 * d as f64);
    let report = forecast_view(&view, &config(10)).unwrap();

    assert!(report.accuracy.r2 >= 0.99, "r2 = {}", report.accuracy.r2);
    assert_eq!(report.boundary, 80);
    assert_eq!(report.comparison.len(), 20);
    assert_eq!(report.projection.len(), 10);
    assert_eq!(report.projection[0].0, start() + Duration::days(100));
}

#[test]
fn test_evaluation_only_uses_held_out_rows() {
    let view = series_view(40, |d| (d * d) as f64);
    let report = forecast_view(&view, &config(5)).unwrap();
    let first_test_date = start() + Duration::days(report.boundary as i64);
    assert!(report.comparison.iter().all(|p| p.date >= first_test_date));
    assert_eq!(report.comparison[0].actual, (32 * 32) as f64);
}

#[test]
fn test_projection_longer_than_series_fails() {
    let view = series_view(20, |d| d as f64);
    assert!(matches!(
        forecast_view(&view, &config(21)),
        Err(PipelineError::InsufficientHistory {
            required: 21,
            available: 20
        })
    ));
}

#[test]
fn test_shifted_target_projection() {
    let view = series_view(60, |d| 10.0 + d as f64);
    let cfg = ForecastConfig {
        projection: ProjectionMode::ShiftedTarget,
        feature_set: FeatureSetKind::TargetOnly,
        ..config(7)
    };
    let report = forecast_view(&view, &cfg).unwrap();

    // 53 supervised rows
    assert_eq!(report.boundary, 42);
    assert_eq!(report.projection.len(), 7);
    assert_eq!(report.projection[0].0, start() + Duration::days(60));
    // value + 7 is learned exactly from the value itself
    assert!((report.projection[0].1 - (10.0 + 53.0 + 7.0)).abs() < 1e-3);
    assert_eq!(report.importances, vec![("Revenue".to_string(), 1.0)]);
}

#[test]
fn test_shifted_target_needs_more_than_future_days() {
    let view = series_view(7, |d| d as f64);
    let cfg = ForecastConfig {
        projection: ProjectionMode::ShiftedTarget,
        ..config(7)
    };
    assert!(matches!(
        forecast_view(&view, &cfg),
        Err(PipelineError::InsufficientHistory { .. })
    ));
}

#[test]
fn test_forest_regressor_reports_importances() {
    let view = series_view(90, |d| if d % 7 >= 5 { 300.0 } else { 100.0 });
    let cfg = ForecastConfig {
        regressor: RegressorKind::RandomForest {
            n_trees: 20,
            max_depth: Some(6),
            min_samples_split: 2,
        },
        ..config(7)
    };
    let report = forecast_view(&view, &cfg).unwrap();

    let total: f64 = report.importances.iter().map(|(_, w)| w).sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert_eq!(report.importances[0].0, "DayOfWeek");
    assert!(report.accuracy.mae < 1e-9);
}

#[test]
fn test_typestate_chain_matches_forecast_view() {
    let view = series_view(30, |d| 5.0 * d as f64);
    let cfg = config(3);
    let features = FeatureSet::from_view(&view, &cfg.feature_spec()).unwrap();
    let basis = features.recent_basis(3).unwrap();
    let chained = features
        .split(0.8)
        .unwrap()
        .fit(&LinearRegressor::new(1e-6))
        .unwrap()
        .evaluate()
        .unwrap()
        .project(basis);
    let direct = forecast_view(&view, &cfg).unwrap();

    assert_eq!(chained.boundary, direct.boundary);
    assert_eq!(chained.comparison.len(), direct.comparison.len());
    assert!((chained.accuracy.mae - direct.accuracy.mae).abs() < 1e-9);
}
