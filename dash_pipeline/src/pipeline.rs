//! Pipeline entry point: load-cache-check, filter, aggregate, then the
//! optional forecast and segmentation stages
//!
//! Only loader failures abort a run. An empty selection or a stage that
//! lacks data degrades that stage to an explicit outcome and a warning.

use crate::aggregate::{aggregate, AggregatedTable, AggregationKeySpec, Reduction};
use crate::config::{ForecastConfig, PipelineConfig};
use crate::data::{DataSource, RecordSet, SnapshotCache};
use crate::error::{PipelineError, Result};
use crate::filter::{FilterSpec, FilteredView};
use crate::forecast::{forecast_view, ForecastReport};
use crate::segmentation::{segment, EntityFeatureSpec, KMeans, SegmentationReport};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one optional stage
#[derive(Debug)]
pub enum StageOutcome<T> {
    Ready(T),
    /// The filtered view had no rows
    Empty,
    /// The stage could not run on this data
    Unavailable(PipelineError),
    /// The request did not ask for the stage
    NotRequested,
}

impl<T> StageOutcome<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            StageOutcome::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, StageOutcome::Ready(_))
    }
}

/// What the presentation layer asks for in one run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub filter: FilterSpec,
    pub aggregations: Vec<AggregationKeySpec>,
    pub forecast: Option<ForecastConfig>,
    pub segmentation: Option<(EntityFeatureSpec, KMeans)>,
}

impl RunRequest {
    pub fn new(filter: FilterSpec) -> Self {
        Self {
            filter,
            aggregations: Vec::new(),
            forecast: None,
            segmentation: None,
        }
    }

    pub fn aggregate(mut self, spec: AggregationKeySpec) -> Self {
        self.aggregations.push(spec);
        self
    }

    pub fn forecast(mut self, config: ForecastConfig) -> Self {
        self.forecast = Some(config);
        self
    }

    pub fn segment(mut self, spec: EntityFeatureSpec, kmeans: KMeans) -> Self {
        self.segmentation = Some((spec, kmeans));
        self
    }

    /// The sales dashboard run: daily and per-category revenue, the revenue
    /// forecast and customer segmentation
    pub fn sales(filter: FilterSpec, config: &PipelineConfig) -> Self {
        Self::new(filter)
            .aggregate(AggregationKeySpec::by(["Date"]).reduce("Revenue", &[Reduction::Sum]))
            .aggregate(
                AggregationKeySpec::by(["Category"])
                    .reduce("Revenue", &[Reduction::Sum, Reduction::Mean, Reduction::Std]),
            )
            .forecast(config.forecast.clone())
            .segment(EntityFeatureSpec::customer(), config.segmentation.kmeans())
    }
}

/// Everything one run produced
#[derive(Debug)]
pub struct RunOutput {
    pub snapshot: Arc<RecordSet>,
    pub view: FilteredView,
    /// One outcome per requested aggregation, in request order
    pub aggregates: Vec<StageOutcome<AggregatedTable>>,
    pub forecast: StageOutcome<ForecastReport>,
    pub segmentation: StageOutcome<SegmentationReport>,
    pub warnings: Vec<String>,
}

/// Runs requests against a cached snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct Pipeline;

impl Pipeline {
    pub fn run(
        cache: &mut SnapshotCache,
        source: &dyn DataSource,
        request: &RunRequest,
    ) -> Result<RunOutput> {
        let snapshot = cache.get_or_reload(source)?;
        let mut warnings = Vec::new();

        let (filter, skipped) = request.filter.split_missing(snapshot.schema());
        for predicate in &skipped {
            warn!(source = source.name(), field = predicate.field(), "filter field not in dataset, predicate skipped");
            warnings.push(format!(
                "filter on '{}' skipped: field not in dataset",
                predicate.field()
            ));
        }
        let view = filter.apply(&snapshot)?;

        let empty = match view.require_non_empty() {
            Ok(_) => false,
            Err(e) => {
                warn!(source = source.name(), "{e}");
                warnings.push(e.to_string());
                true
            }
        };

        let mut aggregates = Vec::with_capacity(request.aggregations.len());
        for spec in &request.aggregations {
            aggregates.push(stage("aggregation", aggregate(&view, spec), &mut warnings)?);
        }

        let forecast = match &request.forecast {
            None => StageOutcome::NotRequested,
            Some(_) if empty => StageOutcome::Empty,
            Some(config) => stage("forecast", forecast_view(&view, config), &mut warnings)?,
        };

        let segmentation = match &request.segmentation {
            None => StageOutcome::NotRequested,
            Some(_) if empty => StageOutcome::Empty,
            Some((spec, kmeans)) => stage("segmentation", segment(&view, spec, kmeans), &mut warnings)?,
        };

        info!(
            source = source.name(),
            rows = view.len(),
            aggregates = aggregates.len(),
            warnings = warnings.len(),
            "pipeline run complete"
        );
        Ok(RunOutput {
            snapshot,
            view,
            aggregates,
            forecast,
            segmentation,
            warnings,
        })
    }
}

/// Turn a stage error into `Unavailable` unless it must abort the run
fn stage<T>(name: &str, result: Result<T>, warnings: &mut Vec<String>) -> Result<StageOutcome<T>> {
    match result {
        Ok(value) => Ok(StageOutcome::Ready(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(stage = name, "{e}");
            warnings.push(format!("{name} unavailable: {e}"));
            Ok(StageOutcome::Unavailable(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticSalesSource;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn source() -> SyntheticSalesSource {
        SyntheticSalesSource::new(42)
            .with_date_range(
                NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 3, 31).unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn test_sales_run_produces_every_stage() {
        let mut config = PipelineConfig::default();
        config.forecast.future_days = 14;
        let mut cache = SnapshotCache::new(Duration::from_secs(60));
        let request = RunRequest::sales(FilterSpec::new(), &config);

        let out = Pipeline::run(&mut cache, &source(), &request).unwrap();
        assert_eq!(out.view.len(), out.snapshot.len());
        assert_eq!(out.aggregates.len(), 2);
        assert!(out.aggregates.iter().all(StageOutcome::is_ready));
        assert!(out.forecast.is_ready());
        assert_eq!(out.forecast.ready().unwrap().projection.len(), 14);
        assert_eq!(out.segmentation.ready().unwrap().k(), 3);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_empty_selection_degrades_stages() {
        let config = PipelineConfig::default();
        let mut cache = SnapshotCache::new(Duration::from_secs(60));
        let filter = FilterSpec::new().categorical_in("Region", Vec::<String>::new());
        let request = RunRequest::sales(filter, &config);

        let out = Pipeline::run(&mut cache, &source(), &request).unwrap();
        assert!(out.view.is_empty());
        assert!(out
            .aggregates
            .iter()
            .all(|a| a.ready().is_some_and(AggregatedTable::is_empty)));
        assert!(matches!(out.forecast, StageOutcome::Empty));
        assert!(matches!(out.segmentation, StageOutcome::Empty));
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_short_history_disables_forecast_only() {
        let mut config = PipelineConfig::default();
        config.forecast.future_days = 1000;
        let mut cache = SnapshotCache::new(Duration::from_secs(60));
        let request = RunRequest::sales(FilterSpec::new(), &config);

        let out = Pipeline::run(&mut cache, &source(), &request).unwrap();
        assert!(matches!(
            out.forecast,
            StageOutcome::Unavailable(PipelineError::InsufficientHistory { required: 1000, .. })
        ));
        assert!(out.segmentation.is_ready());
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_missing_fields_degrade_one_output() {
        let mut cache = SnapshotCache::new(Duration::from_secs(60));
        let request = RunRequest::new(FilterSpec::new().categorical_in("Channel", ["Web"]))
            .aggregate(AggregationKeySpec::by(["Region"]).reduce("Discount", &[Reduction::Sum]))
            .aggregate(AggregationKeySpec::by(["Region"]).reduce("Revenue", &[Reduction::Sum]));

        let out = Pipeline::run(&mut cache, &source(), &request).unwrap();
        assert_eq!(out.view.len(), out.snapshot.len());
        assert!(matches!(
            out.aggregates[0],
            StageOutcome::Unavailable(PipelineError::UnknownField(_))
        ));
        assert_eq!(out.aggregates[1].ready().unwrap().len(), 4);
        assert_eq!(out.warnings.len(), 2);
    }

    #[test]
    fn test_runs_share_the_cached_snapshot() {
        let mut cache = SnapshotCache::new(Duration::from_secs(60));
        let request = RunRequest::new(FilterSpec::new());
        let src = source();

        let first = Pipeline::run(&mut cache, &src, &request).unwrap();
        let second = Pipeline::run(&mut cache, &src, &request).unwrap();
        assert!(Arc::ptr_eq(&first.snapshot, &second.snapshot));
        assert!(matches!(first.forecast, StageOutcome::NotRequested));
    }
}
