//! Pandemic dashboard summaries over the OWID dataset
//!
//! Metric columns are optional in [`Schema::covid`](crate::schema::Schema::covid);
//! summaries that need a missing metric leave it out instead of failing.

use crate::aggregate::{aggregate, AggregationKeySpec, Reduction};
use crate::data::RecordSet;
use crate::error::Result;
use crate::filter::{distinct_labels, FilterSpec, FilteredView};
use crate::schema::{FieldKind, Value};
use crate::table::Table;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Option meaning "no continent restriction"
pub const ALL_CONTINENTS: &str = "All";

/// Days covered by the default date range
pub const DEFAULT_WINDOW_DAYS: i64 = 180;

const SUMMARY_METRICS: [&str; 4] = ["total_cases", "total_deaths", "new_cases", "new_deaths"];

/// `All` followed by the sorted distinct continents
pub fn continent_options(records: &Arc<RecordSet>) -> Result<Vec<String>> {
    let mut options = vec![ALL_CONTINENTS.to_string()];
    if records.schema().contains("continent") {
        options.extend(distinct_labels(&FilteredView::all(records), "continent")?);
    }
    Ok(options)
}

/// Sorted locations, optionally restricted to one continent
pub fn locations_for(records: &Arc<RecordSet>, continent: &str) -> Result<Vec<String>> {
    let all = FilteredView::all(records);
    if continent == ALL_CONTINENTS || !records.schema().contains("continent") {
        return distinct_labels(&all, "location");
    }
    distinct_labels(&all.where_equals("continent", &Value::from(continent))?, "location")
}

/// The first five locations, or all of them if fewer
pub fn default_selection(locations: &[String]) -> Vec<String> {
    locations.iter().take(5).cloned().collect()
}

/// The last 180 days up to the latest date in the data
pub fn default_date_range(records: &Arc<RecordSet>) -> Result<Option<(NaiveDate, NaiveDate)>> {
    Ok(records
        .date_bounds("date")?
        .map(|(_, max)| (max - Duration::days(DEFAULT_WINDOW_DAYS), max)))
}

/// Location multi-select (capped at ten) and an optional date range
pub fn covid_filter(locations: &[String], range: Option<(NaiveDate, NaiveDate)>) -> FilterSpec {
    let mut spec = FilterSpec::new().categorical_in("location", locations.iter().take(10).cloned());
    if let Some((start, end)) = range {
        spec = spec.date_range("date", start, end);
    }
    spec
}

/// Headline numbers at the latest date of the whole dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalMetrics {
    pub latest_date: Option<NaiveDate>,
    /// `None` when the column is missing
    pub total_cases: Option<f64>,
    pub total_deaths: Option<f64>,
    pub total_vaccinations: Option<f64>,
    /// Distinct locations across all dates
    pub locations: usize,
}

impl fmt::Display for GlobalMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.0}"));
        writeln!(f, "Key Global Metrics:")?;
        if let Some(date) = self.latest_date {
            writeln!(f, "  As of:              {date}")?;
        }
        writeln!(f, "  Total Cases:        {}", show(self.total_cases))?;
        writeln!(f, "  Total Deaths:       {}", show(self.total_deaths))?;
        writeln!(f, "  Total Vaccinations: {}", show(self.total_vaccinations))?;
        writeln!(f, "  Countries Affected: {}", self.locations)
    }
}

fn sum_of(view: &FilteredView, field: &str) -> Result<Option<f64>> {
    if !view.schema().contains(field) {
        return Ok(None);
    }
    let idx = view.schema().require(field, FieldKind::Numeric)?;
    Ok(Some(view.iter().filter_map(|r| r.get(idx).as_f64()).sum()))
}

pub fn global_metrics(records: &Arc<RecordSet>) -> Result<GlobalMetrics> {
    let all = FilteredView::all(records);
    let latest_date = all.latest_date("date")?;
    let latest = match latest_date {
        Some(d) => all.where_equals("date", &Value::Date(d))?,
        None => all.clone(),
    };

    Ok(GlobalMetrics {
        latest_date,
        total_cases: sum_of(&latest, "total_cases")?,
        total_deaths: sum_of(&latest, "total_deaths")?,
        total_vaccinations: sum_of(&latest, "total_vaccinations")?,
        locations: distinct_labels(&all, "location")?.len(),
    })
}

/// `date`, `location`, metric over time
pub fn metric_trend(view: &FilteredView, metric: &str) -> Result<Table> {
    let spec = AggregationKeySpec::by(["date", "location"]).reduce(metric, &[Reduction::Sum]);
    aggregate(view, &spec)?
        .into_table()
        .rename_columns(&["date", "location", metric])
}

/// `location`, metric at the view's latest date, largest first
pub fn latest_values(view: &FilteredView, metric: &str) -> Result<Table> {
    view.schema().require(metric, FieldKind::Numeric)?;
    let latest = match view.latest_date("date")? {
        Some(d) => view.where_equals("date", &Value::Date(d))?,
        None => view.clone(),
    };
    let spec = AggregationKeySpec::by(["location"]).reduce(metric, &[Reduction::Sum]);
    aggregate(&latest, &spec)?
        .into_table()
        .rename_columns(&["location", metric])?
        .sort_by(metric, true)
}

/// Mean, max, min and std of the available case and death columns per
/// location, rounded to 2 decimals. `None` when none of them is present.
pub fn statistical_summary(view: &FilteredView) -> Result<Option<Table>> {
    let available: Vec<&str> = SUMMARY_METRICS
        .iter()
        .copied()
        .filter(|m| view.schema().contains(m))
        .collect();
    if available.is_empty() {
        warn!("no case or death columns, statistical summary skipped");
        return Ok(None);
    }

    let ops = [Reduction::Mean, Reduction::Max, Reduction::Min, Reduction::Std];
    let spec = available
        .iter()
        .fold(AggregationKeySpec::by(["location"]), |spec, m| spec.reduce(m, &ops));
    Ok(Some(aggregate(view, &spec)?.into_table().round(2)))
}

/// Every table of the pandemic dashboard for one metric
#[derive(Debug, Clone, PartialEq)]
pub struct CovidReport {
    pub global: GlobalMetrics,
    /// `None` when the metric column is missing from the dataset
    pub trend: Option<Table>,
    pub latest: Option<Table>,
    pub summary: Option<Table>,
}

impl CovidReport {
    /// `view` is the user's selection; global metrics use its whole snapshot.
    ///
    /// A metric the dataset lacks leaves its trend and latest values out.
    pub fn build(view: &FilteredView, metric: &str) -> Result<Self> {
        let (trend, latest) = if view.schema().contains(metric) {
            (Some(metric_trend(view, metric)?), Some(latest_values(view, metric)?))
        } else {
            warn!(metric, "metric column missing, trend and latest values skipped");
            (None, None)
        };
        Ok(Self {
            global: global_metrics(view.source())?,
            trend,
            latest,
            summary: statistical_summary(view)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;
    use crate::filter::Predicate;
    use crate::schema::{Field, Schema};
    use pretty_assertions::assert_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, day).unwrap()
    }

    fn records() -> Arc<RecordSet> {
        let schema = Schema::new(vec![
            Field::required("date", FieldKind::Temporal),
            Field::required("location", FieldKind::Categorical),
            Field::optional("continent", FieldKind::Categorical),
            Field::optional("total_cases", FieldKind::Numeric),
            Field::optional("new_cases", FieldKind::Numeric),
        ])
        .unwrap();
        let rows = [
            (1, "France", Some("Europe"), 100.0, 10.0),
            (2, "France", Some("Europe"), 120.0, 20.0),
            (1, "Kenya", Some("Africa"), 50.0, 5.0),
            (2, "Kenya", Some("Africa"), 55.0, 5.0),
            (2, "World", None, 175.0, 25.0),
        ];
        let records = rows
            .iter()
            .map(|(day, loc, cont, total, new)| {
                Record::new(vec![
                    Value::Date(d(*day)),
                    Value::from(*loc),
                    Value::from(*cont),
                    Value::Number(*total),
                    Value::Number(*new),
                ])
            })
            .collect();
        Arc::new(RecordSet::new(schema, records).unwrap())
    }

    #[test]
    fn test_continent_options_exclude_nulls() {
        assert_eq!(continent_options(&records()).unwrap(), vec!["All", "Africa", "Europe"]);
    }

    #[test]
    fn test_locations_for_continent() {
        let r = records();
        assert_eq!(locations_for(&r, "Europe").unwrap(), vec!["France"]);
        assert_eq!(locations_for(&r, ALL_CONTINENTS).unwrap().len(), 3);
    }

    #[test]
    fn test_default_selection_and_cap() {
        let many: Vec<String> = (0..12).map(|i| format!("L{i}")).collect();
        assert_eq!(default_selection(&many).len(), 5);
        assert_eq!(default_selection(&many[..3]).len(), 3);

        let binding = covid_filter(&many, None);
        let Predicate::CategoricalIn { allowed, .. } = &binding.predicates()[0] else {
            panic!("expected a location predicate");
        };
        assert_eq!(allowed.len(), 10);
    }

    #[test]
    fn test_default_date_range() {
        let (start, end) = default_date_range(&records()).unwrap().unwrap();
        assert_eq!(end, d(2));
        assert_eq!(end - start, Duration::days(180));
    }

    #[test]
    fn test_global_metrics_use_latest_date_and_skip_missing_columns() {
        let g = global_metrics(&records()).unwrap();
        assert_eq!(g.latest_date, Some(d(2)));
        assert_eq!(g.total_cases, Some(350.0));
        assert_eq!(g.total_deaths, None);
        assert_eq!(g.locations, 3);
    }

    #[test]
    fn test_latest_values_sorted_descending() {
        let r = records();
        let view = covid_filter(&["France".to_string(), "Kenya".to_string()], None)
            .apply(&r)
            .unwrap();
        let table = latest_values(&view, "total_cases").unwrap();
        assert_eq!(table.value(0, "location").unwrap(), &Value::from("France"));
        assert_eq!(table.value(0, "total_cases").unwrap(), &Value::Number(120.0));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_statistical_summary_only_available_columns() {
        let view = FilteredView::all(&records());
        let table = statistical_summary(&view).unwrap().unwrap();
        assert_eq!(
            table.columns(),
            &[
                "location",
                "total_cases_mean",
                "total_cases_max",
                "total_cases_min",
                "total_cases_std",
                "new_cases_mean",
                "new_cases_max",
                "new_cases_min",
                "new_cases_std",
            ]
        );
        // World has a single row
        assert_eq!(table.value(2, "total_cases_std").unwrap(), &Value::Number(0.0));
        assert_eq!(table.value(0, "new_cases_std").unwrap(), &Value::Number(7.07));
    }

    #[test]
    fn test_report_skips_missing_metric() {
        let view = FilteredView::all(&records());
        let report = CovidReport::build(&view, "total_deaths").unwrap();
        assert_eq!(report.trend, None);
        assert_eq!(report.latest, None);
        assert_eq!(report.global.total_cases, Some(350.0));
        assert!(report.summary.is_some());

        let report = CovidReport::build(&view, "new_cases").unwrap();
        assert_eq!(report.latest.unwrap().len(), 3);
    }
}
