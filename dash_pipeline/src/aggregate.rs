//! Aggregation engine: grouped reductions and trailing rolling means

use crate::error::{PipelineError, Result};
use crate::filter::FilteredView;
use crate::schema::{FieldKind, GroupKey, Value};
use crate::table::Table;
use dash_math::rolling_mean;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Reduction applied to the values of one field within a group.
///
/// Nulls are skipped by every reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Sum,
    Mean,
    Min,
    Max,
    /// Sample standard deviation; a single value yields 0.0
    Std,
    /// Number of non-null values
    Count,
    /// Number of distinct non-null values
    NUnique,
    /// First non-null value in view order
    First,
}

impl Reduction {
    pub fn label(&self) -> &'static str {
        match self {
            Reduction::Sum => "sum",
            Reduction::Mean => "mean",
            Reduction::Min => "min",
            Reduction::Max => "max",
            Reduction::Std => "std",
            Reduction::Count => "count",
            Reduction::NUnique => "nunique",
            Reduction::First => "first",
        }
    }

    /// Whether the reduction only makes sense for numeric fields
    pub fn needs_numeric(&self) -> bool {
        !matches!(self, Reduction::Count | Reduction::NUnique | Reduction::First)
    }

    /// Reduce a group's values
    pub fn apply(&self, values: &[&Value]) -> Value {
        let present = values.iter().copied().filter(|v| !v.is_null());

        match self {
            Reduction::Count => Value::Number(present.count() as f64),
            Reduction::NUnique => {
                let mut distinct: Vec<&Value> = present.collect();
                distinct.sort_by(|a, b| a.total_cmp(b));
                distinct.dedup();
                Value::Number(distinct.len() as f64)
            }
            Reduction::First => present.cloned().next().unwrap_or(Value::Null),
            Reduction::Sum => Value::Number(present.filter_map(Value::as_f64).sum()),
            _ => {
                let nums: Vec<f64> = present.filter_map(Value::as_f64).collect();
                if nums.is_empty() {
                    return Value::Null;
                }
                let reduced = match self {
                    Reduction::Mean => Statistics::mean(nums.iter()),
                    Reduction::Min => nums.iter().copied().fold(f64::INFINITY, f64::min),
                    Reduction::Max => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    Reduction::Std if nums.len() == 1 => 0.0,
                    _ => Statistics::std_dev(nums.iter()),
                };
                Value::Number(reduced)
            }
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Grouping keys plus the reductions to compute per value field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationKeySpec {
    keys: Vec<String>,
    reductions: Vec<(String, Vec<Reduction>)>,
}

impl AggregationKeySpec {
    /// Group by the given fields
    pub fn by<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            reductions: Vec::new(),
        }
    }

    /// Add reductions for a value field; output columns are `<field>_<op>`
    pub fn reduce(mut self, field: &str, ops: &[Reduction]) -> Self {
        self.reductions.push((field.to_string(), ops.to_vec()));
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn reductions(&self) -> &[(String, Vec<Reduction>)] {
        &self.reductions
    }

    /// Output column headings in order
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns = self.keys.clone();
        for (field, ops) in &self.reductions {
            for op in ops {
                columns.push(format!("{field}_{op}"));
            }
        }
        columns
    }
}

/// A grouped table together with the number of input rows behind each row
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTable {
    table: Table,
    group_sizes: Vec<usize>,
}

impl AggregatedTable {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    /// Input rows per output row, aligned with the table rows
    pub fn group_sizes(&self) -> &[usize] {
        &self.group_sizes
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Group a view and reduce each group.
///
/// Only key combinations present in the view produce rows; rows come out
/// sorted by key with null keys last. A null key value forms its own group,
/// so the groups always partition the view.
pub fn aggregate(view: &FilteredView, spec: &AggregationKeySpec) -> Result<AggregatedTable> {
    let schema = view.schema();
    if spec.keys.is_empty() {
        return Err(PipelineError::InvalidParameter(
            "Aggregation needs at least one grouping key".to_string(),
        ));
    }

    let key_idx = spec
        .keys
        .iter()
        .map(|k| schema.index_of(k))
        .collect::<Result<Vec<_>>>()?;

    let mut value_idx = Vec::with_capacity(spec.reductions.len());
    for (field, ops) in &spec.reductions {
        let idx = if ops.iter().any(Reduction::needs_numeric) {
            schema.require(field, FieldKind::Numeric)?
        } else {
            schema.index_of(field)?
        };
        value_idx.push(idx);
    }

    let mut groups: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
    let records: Vec<_> = view.iter().collect();
    for (pos, record) in records.iter().enumerate() {
        let key = GroupKey(key_idx.iter().map(|&i| record.get(i).clone()).collect());
        groups.entry(key).or_default().push(pos);
    }

    let mut table = Table::new(spec.output_columns());
    let mut group_sizes = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let mut row = key.0;
        for ((_, ops), &idx) in spec.reductions.iter().zip(&value_idx) {
            let values: Vec<&Value> = members.iter().map(|&m| records[m].get(idx)).collect();
            row.extend(ops.iter().map(|op| op.apply(&values)));
        }
        group_sizes.push(members.len());
        table.push_row(row)?;
    }

    debug!(keys = ?spec.keys, groups = table.len(), rows = view.len(), "aggregated view");
    Ok(AggregatedTable { table, group_sizes })
}

/// One row per date of `time_field` with `value_field` reduced, followed by
/// a trailing mean column `<value>_<op>_MA<w>` per window.
///
/// Null reductions count as 0 inside the rolling windows.
pub fn rolling_mean_table(
    view: &FilteredView,
    time_field: &str,
    value_field: &str,
    reduction: Reduction,
    windows: &[usize],
) -> Result<Table> {
    view.schema().require(time_field, FieldKind::Temporal)?;
    let spec = AggregationKeySpec::by([time_field]).reduce(value_field, &[reduction]);
    let grouped = aggregate(view, &spec)?.into_table();

    // Rows without a date cannot be placed on the time axis
    let grouped = grouped.filter_rows(|row| !row[0].is_null());

    let value_column = format!("{value_field}_{reduction}");
    let series: Vec<f64> = grouped
        .numeric_column(&value_column)?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();

    let mut columns = grouped.columns().to_vec();
    let mut rolled = Vec::with_capacity(windows.len());
    for &window in windows {
        columns.push(format!("{value_column}_MA{window}"));
        rolled.push(rolling_mean(&series, window)?);
    }

    let rows = grouped
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut row = row.clone();
            row.extend(rolled.iter().map(|r| Value::Number(r[i])));
            row
        })
        .collect();

    Table::from_rows(columns, rows)
}
