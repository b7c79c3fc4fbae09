//! Filter engine: conjunctions of independent predicates over a snapshot

use crate::data::{Record, RecordSet};
use crate::error::{PipelineError, Result};
use crate::schema::{FieldKind, Schema, Value};
use crate::table::Table;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// A single condition on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// Dates between `start` and `end`, both inclusive
    DateRange {
        field: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    /// Values contained in `allowed`. An empty set matches nothing, and a
    /// null value never matches.
    CategoricalIn {
        field: String,
        allowed: BTreeSet<String>,
    },
}

impl Predicate {
    pub fn field(&self) -> &str {
        match self {
            Predicate::DateRange { field, .. } | Predicate::CategoricalIn { field, .. } => field,
        }
    }

    fn bind(&self, schema: &Schema) -> Result<BoundPredicate<'_>> {
        match self {
            Predicate::DateRange { field, start, end } => {
                let idx = schema.require(field, FieldKind::Temporal)?;
                Ok(BoundPredicate::DateRange {
                    idx,
                    start: *start,
                    end: *end,
                })
            }
            Predicate::CategoricalIn { field, allowed } => {
                let idx = schema.require(field, FieldKind::Categorical)?;
                Ok(BoundPredicate::CategoricalIn { idx, allowed })
            }
        }
    }
}

/// A predicate resolved against a schema
enum BoundPredicate<'a> {
    DateRange {
        idx: usize,
        start: NaiveDate,
        end: NaiveDate,
    },
    CategoricalIn {
        idx: usize,
        allowed: &'a BTreeSet<String>,
    },
}

impl BoundPredicate<'_> {
    fn matches(&self, record: &Record) -> bool {
        match self {
            BoundPredicate::DateRange { idx, start, end } => record
                .get(*idx)
                .as_date()
                .map_or(false, |d| *start <= d && d <= *end),
            BoundPredicate::CategoricalIn { idx, allowed } => record
                .get(*idx)
                .as_str()
                .map_or(false, |v| allowed.contains(v)),
        }
    }
}

/// Ordered set of predicates combined with logical AND
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    predicates: Vec<Predicate>,
}

impl FilterSpec {
    /// A spec with no predicates, which keeps every row
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Add an inclusive date range
    pub fn date_range(self, field: &str, start: NaiveDate, end: NaiveDate) -> Self {
        self.with(Predicate::DateRange {
            field: field.to_string(),
            start,
            end,
        })
    }

    /// Add a membership test
    pub fn categorical_in<I, S>(self, field: &str, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(Predicate::CategoricalIn {
            field: field.to_string(),
            allowed: allowed.into_iter().map(Into::into).collect(),
        })
    }

    /// Separate out predicates on fields `schema` does not have.
    ///
    /// Returns the spec restricted to known fields and the predicates that
    /// were left out.
    pub fn split_missing(&self, schema: &Schema) -> (FilterSpec, Vec<Predicate>) {
        let (predicates, missing) = self
            .predicates
            .iter()
            .cloned()
            .partition(|p| schema.contains(p.field()));
        (FilterSpec { predicates }, missing)
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Apply the spec to a snapshot.
    ///
    /// Pure: the snapshot is shared, never copied or modified, and the same
    /// spec on the same snapshot always yields the same view.
    pub fn apply(&self, records: &Arc<RecordSet>) -> Result<FilteredView> {
        let bound = self
            .predicates
            .iter()
            .map(|p| p.bind(records.schema()))
            .collect::<Result<Vec<_>>>()?;

        let indices: Vec<usize> = records
            .records()
            .iter()
            .enumerate()
            .filter(|(_, record)| bound.iter().all(|p| p.matches(record)))
            .map(|(i, _)| i)
            .collect();

        debug!(
            predicates = self.predicates.len(),
            kept = indices.len(),
            total = records.len(),
            "applied filter"
        );

        Ok(FilteredView {
            source: Arc::clone(records),
            indices,
        })
    }
}

/// The records of a snapshot that satisfy a filter, in original order
#[derive(Debug, Clone)]
pub struct FilteredView {
    source: Arc<RecordSet>,
    indices: Vec<usize>,
}

impl FilteredView {
    /// A view over every record of a snapshot
    pub fn all(source: &Arc<RecordSet>) -> Self {
        Self {
            source: Arc::clone(source),
            indices: (0..source.len()).collect(),
        }
    }

    pub fn schema(&self) -> &Schema {
        self.source.schema()
    }

    /// The snapshot this view selects from
    pub fn source(&self) -> &Arc<RecordSet> {
        &self.source
    }

    /// Positions of the selected records within the snapshot
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        let records = self.source.records();
        self.indices.iter().map(move |&i| &records[i])
    }

    /// Fail with `EmptySelection` when nothing matched
    pub fn require_non_empty(&self) -> Result<&Self> {
        if self.is_empty() {
            return Err(PipelineError::EmptySelection(
                "No data available for the selected filters".to_string(),
            ));
        }
        Ok(self)
    }

    /// Keep only the records whose field equals `value`
    pub fn where_equals(&self, field: &str, value: &Value) -> Result<FilteredView> {
        let idx = self.schema().index_of(field)?;
        let records = self.source.records();
        Ok(FilteredView {
            source: Arc::clone(&self.source),
            indices: self
                .indices
                .iter()
                .copied()
                .filter(|&i| records[i].get(idx) == value)
                .collect(),
        })
    }

    /// Latest non-null date of a temporal field within the view
    pub fn latest_date(&self, field: &str) -> Result<Option<NaiveDate>> {
        let idx = self.schema().require(field, FieldKind::Temporal)?;
        Ok(self.iter().filter_map(|r| r.get(idx).as_date()).max())
    }

    /// The view as a display table, columns in schema order
    pub fn to_table(&self) -> Result<Table> {
        let columns = self
            .schema()
            .fields()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        Table::from_rows(columns, self.iter().map(|r| r.values().to_vec()).collect())
    }
}

/// Sorted distinct non-null values of a field, for "select all" options
pub fn distinct_values(view: &FilteredView, field: &str) -> Result<Vec<Value>> {
    let idx = view.schema().index_of(field)?;
    let mut values: Vec<Value> = Vec::new();
    for record in view.iter() {
        let value = record.get(idx);
        if !value.is_null() {
            values.push(value.clone());
        }
    }
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup();
    Ok(values)
}

/// Distinct non-null labels of a categorical field
pub fn distinct_labels(view: &FilteredView, field: &str) -> Result<Vec<String>> {
    view.schema().require(field, FieldKind::Categorical)?;
    Ok(distinct_values(view, field)?
        .into_iter()
        .filter_map(|v| match v {
            Value::Text(s) => Some(s),
            _ => None,
        })
        .collect())
}
