//! Row-oriented result tables handed to the presentation layer

use crate::error::{PipelineError, Result};
use crate::schema::{GroupKey, Value};
use chrono::NaiveDate;
use dash_math::descriptive::round_to;
use polars::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;

/// A rectangular table of values with named columns.
///
/// Tables are values: every transformation returns a new table and leaves
/// the receiver untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given headings
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Create a table from headings and rows, checking every row's width
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut table = Self {
            columns,
            rows: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Append a row
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::InvalidParameter(format!(
                "Row has {} values but the table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| PipelineError::UnknownField(name.to_string()))
    }

    /// Values of one column, top to bottom
    pub fn column(&self, name: &str) -> Result<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Values of a numeric column; non-numbers come back as `None`
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        Ok(self.column(name)?.into_iter().map(Value::as_f64).collect())
    }

    /// Cell at a row and named column
    pub fn value(&self, row: usize, column: &str) -> Result<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx]).ok_or_else(|| {
            PipelineError::InvalidParameter(format!(
                "Row {row} out of range for table of {} rows",
                self.rows.len()
            ))
        })
    }

    /// Replace every heading, in order
    pub fn rename_columns(&self, names: &[&str]) -> Result<Table> {
        if names.len() != self.columns.len() {
            return Err(PipelineError::InvalidParameter(format!(
                "Expected {} column names, got {}",
                self.columns.len(),
                names.len()
            )));
        }
        Ok(Table {
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows: self.rows.clone(),
        })
    }

    /// Stable sort on one column; nulls go last in either direction
    pub fn sort_by(&self, column: &str, descending: bool) -> Result<Table> {
        let idx = self.column_index(column)?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| match (a[idx].is_null(), b[idx].is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = a[idx].total_cmp(&b[idx]);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        });
        Ok(Table {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Sort rows by one or more key columns ascending
    pub fn sort_by_keys(&self, keys: &[&str]) -> Result<Table> {
        let idxs = keys
            .iter()
            .map(|k| self.column_index(k))
            .collect::<Result<Vec<_>>>()?;
        let mut rows = self.rows.clone();
        rows.sort_by_cached_key(|row| GroupKey(idxs.iter().map(|&i| row[i].clone()).collect()));
        Ok(Table {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// First `n` rows
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Reorder rows so a label column follows a fixed order.
    ///
    /// Rows whose label is not listed keep their relative order at the end.
    pub fn order_by_labels(&self, column: &str, labels: &[&str]) -> Result<Table> {
        let idx = self.column_index(column)?;
        let mut rows = self.rows.clone();
        rows.sort_by_key(|row| {
            row[idx]
                .as_str()
                .and_then(|label| labels.iter().position(|l| *l == label))
                .unwrap_or(labels.len())
        });
        Ok(Table {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Keep rows matching a predicate
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[Value]) -> bool,
    {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Round every number to a fixed number of decimals
    pub fn round(&self, decimals: u32) -> Table {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| match v {
                        Value::Number(n) => Value::Number(round_to(*n, decimals)),
                        other => other.clone(),
                    })
                    .collect()
            })
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Convert to a polars `DataFrame`.
    ///
    /// A column whose non-null cells are all numbers becomes `Float64`, all
    /// dates becomes `Date`, anything else becomes text.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut series = Vec::with_capacity(self.columns.len());

        for (idx, name) in self.columns.iter().enumerate() {
            let cells: Vec<&Value> = self.rows.iter().map(|r| &r[idx]).collect();
            let non_null = || cells.iter().filter(|v| !v.is_null());

            let s = if non_null().all(|v| matches!(v, Value::Number(_))) {
                let values: Vec<Option<f64>> = cells.iter().map(|v| v.as_f64()).collect();
                Series::new(name, values)
            } else if non_null().all(|v| matches!(v, Value::Date(_))) {
                let values: Vec<Option<NaiveDate>> = cells.iter().map(|v| v.as_date()).collect();
                Series::new(name, values)
            } else {
                let values: Vec<Option<String>> = cells
                    .iter()
                    .map(|v| (!v.is_null()).then(|| v.to_string()))
                    .collect();
                Series::new(name, values)
            };
            series.push(s);
        }

        Ok(DataFrame::new(series)?)
    }
}
