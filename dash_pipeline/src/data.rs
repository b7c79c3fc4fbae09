//! Dataset loading, schema validation and the snapshot cache

use crate::error::{PipelineError, Result};
use crate::schema::{FieldKind, Schema, Value};
use crate::table::Table;
use crate::utils::parse_date;
use chrono::NaiveDate;
use polars::prelude::*;
use std::fmt::Debug;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One row of a loaded dataset, laid out in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Value at a schema position; out-of-range positions read as null
    pub fn get(&self, idx: usize) -> &Value {
        self.values.get(idx).unwrap_or(&Value::Null)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// An immutable, schema-checked set of records
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    schema: Schema,
    records: Vec<Record>,
}

impl RecordSet {
    /// Create a record set, checking every record against the schema
    pub fn new(schema: Schema, records: Vec<Record>) -> Result<Self> {
        for (row, record) in records.iter().enumerate() {
            if record.values.len() != schema.len() {
                return Err(PipelineError::DataUnavailable(format!(
                    "Row {row} has {} values, schema expects {}",
                    record.values.len(),
                    schema.len()
                )));
            }
            for (value, field) in record.values.iter().zip(schema.fields()) {
                let fits = match (value, field.kind) {
                    (Value::Null, _) => true,
                    (Value::Date(_), FieldKind::Temporal) => true,
                    (Value::Text(_), FieldKind::Categorical) => true,
                    (Value::Number(_), FieldKind::Numeric) => true,
                    _ => false,
                };
                if !fits {
                    return Err(PipelineError::DataUnavailable(format!(
                        "Row {row}: value {value:?} does not fit {} field '{}'",
                        field.kind, field.name
                    )));
                }
            }
        }
        Ok(Self { schema, records })
    }

    /// Build a record set from a polars `DataFrame`.
    ///
    /// The frame is projected onto `expected`: required columns must exist,
    /// optional columns that are absent are dropped with a warning. Temporal
    /// columns are normalized to dates; an unparseable date fails the load.
    pub fn from_dataframe(df: &DataFrame, expected: &Schema) -> Result<Self> {
        let available = df.get_column_names();
        let (schema, missing) = expected.project_onto(&available)?;
        for name in &missing {
            warn!(column = %name, "optional column missing from source; dependent summaries are skipped");
        }

        let height = df.height();
        let mut columns = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let values = Self::column_values(df, &field.name, field.kind)?;
            debug_assert_eq!(values.len(), height);
            columns.push(values);
        }

        let mut records = Vec::with_capacity(height);
        for row in 0..height {
            records.push(Record::new(
                columns.iter().map(|c| c[row].clone()).collect(),
            ));
        }

        Self::new(schema, records)
    }

    fn column_values(df: &DataFrame, name: &str, kind: FieldKind) -> Result<Vec<Value>> {
        let unavailable =
            |e: PolarsError| PipelineError::DataUnavailable(format!("Column '{name}': {e}"));
        let col = df.column(name).map_err(unavailable)?;

        match kind {
            FieldKind::Numeric => {
                let cast = col.cast(&DataType::Float64).map_err(unavailable)?;
                let values = cast.f64().map_err(unavailable)?;
                Ok(values
                    .into_iter()
                    .map(|v| match v {
                        Some(n) if n.is_finite() => Value::Number(n),
                        _ => Value::Null,
                    })
                    .collect())
            }
            FieldKind::Categorical => {
                let cast = col.cast(&DataType::Utf8).map_err(unavailable)?;
                let values = cast.utf8().map_err(unavailable)?;
                Ok(values
                    .into_iter()
                    .map(|v| match v {
                        Some(s) if !s.is_empty() => Value::Text(s.to_string()),
                        _ => Value::Null,
                    })
                    .collect())
            }
            FieldKind::Temporal => {
                let cast = col.cast(&DataType::Utf8).map_err(unavailable)?;
                let values = cast.utf8().map_err(unavailable)?;
                values
                    .into_iter()
                    .map(|v| match v {
                        None => Ok(Value::Null),
                        Some(raw) => parse_date(raw).map(Value::Date).ok_or_else(|| {
                            PipelineError::DataUnavailable(format!(
                                "Column '{name}': cannot parse '{raw}' as a date"
                            ))
                        }),
                    })
                    .collect()
            }
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Earliest and latest non-null date of a temporal field
    pub fn date_bounds(&self, field: &str) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let idx = self.schema.require(field, FieldKind::Temporal)?;
        let mut dates = self.records.iter().filter_map(|r| r.get(idx).as_date());
        let first = match dates.next() {
            Some(d) => d,
            None => return Ok(None),
        };
        Ok(Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)))))
    }

    /// The whole record set as a display table
    pub fn to_table(&self) -> Result<Table> {
        let columns = self.schema.fields().iter().map(|f| f.name.clone()).collect();
        Table::from_rows(
            columns,
            self.records.iter().map(|r| r.values.clone()).collect(),
        )
    }
}

/// A place records can be loaded from
pub trait DataSource: Debug {
    /// Stable name used to key the snapshot cache
    fn name(&self) -> &str;

    /// Load and validate a fresh record set
    fn load(&self) -> Result<RecordSet>;
}

/// A delimited text file read through polars
#[derive(Debug, Clone)]
pub struct CsvSource {
    name: String,
    path: PathBuf,
    schema: Schema,
}

impl CsvSource {
    pub fn new<P: AsRef<Path>>(path: P, schema: Schema) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: format!("csv:{}", path.display()),
            path,
            schema,
        }
    }

    /// A pandemic statistics file in the Our World in Data layout
    pub fn covid<P: AsRef<Path>>(path: P) -> Self {
        Self::new(path, Schema::covid())
    }
}

impl DataSource for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<RecordSet> {
        let file = File::open(&self.path).map_err(|e| {
            PipelineError::DataUnavailable(format!("Cannot open {}: {e}", self.path.display()))
        })?;

        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()
            .map_err(|e| {
                PipelineError::DataUnavailable(format!(
                    "Cannot parse {}: {e}",
                    self.path.display()
                ))
            })?;

        let records = RecordSet::from_dataframe(&df, &self.schema)?;
        if records.schema().names_of_kind(FieldKind::Numeric).is_empty() {
            return Err(PipelineError::DataUnavailable(format!(
                "{} has no numeric metric columns",
                self.path.display()
            )));
        }

        info!(source = %self.name, rows = records.len(), "loaded dataset");
        Ok(records)
    }
}

#[derive(Debug, Clone)]
struct CachedSnapshot {
    source: String,
    snapshot: Arc<RecordSet>,
    loaded_at: Instant,
}

/// Time-bounded cache of the last loaded snapshot.
///
/// Callers inside the TTL get the same `Arc`; a fresh load replaces the
/// snapshot wholesale and never mutates a published one.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    ttl: Duration,
    entry: Option<CachedSnapshot>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// When the cached snapshot was loaded, if there is one
    pub fn loaded_at(&self) -> Option<Instant> {
        self.entry.as_ref().map(|e| e.loaded_at)
    }

    /// Return the cached snapshot, reloading it if stale or from another source
    pub fn get_or_reload(&mut self, source: &dyn DataSource) -> Result<Arc<RecordSet>> {
        self.get_or_reload_at(source, Instant::now())
    }

    /// [`get_or_reload`](Self::get_or_reload) against an explicit clock reading
    pub fn get_or_reload_at(
        &mut self,
        source: &dyn DataSource,
        now: Instant,
    ) -> Result<Arc<RecordSet>> {
        if let Some(entry) = &self.entry {
            let fresh = now.saturating_duration_since(entry.loaded_at) < self.ttl;
            if fresh && entry.source == source.name() {
                debug!(source = %entry.source, "snapshot cache hit");
                return Ok(Arc::clone(&entry.snapshot));
            }
        }

        // Never hand out a stale snapshot after a failed reload
        self.entry = None;
        let snapshot = Arc::new(source.load()?);
        self.entry = Some(CachedSnapshot {
            source: source.name().to_string(),
            snapshot: Arc::clone(&snapshot),
            loaded_at: now,
        });
        Ok(snapshot)
    }

    /// Drop the cached snapshot so the next call reloads
    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
