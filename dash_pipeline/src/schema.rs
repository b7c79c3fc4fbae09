//! Typed schema and row values for loaded datasets
//!
//! Every stage resolves field names through a [`Schema`] once and then works
//! with column positions, so a misspelled or missing field fails fast instead
//! of silently producing empty output.

use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The kind of data a field carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Calendar date
    Temporal,
    /// Free-form label used for grouping and membership filters
    Categorical,
    /// Floating point measurement
    Numeric,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Temporal => "temporal",
            FieldKind::Categorical => "categorical",
            FieldKind::Numeric => "numeric",
        };
        f.write_str(name)
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    /// Loading fails when a required field is absent from the source
    pub required: bool,
}

impl Field {
    pub fn required(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
        }
    }
}

/// Ordered set of fields describing a record layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Create a schema; field names must be unique
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(PipelineError::InvalidParameter(format!(
                    "Duplicate field '{}' in schema",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Columns published by the Our World in Data pandemic dataset
    pub fn covid() -> Self {
        use FieldKind::*;
        Self {
            fields: vec![
                Field::required("date", Temporal),
                Field::required("location", Categorical),
                Field::optional("iso_code", Categorical),
                Field::optional("continent", Categorical),
                Field::optional("total_cases", Numeric),
                Field::optional("new_cases", Numeric),
                Field::optional("total_deaths", Numeric),
                Field::optional("new_deaths", Numeric),
                Field::optional("total_vaccinations", Numeric),
                Field::optional("people_fully_vaccinated", Numeric),
            ],
        }
    }

    /// Columns of the e-commerce transaction dataset
    pub fn sales() -> Self {
        use FieldKind::*;
        Self {
            fields: vec![
                Field::required("Date", Temporal),
                Field::required("OrderID", Categorical),
                Field::required("CustomerID", Categorical),
                Field::required("Category", Categorical),
                Field::required("Product", Categorical),
                Field::required("Quantity", Numeric),
                Field::required("Price", Numeric),
                Field::required("Revenue", Numeric),
                Field::optional("CustomerAge", Numeric),
                Field::required("Region", Categorical),
                Field::optional("Month", Categorical),
                Field::optional("Year", Numeric),
                Field::optional("DayOfWeek", Categorical),
            ],
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Position of a field, failing on unknown names
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| PipelineError::UnknownField(name.to_string()))
    }

    /// Position of a field that must have the given kind
    pub fn require(&self, name: &str, kind: FieldKind) -> Result<usize> {
        let idx = self.index_of(name)?;
        if self.fields[idx].kind != kind {
            return Err(PipelineError::FieldType {
                field: name.to_string(),
                expected: kind.to_string(),
            });
        }
        Ok(idx)
    }

    /// Names of all fields of a kind, in schema order
    pub fn names_of_kind(&self, kind: FieldKind) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.kind == kind)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Restrict the schema to the columns a source actually provides.
    ///
    /// Missing required fields are an error; missing optional fields are
    /// dropped and returned so the caller can report them.
    pub fn project_onto(&self, available: &[&str]) -> Result<(Schema, Vec<String>)> {
        let mut kept = Vec::with_capacity(self.fields.len());
        let mut missing = Vec::new();

        for field in &self.fields {
            if available.contains(&field.name.as_str()) {
                kept.push(field.clone());
            } else if field.required {
                return Err(PipelineError::DataUnavailable(format!(
                    "Required column '{}' is missing",
                    field.name
                )));
            } else {
                missing.push(field.name.clone());
            }
        }

        Ok((Schema { fields: kept }, missing))
    }
}

/// One cell of a record or table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Date(NaiveDate),
    Text(String),
    Number(f64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Date(_) => 0,
            Value::Number(_) => 1,
            Value::Text(_) => 2,
            Value::Null => 3,
        }
    }

    /// Total order used for grouping and sorting; nulls sort last
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Text(s) => f.write_str(s),
            Value::Number(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Key wrapper giving a vector of values a total order
#[derive(Debug, Clone, PartialEq)]
pub struct GroupKey(pub Vec<Value>);

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(&other.0) {
            let ord = a.total_cmp(b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of_unknown_field() {
        let schema = Schema::covid();
        assert_eq!(schema.index_of("location").unwrap(), 1);
        assert!(matches!(
            schema.index_of("country"),
            Err(PipelineError::UnknownField(_))
        ));
    }

    #[test]
    fn test_require_checks_kind() {
        let schema = Schema::sales();
        assert!(schema.require("Revenue", FieldKind::Numeric).is_ok());
        assert!(matches!(
            schema.require("Region", FieldKind::Numeric),
            Err(PipelineError::FieldType { .. })
        ));
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let result = Schema::new(vec![
            Field::required("a", FieldKind::Numeric),
            Field::optional("a", FieldKind::Categorical),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_project_onto_drops_optional_columns() {
        let (schema, missing) = Schema::covid()
            .project_onto(&["date", "location", "new_cases"])
            .unwrap();
        assert_eq!(schema.len(), 3);
        assert!(missing.contains(&"total_deaths".to_string()));
        assert!(Schema::covid().project_onto(&["date"]).is_err());
    }

    #[test]
    fn test_nulls_sort_last() {
        let mut keys = vec![
            GroupKey(vec![Value::Null]),
            GroupKey(vec![Value::from("b")]),
            GroupKey(vec![Value::from("a")]),
        ];
        keys.sort();
        assert_eq!(keys[0].0[0], Value::from("a"));
        assert!(keys[2].0[0].is_null());
    }

    #[test]
    fn test_display_formats() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(Value::from(date).to_string(), "2024-03-09");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Null.to_string(), "");
    }
}
