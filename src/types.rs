//! Core data model types.
//!
//! Sampling produces an in-memory [`DataSet`] whose [`Schema`] is inferred from the sample. The
//! durable per-dataset record is [`DatasetMetadata`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ingestion::sniff::{SniffResult, SourceExtension};

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::Utf8 => "utf8",
        }
    }

    /// Parse a trimmed, non-null cell as this type.
    pub fn parse(self, raw: &str) -> Option<Value> {
        match self {
            Self::Int64 => raw.parse::<i64>().ok().map(Value::Int64),
            Self::Float64 => raw.parse::<f64>().ok().map(Value::Float64),
            Self::Bool => parse_bool(raw).map(Value::Bool),
            Self::Utf8 => Some(Value::Utf8(raw.to_owned())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Some(true),
        "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of fields describing the shape of a sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A single typed value in a [`DataSet`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// In-memory tabular sample.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields. A `DataSet` is a
/// read-only view derived from the raw file and is never written back.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns in the dataset.
    pub fn column_count(&self) -> usize {
        self.schema.fields.len()
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.row_count() as u64, self.column_count() as u64)
    }

    /// Column names in schema order.
    pub fn columns(&self) -> Vec<String> {
        self.schema.field_names().map(str::to_owned).collect()
    }

    /// A copy holding at most the first `n` rows.
    pub fn head(&self, n: usize) -> Self {
        Self {
            schema: self.schema.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Rows as JSON objects keyed by column name, for previews.
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.schema
                    .field_names()
                    .zip(row)
                    .map(|(name, v)| {
                        let json = serde_json::to_value(v).unwrap_or(serde_json::Value::Null);
                        (name.to_owned(), json)
                    })
                    .collect()
            })
            .collect()
    }

    /// Per-column null counts and inferred types.
    pub fn column_profiles(&self) -> Vec<ColumnProfile> {
        let total = self.row_count();
        self.schema
            .fields
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                let null_count = self
                    .rows
                    .iter()
                    .filter(|row| row.get(idx).is_none_or(Value::is_null))
                    .count();
                let null_ratio = if total == 0 {
                    0.0
                } else {
                    (null_count as f64 / total as f64 * 10_000.0).round() / 100.0
                };
                ColumnProfile {
                    column: field.name.clone(),
                    null_count,
                    null_ratio,
                    dtype: field.data_type,
                }
            })
            .collect()
    }
}

/// Null statistics for one sample column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub column: String,
    pub null_count: usize,
    /// Percentage of null cells, rounded to two decimals.
    pub null_ratio: f64,
    pub dtype: DataType,
}

/// `(rows, cols)`, persisted as a two-element JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, u64)", into = "(u64, u64)")]
pub struct Shape {
    pub rows: u64,
    pub cols: u64,
}

impl Shape {
    pub const fn new(rows: u64, cols: u64) -> Self {
        Self { rows, cols }
    }
}

impl From<(u64, u64)> for Shape {
    fn from((rows, cols): (u64, u64)) -> Self {
        Self { rows, cols }
    }
}

impl From<Shape> for (u64, u64) {
    fn from(s: Shape) -> Self {
        (s.rows, s.cols)
    }
}

/// How `shape_total` was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeSource {
    /// Full streaming count completed.
    #[default]
    Counted,
    /// Streaming count failed; the sample row count was substituted.
    Estimated,
}

/// The durable record for one dataset.
///
/// Created once at ingestion time and never mutated. Field names are the on-disk JSON layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub sniff: SniffResult,
    /// Shape of the in-memory sample actually loaded.
    pub shape_sample: Shape,
    /// Best-effort shape of the full file.
    pub shape_total: Option<Shape>,
    #[serde(default)]
    pub shape_total_source: ShapeSource,
    pub columns: Vec<String>,
    pub ext: SourceExtension,
    /// Absolute path to the persisted original bytes.
    pub raw_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataSet {
        DataSet::new(
            Schema::new(vec![
                Field::new("id", DataType::Int64),
                Field::new("name", DataType::Utf8),
            ]),
            vec![
                vec![Value::Int64(1), Value::Utf8("Ada".into())],
                vec![Value::Int64(2), Value::Null],
                vec![Value::Int64(3), Value::Null],
            ],
        )
    }

    #[test]
    fn profiles_report_null_percentages() {
        let profiles = sample().column_profiles();
        assert_eq!(profiles[0].null_count, 0);
        assert_eq!(profiles[0].null_ratio, 0.0);
        assert_eq!(profiles[1].null_count, 2);
        assert_eq!(profiles[1].null_ratio, 66.67);
        assert_eq!(profiles[1].dtype, DataType::Utf8);
    }

    #[test]
    fn shape_serializes_as_pair() {
        let json = serde_json::to_string(&Shape::new(50, 3)).unwrap();
        assert_eq!(json, "[50,3]");
        let back: Shape = serde_json::from_str("[7,2]").unwrap();
        assert_eq!(back, Shape::new(7, 2));
    }

    #[test]
    fn records_are_keyed_by_column() {
        let records = sample().head(1).to_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], serde_json::json!(1));
        assert_eq!(records[0]["name"], serde_json::json!("Ada"));
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert_eq!(DataType::Bool.parse("Yes"), Some(Value::Bool(true)));
        assert_eq!(DataType::Bool.parse("f"), Some(Value::Bool(false)));
        assert_eq!(DataType::Bool.parse("1"), None);
    }
}
