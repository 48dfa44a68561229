//! Table Model Module
//! Column schema, typed cell values, and the raw / canonical table shapes.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// SQLite declared type used by the store.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "TEXT",
        }
    }

    pub fn from_sql_type(declared: &str) -> Option<Self> {
        match declared.trim().to_ascii_uppercase().as_str() {
            "INTEGER" => Some(ColumnType::Integer),
            "REAL" => Some(ColumnType::Float),
            "BOOLEAN" => Some(ColumnType::Boolean),
            "TEXT" => Some(ColumnType::Text),
            _ => None,
        }
    }

    /// Coerce a raw cell into this type. `None` means the cell is not
    /// representable; empty cells are handled by the caller.
    pub fn coerce(self, cell: &str) -> Option<Value> {
        let cell = cell.trim();
        match self {
            ColumnType::Integer => cell.parse::<i64>().ok().map(Value::Integer),
            ColumnType::Float => cell
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::Float),
            ColumnType::Boolean => match cell.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(Value::Boolean(true)),
                "false" | "0" => Some(Value::Boolean(false)),
                _ => None,
            },
            ColumnType::Text => Some(Value::Text(cell.to_string())),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
        };
        f.write_str(name)
    }
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn dtype(&self) -> Option<ColumnType> {
        match self {
            Value::Integer(_) => Some(ColumnType::Integer),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Boolean(_) => Some(ColumnType::Boolean),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Null => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Render as a CSV cell; `None` for nulls.
    pub fn to_cell(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Exact, type-tagged encoding used for fingerprints and duplicate detection.
    pub(crate) fn key(&self) -> String {
        match self {
            Value::Integer(v) => format!("i:{v}"),
            Value::Float(v) => format!("f:{:016x}", v.to_bits()),
            Value::Boolean(v) => format!("b:{v}"),
            Value::Text(v) => format!("t:{v}"),
            Value::Null => "n:".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Null => f.write_str("NULL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: ColumnType,
    pub required: bool,
}

impl ColumnSpec {
    pub fn required(name: &str, dtype: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            required: true,
        }
    }

    pub fn optional(name: &str, dtype: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            required: false,
        }
    }
}

/// Ordered column list. Column order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Indices of Integer/Float columns, in schema order.
    pub fn numeric_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.dtype.is_numeric())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Tabular data as parsed, before validation. Empty cells are `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }
}

/// Validated, schema-conformant table: the unit of truth shared by the
/// store, the analyzer and the charts.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTable {
    schema: TableSchema,
    rows: Vec<Vec<Value>>,
}

impl CanonicalTable {
    /// Build a table, checking every row against the schema.
    ///
    /// Column names must be unique ignoring ASCII case, as SQLite compares them.
    pub fn new(schema: TableSchema, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for spec in schema.columns() {
            if !seen.insert(spec.name.to_ascii_lowercase()) {
                return Err(PipelineError::Format(format!(
                    "duplicate column name '{}'",
                    spec.name
                )));
            }
        }
        for (r, row) in rows.iter().enumerate() {
            if row.len() != schema.len() {
                return Err(PipelineError::Format(format!(
                    "row {r} has {} values, schema has {} columns",
                    row.len(),
                    schema.len()
                )));
            }
            for (spec, value) in schema.columns().iter().zip(row) {
                match value.dtype() {
                    None if spec.required => {
                        return Err(PipelineError::Format(format!(
                            "row {r}: required column '{}' is null",
                            spec.name
                        )))
                    }
                    Some(t) if t != spec.dtype => {
                        return Err(PipelineError::Format(format!(
                            "row {r}: column '{}' expects {}, got {t}",
                            spec.name, spec.dtype
                        )))
                    }
                    _ => {}
                }
            }
        }
        Ok(Self { schema, rows })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one column, nulls included.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Non-null numeric values of one column.
    pub fn numeric_values(&self, index: usize) -> Vec<f64> {
        self.column(index).filter_map(Value::as_f64).collect()
    }

    /// Render back into raw form (the inverse of cleaning).
    pub fn to_raw(&self) -> RawTable {
        RawTable {
            headers: self.schema.names(),
            rows: self
                .rows
                .iter()
                .map(|row| row.iter().map(Value::to_cell).collect())
                .collect(),
        }
    }

    /// First `n` rows rendered as text.
    pub fn sample(&self, n: usize) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .take(n)
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect()
    }

    /// SHA-256 over the schema and every value, in order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for spec in self.schema.columns() {
            hasher.update(spec.name.as_bytes());
            hasher.update([0x1f]);
            hasher.update(spec.dtype.sql_type().as_bytes());
            hasher.update([0x1e]);
        }
        for row in &self.rows {
            for value in row {
                hasher.update(value.key().as_bytes());
                hasher.update([0x1f]);
            }
            hasher.update([0x1e]);
        }
        hex::encode(hasher.finalize())
    }
}
