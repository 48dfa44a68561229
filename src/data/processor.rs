//! Data Processor Module
//! Validates raw tables against a schema and repairs what can be repaired.

use crate::data::model::{CanonicalTable, ColumnSpec, ColumnType, RawTable, TableSchema, Value};
use crate::error::{PipelineError, Result};
use crate::store::ORDINAL_COLUMN;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, info};

/// How missing numeric cells in optional columns are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericFill {
    #[default]
    Median,
    Mean,
    None,
}

/// How missing text/boolean cells in optional columns are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFill {
    #[default]
    Mode,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningStrategy {
    pub remove_duplicates: bool,
    /// Trim header names, replace spaces with `_`, lowercase.
    pub strip_columns: bool,
    pub numeric_fill: NumericFill,
    pub text_fill: TextFill,
}

impl Default for CleaningStrategy {
    fn default() -> Self {
        Self {
            remove_duplicates: false,
            strip_columns: true,
            numeric_fill: NumericFill::Median,
            text_fill: TextFill::Mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropReason {
    MissingRequired { column: String },
    Uncoercible { column: String, value: String, expected: ColumnType },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::MissingRequired { column } => {
                write!(f, "missing required column '{column}'")
            }
            DropReason::Uncoercible {
                column,
                value,
                expected,
            } => write!(f, "'{value}' in column '{column}' is not {expected}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRow {
    /// 1-based data row (header excluded).
    pub row: usize,
    pub reason: DropReason,
}

/// What cleaning did to a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub dropped: Vec<DroppedRow>,
    pub duplicates_removed: usize,
    /// (column, cells filled), schema order, only columns with fills.
    pub imputed: Vec<(String, usize)>,
    /// (original header, normalized header) for headers that changed.
    pub renamed_columns: Vec<(String, String)>,
}

impl CleaningReport {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }
}

/// Handles data cleaning and validation.
pub struct DataProcessor;

impl DataProcessor {
    pub fn normalize_header(header: &str) -> String {
        header.trim().replace(' ', "_").to_lowercase()
    }

    /// Column names as cleaning sees them: normalized when configured, then
    /// made unique ignoring case (`a`, `a_2`, ...). Also returns the
    /// (original, resolved) pairs that changed.
    fn resolve_headers(
        headers: &[String],
        strategy: &CleaningStrategy,
    ) -> (Vec<String>, Vec<(String, String)>) {
        let mut taken: HashSet<String> = HashSet::from([ORDINAL_COLUMN.to_string()]);
        let mut renamed = Vec::new();
        let names = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let mut base = if strategy.strip_columns {
                    Self::normalize_header(header)
                } else {
                    header.clone()
                };
                if base.trim().is_empty() {
                    base = format!("column_{}", i + 1);
                }
                let mut name = base.clone();
                let mut n = 2;
                while !taken.insert(name.to_ascii_lowercase()) {
                    name = format!("{base}_{n}");
                    n += 1;
                }
                if &name != header {
                    renamed.push((header.clone(), name.clone()));
                }
                name
            })
            .collect();
        (names, renamed)
    }

    /// Infer a schema for sources without a fixed one. Every inferred
    /// column is optional.
    pub fn infer_schema(raw: &RawTable, strategy: &CleaningStrategy) -> TableSchema {
        let (names, _) = Self::resolve_headers(&raw.headers, strategy);
        let columns = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let cells: Vec<&str> = raw
                    .rows
                    .iter()
                    .filter_map(|row| row.get(i).and_then(|c| c.as_deref()))
                    .collect();
                ColumnSpec::optional(name, Self::infer_type(&cells))
            })
            .collect();
        TableSchema::new(columns)
    }

    fn infer_type(cells: &[&str]) -> ColumnType {
        if cells.is_empty() {
            return ColumnType::Text;
        }
        let all = |t: ColumnType| cells.iter().all(|c| t.coerce(c).is_some());
        if all(ColumnType::Integer) {
            ColumnType::Integer
        } else if all(ColumnType::Float) {
            ColumnType::Float
        } else if cells
            .iter()
            .all(|c| matches!(c.trim().to_ascii_lowercase().as_str(), "true" | "false"))
        {
            ColumnType::Boolean
        } else {
            ColumnType::Text
        }
    }

    /// Validate `raw` against `schema`.
    ///
    /// Rows missing a required value or holding a value that cannot be
    /// coerced are dropped and itemized. Fails only when required columns
    /// are absent from the header altogether.
    pub fn clean(
        raw: &RawTable,
        schema: &TableSchema,
        strategy: &CleaningStrategy,
    ) -> Result<(CanonicalTable, CleaningReport)> {
        let mut report = CleaningReport {
            rows_in: raw.row_count(),
            ..Default::default()
        };

        let (headers, renamed) = Self::resolve_headers(&raw.headers, strategy);
        report.renamed_columns = renamed;

        // Schema column -> raw column position
        let positions: Vec<Option<usize>> = schema
            .columns()
            .iter()
            .map(|spec| headers.iter().position(|h| h == &spec.name))
            .collect();

        let missing: Vec<String> = schema
            .columns()
            .iter()
            .zip(&positions)
            .filter(|(spec, pos)| spec.required && pos.is_none())
            .map(|(spec, _)| spec.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch { missing });
        }

        let mut rows: Vec<Vec<Value>> = Vec::with_capacity(raw.row_count());
        for (idx, raw_row) in raw.rows.iter().enumerate() {
            match Self::coerce_row(raw_row, schema, &positions) {
                Ok(values) => rows.push(values),
                Err(reason) => {
                    debug!(row = idx + 1, %reason, "Dropping row");
                    report.dropped.push(DroppedRow {
                        row: idx + 1,
                        reason,
                    });
                }
            }
        }

        for (col, spec) in schema.columns().iter().enumerate() {
            let filled = Self::impute(&mut rows, col, spec, strategy);
            if filled > 0 {
                info!(column = %spec.name, filled, "Filled missing values");
                report.imputed.push((spec.name.clone(), filled));
            }
        }

        // After imputation, so filled rows that now repeat are caught too
        if strategy.remove_duplicates {
            let before = rows.len();
            let mut seen = HashSet::new();
            rows.retain(|row| seen.insert(row.iter().map(Value::key).collect::<Vec<_>>()));
            report.duplicates_removed = before - rows.len();
            if report.duplicates_removed > 0 {
                info!("Removed {} duplicates", report.duplicates_removed);
            }
        }

        report.rows_out = rows.len();
        let table = CanonicalTable::new(schema.clone(), rows)?;
        info!(
            rows_in = report.rows_in,
            rows_out = report.rows_out,
            dropped = report.dropped_count(),
            "Cleaning complete"
        );
        Ok((table, report))
    }

    fn coerce_row(
        raw_row: &[Option<String>],
        schema: &TableSchema,
        positions: &[Option<usize>],
    ) -> std::result::Result<Vec<Value>, DropReason> {
        schema
            .columns()
            .iter()
            .zip(positions)
            .map(|(spec, pos)| {
                let cell = pos
                    .and_then(|i| raw_row.get(i))
                    .and_then(|c| c.as_deref())
                    .filter(|c| !c.trim().is_empty());
                match cell {
                    None if spec.required => Err(DropReason::MissingRequired {
                        column: spec.name.clone(),
                    }),
                    None => Ok(Value::Null),
                    Some(text) => spec.dtype.coerce(text).ok_or_else(|| DropReason::Uncoercible {
                        column: spec.name.clone(),
                        value: text.to_string(),
                        expected: spec.dtype,
                    }),
                }
            })
            .collect()
    }

    /// Fill nulls of one column; returns the number of cells filled.
    fn impute(
        rows: &mut [Vec<Value>],
        col: usize,
        spec: &ColumnSpec,
        strategy: &CleaningStrategy,
    ) -> usize {
        let nulls = rows.iter().filter(|r| r[col].is_null()).count();
        if nulls == 0 || nulls == rows.len() {
            return 0;
        }

        let fill = match spec.dtype {
            ColumnType::Integer | ColumnType::Float => {
                let values: Vec<f64> = rows.iter().filter_map(|r| r[col].as_f64()).collect();
                let center = match strategy.numeric_fill {
                    NumericFill::Median => median(&values),
                    NumericFill::Mean => values.iter().sum::<f64>() / values.len() as f64,
                    NumericFill::None => return 0,
                };
                if spec.dtype == ColumnType::Integer {
                    Value::Integer(center.round() as i64)
                } else {
                    Value::Float(center)
                }
            }
            ColumnType::Text | ColumnType::Boolean => {
                if strategy.text_fill == TextFill::None {
                    return 0;
                }
                match mode(rows.iter().map(|r| &r[col])) {
                    Some(v) => v,
                    None => return 0,
                }
            }
        };

        for row in rows.iter_mut().filter(|r| r[col].is_null()) {
            row[col] = fill.clone();
        }
        nulls
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Most frequent non-null value; ties go to the smallest rendering.
fn mode<'a>(values: impl Iterator<Item = &'a Value>) -> Option<Value> {
    let mut counts: BTreeMap<String, (usize, &'a Value)> = BTreeMap::new();
    for v in values.filter(|v| !v.is_null()) {
        counts.entry(v.to_string()).or_insert((0, v)).0 += 1;
    }
    let mut best: Option<(usize, &Value)> = None;
    for &(count, value) in counts.values() {
        if best.map_or(true, |(c, _)| count > c) {
            best = Some((count, value));
        }
    }
    best.map(|(_, v)| v.clone())
}
