//! Post-run verification of stored tables.
//!
//! A stored table is reloaded from its physical definition and compared
//! against the expectation captured when it was saved.

use crate::data::{CanonicalTable, ColumnType};
use crate::error::Result;
use crate::stats::{MetricValue, StatsCalculator};
use crate::store::{Expectation, TableStore, SAMPLE_ROWS};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    RowCount { expected: usize, actual: usize },
    MissingColumn(String),
    UnexpectedColumn(String),
    ColumnType { column: String, expected: ColumnType, actual: ColumnType },
    ColumnOrder { expected: Vec<String>, actual: Vec<String> },
    SampleRow { index: usize, expected: Option<Vec<String>>, actual: Option<Vec<String>> },
    Fingerprint { expected: String, actual: String },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::RowCount { expected, actual } => {
                write!(f, "row count: expected {expected}, found {actual}")
            }
            Discrepancy::MissingColumn(c) => write!(f, "missing column {c:?}"),
            Discrepancy::UnexpectedColumn(c) => write!(f, "unexpected column {c:?}"),
            Discrepancy::ColumnType {
                column,
                expected,
                actual,
            } => write!(f, "column {column:?}: expected {expected}, found {actual}"),
            Discrepancy::ColumnOrder { expected, actual } => write!(
                f,
                "column order: expected [{}], found [{}]",
                expected.join(", "),
                actual.join(", ")
            ),
            Discrepancy::SampleRow {
                index,
                expected,
                actual,
            } => write!(
                f,
                "sample row {index}: expected {}, found {}",
                render_row(expected.as_deref()),
                render_row(actual.as_deref())
            ),
            Discrepancy::Fingerprint { expected, actual } => {
                write!(f, "content fingerprint: expected {expected}, found {actual}")
            }
        }
    }
}

fn render_row(row: Option<&[String]>) -> String {
    match row {
        Some(cells) => format!("[{}]", cells.join(", ")),
        None => "no row".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    CheckedOk,
    CheckedMismatch(Vec<Discrepancy>),
}

impl VerificationResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, VerificationResult::CheckedOk)
    }
}

/// What a stored column looks like: its type, nulls and numeric range.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: ColumnType,
    pub missing: usize,
    /// `(min, mean, max)`, for numeric columns only.
    pub range: Option<(MetricValue, MetricValue, MetricValue)>,
}

impl ColumnProfile {
    pub fn of(table: &CanonicalTable) -> Vec<ColumnProfile> {
        table
            .schema()
            .columns()
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let range = spec.dtype.is_numeric().then(|| {
                    let stats = StatsCalculator::compute_descriptive_stats(&table.numeric_values(i));
                    (stats.min, stats.mean, stats.max)
                });
                ColumnProfile {
                    name: spec.name.clone(),
                    dtype: spec.dtype,
                    missing: table.column(i).filter(|v| v.is_null()).count(),
                    range,
                }
            })
            .collect()
    }
}

/// Verification outcome plus what was found, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    pub dataset: String,
    pub result: VerificationResult,
    pub row_count: usize,
    pub columns: Vec<ColumnProfile>,
    pub sample: Vec<Vec<String>>,
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.result.is_ok() { "OK" } else { "MISMATCH" };
        writeln!(f, "{}: {status}", self.dataset)?;
        writeln!(f, "  rows: {}", self.row_count)?;
        writeln!(f, "  schema:")?;
        for column in &self.columns {
            write!(f, "    {} {} missing={}", column.name, column.dtype, column.missing)?;
            if let Some((min, mean, max)) = column.range {
                write!(f, " min={min} avg={mean} max={max}")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "  first rows:")?;
        for row in &self.sample {
            writeln!(f, "    {}", row.join(" | "))?;
        }
        if let VerificationResult::CheckedMismatch(found) = &self.result {
            writeln!(f, "  discrepancies:")?;
            for d in found {
                writeln!(f, "    - {d}")?;
            }
        }
        Ok(())
    }
}

pub struct Verifier<'a> {
    store: &'a TableStore,
}

impl<'a> Verifier<'a> {
    pub fn new(store: &'a TableStore) -> Self {
        Self { store }
    }

    /// Compare what is stored under `name` with `expected`.
    pub fn verify(&self, name: &str, expected: &Expectation) -> Result<VerificationResult> {
        let actual = self.store.load(name)?;
        Ok(Self::result_of(Self::compare(expected, &actual)))
    }

    /// Verify against the expectation recorded when `name` was saved.
    pub fn verify_recorded(&self, name: &str) -> Result<VerificationReport> {
        let expected = self.store.expectation(name)?;
        let actual = self.store.load(name)?;
        let result = Self::result_of(Self::compare(&expected, &actual));

        match &result {
            VerificationResult::CheckedOk => info!(dataset = name, "verification passed"),
            VerificationResult::CheckedMismatch(found) => {
                warn!(dataset = name, discrepancies = found.len(), "verification failed")
            }
        }

        Ok(VerificationReport {
            dataset: name.to_string(),
            result,
            row_count: actual.row_count(),
            columns: ColumnProfile::of(&actual),
            sample: actual.sample(SAMPLE_ROWS),
        })
    }

    /// Verify every dataset with a recorded expectation.
    pub fn verify_all(&self) -> Result<Vec<(String, Result<VerificationReport>)>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(|d| {
                let report = self.verify_recorded(&d.name);
                (d.name, report)
            })
            .collect())
    }

    fn result_of(found: Vec<Discrepancy>) -> VerificationResult {
        if found.is_empty() {
            VerificationResult::CheckedOk
        } else {
            VerificationResult::CheckedMismatch(found)
        }
    }

    /// Every way `actual` differs from `expected`.
    pub fn compare(expected: &Expectation, actual: &CanonicalTable) -> Vec<Discrepancy> {
        let mut found = Vec::new();

        if expected.row_count != actual.row_count() {
            found.push(Discrepancy::RowCount {
                expected: expected.row_count,
                actual: actual.row_count(),
            });
        }

        let actual_types: HashMap<&str, ColumnType> = actual
            .schema()
            .columns()
            .iter()
            .map(|c| (c.name.as_str(), c.dtype))
            .collect();
        let expected_types: HashMap<&str, ColumnType> =
            expected.columns.iter().map(|(n, t)| (n.as_str(), *t)).collect();

        for (name, dtype) in &expected.columns {
            match actual_types.get(name.as_str()) {
                None => found.push(Discrepancy::MissingColumn(name.clone())),
                Some(actual_type) if actual_type != dtype => found.push(Discrepancy::ColumnType {
                    column: name.clone(),
                    expected: *dtype,
                    actual: *actual_type,
                }),
                Some(_) => {}
            }
        }
        for spec in actual.schema().columns() {
            if !expected_types.contains_key(spec.name.as_str()) {
                found.push(Discrepancy::UnexpectedColumn(spec.name.clone()));
            }
        }

        let expected_order: Vec<String> = expected.columns.iter().map(|(n, _)| n.clone()).collect();
        let actual_order = actual.schema().names();
        let same_set = expected_order.len() == actual_order.len()
            && expected_order.iter().all(|n| actual_types.contains_key(n.as_str()));
        if same_set && expected_order != actual_order {
            found.push(Discrepancy::ColumnOrder {
                expected: expected_order,
                actual: actual_order,
            });
        }

        let sample = actual.sample(SAMPLE_ROWS);
        for index in 0..expected.sample.len().max(sample.len()) {
            let want = expected.sample.get(index);
            let got = sample.get(index);
            if want != got {
                found.push(Discrepancy::SampleRow {
                    index,
                    expected: want.cloned(),
                    actual: got.cloned(),
                });
            }
        }

        let fingerprint = actual.fingerprint();
        if fingerprint != expected.fingerprint {
            found.push(Discrepancy::Fingerprint {
                expected: expected.fingerprint.clone(),
                actual: fingerprint,
            });
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnSpec, TableSchema, Value};
    use crate::error::PipelineError;

    fn table(n: i64) -> CanonicalTable {
        let schema = TableSchema::new(vec![
            ColumnSpec::required("id", ColumnType::Integer),
            ColumnSpec::optional("score", ColumnType::Float),
        ]);
        let rows = (0..n)
            .map(|i| vec![Value::Integer(i), Value::Float(i as f64 * 1.5)])
            .collect();
        CanonicalTable::new(schema, rows).unwrap()
    }

    fn store_with(name: &str, n: i64) -> (tempfile::TempDir, TableStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TableStore::open(dir.path().join("pipeline.db")).unwrap();
        store.save(name, &table(n)).unwrap();
        (dir, store)
    }

    #[test]
    fn freshly_saved_table_verifies() {
        let (_dir, store) = store_with("scores", 10);
        let report = Verifier::new(&store).verify_recorded("scores").unwrap();
        assert_eq!(report.result, VerificationResult::CheckedOk);
        assert_eq!(report.row_count, 10);
        assert_eq!(report.sample.len(), SAMPLE_ROWS);
    }

    #[test]
    fn wrong_row_count_is_a_mismatch() {
        let (_dir, store) = store_with("scores", 10);
        let mut expected = Expectation::from_table(&table(10));
        expected.row_count = 11;
        let result = Verifier::new(&store).verify("scores", &expected).unwrap();
        assert_eq!(
            result,
            VerificationResult::CheckedMismatch(vec![Discrepancy::RowCount {
                expected: 11,
                actual: 10
            }])
        );
    }

    #[test]
    fn tampered_value_is_detected() {
        let (_dir, store) = store_with("scores", 10);
        store
            .execute_raw("UPDATE scores SET score = 99.0 WHERE id = 7")
            .unwrap();
        let report = Verifier::new(&store).verify_recorded("scores").unwrap();
        match report.result {
            VerificationResult::CheckedMismatch(found) => {
                assert_eq!(found.len(), 1);
                assert!(matches!(found[0], Discrepancy::Fingerprint { .. }));
            }
            VerificationResult::CheckedOk => panic!("tampering went unnoticed"),
        }
    }

    #[test]
    fn schema_drift_is_itemized() {
        let mut expected = Expectation::from_table(&table(3));
        expected.columns = vec![
            ("score".into(), ColumnType::Float),
            ("id".into(), ColumnType::Text),
            ("name".into(), ColumnType::Text),
        ];
        let found = Verifier::compare(&expected, &table(3));
        assert!(found.contains(&Discrepancy::MissingColumn("name".into())));
        assert!(found.contains(&Discrepancy::ColumnType {
            column: "id".into(),
            expected: ColumnType::Text,
            actual: ColumnType::Integer,
        }));
        assert!(!found.iter().any(|d| matches!(d, Discrepancy::ColumnOrder { .. })));
    }

    #[test]
    fn report_profiles_missing_values_and_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TableStore::open(dir.path().join("pipeline.db")).unwrap();
        let schema = TableSchema::new(vec![
            ColumnSpec::required("id", ColumnType::Integer),
            ColumnSpec::optional("score", ColumnType::Float),
            ColumnSpec::optional("note", ColumnType::Text),
        ]);
        let rows = vec![
            vec![Value::Integer(1), Value::Float(2.0), Value::Null],
            vec![Value::Integer(2), Value::Null, Value::Text("x".into())],
            vec![Value::Integer(3), Value::Float(4.0), Value::Null],
        ];
        store.save("notes", &CanonicalTable::new(schema, rows).unwrap()).unwrap();

        let report = Verifier::new(&store).verify_recorded("notes").unwrap();
        let score = &report.columns[1];
        assert_eq!(score.missing, 1);
        assert_eq!(
            score.range,
            Some((MetricValue::Value(2.0), MetricValue::Value(3.0), MetricValue::Value(4.0)))
        );
        assert_eq!(report.columns[2].missing, 2);
        assert_eq!(report.columns[2].range, None);

        let shown = report.to_string();
        assert!(shown.contains("score float missing=1 min=2.000 avg=3.000 max=4.000"));
        assert!(shown.contains("note text missing=2\n"));
    }

    #[test]
    fn unknown_dataset_is_not_found() {
        let (_dir, store) = store_with("scores", 3);
        let err = Verifier::new(&store).verify_recorded("missing").unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }
}
