//! Statistics Calculator Module
//! Handles descriptive statistics, categorical counts and pairwise correlations.

use crate::data::{CanonicalTable, ColumnType, Value};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::BTreeMap;
use std::fmt;

/// Number of most frequent categories kept per categorical column.
pub const TOP_CATEGORIES: usize = 5;

/// Minimum paired observations for a correlation to be defined.
pub const MIN_CORRELATION_PAIRS: usize = 3;

/// A scalar statistic, or an explicit marker that there was nothing to compute it from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Value(f64),
    NoData,
}

impl MetricValue {
    fn from_f64(v: f64) -> Self {
        if v.is_finite() {
            MetricValue::Value(v)
        } else {
            MetricValue::NoData
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            MetricValue::Value(v) => Some(v),
            MetricValue::NoData => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Value(v) => write!(f, "{v:.3}"),
            MetricValue::NoData => f.write_str("no data"),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Value(v) => serializer.serialize_f64(*v),
            MetricValue::NoData => serializer.serialize_str("no data"),
        }
    }
}

/// Statistics for a single numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub count: usize,
    pub mean: MetricValue,
    pub median: MetricValue,
    pub std: MetricValue,
    pub variance: MetricValue,
    pub min: MetricValue,
    pub max: MetricValue,
    pub p05: MetricValue,
    pub p25: MetricValue,
    pub p75: MetricValue,
    pub p95: MetricValue,
}

impl Default for NumericStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: MetricValue::NoData,
            median: MetricValue::NoData,
            std: MetricValue::NoData,
            variance: MetricValue::NoData,
            min: MetricValue::NoData,
            max: MetricValue::NoData,
            p05: MetricValue::NoData,
            p25: MetricValue::NoData,
            p75: MetricValue::NoData,
            p95: MetricValue::NoData,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalStats {
    pub count: usize,
    pub unique: usize,
    /// Most frequent values, by count then value.
    pub top: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnStats {
    Numeric(NumericStats),
    Categorical(CategoricalStats),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMetrics {
    pub name: String,
    pub dtype: ColumnType,
    pub missing: usize,
    pub stats: ColumnStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Correlation {
    Defined { r: f64, p_value: MetricValue },
    Undefined { reason: String },
}

impl Correlation {
    pub fn coefficient(&self) -> Option<f64> {
        match self {
            Correlation::Defined { r, .. } => Some(*r),
            Correlation::Undefined { .. } => None,
        }
    }
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correlation::Defined { r, .. } => write!(f, "{r:.2}"),
            Correlation::Undefined { .. } => f.write_str("undefined"),
        }
    }
}

/// Pearson correlations between numeric columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub cells: Vec<Vec<Correlation>>,
}

impl CorrelationMatrix {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Everything the analyzer derives from a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryMetrics {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnMetrics>,
    pub correlation: CorrelationMatrix,
    pub insights: Vec<String>,
}

impl SummaryMetrics {
    pub fn has_data(&self) -> bool {
        self.row_count > 0
    }

    pub fn numeric(&self) -> impl Iterator<Item = (&str, &NumericStats)> {
        self.columns.iter().filter_map(|c| match &c.stats {
            ColumnStats::Numeric(s) => Some((c.name.as_str(), s)),
            ColumnStats::Categorical(_) => None,
        })
    }

    pub fn categorical(&self) -> impl Iterator<Item = (&str, &CategoricalStats)> {
        self.columns.iter().filter_map(|c| match &c.stats {
            ColumnStats::Categorical(s) => Some((c.name.as_str(), s)),
            ColumnStats::Numeric(_) => None,
        })
    }
}

/// Handles statistical calculations with multi-threading support.
pub struct StatsCalculator;

impl StatsCalculator {
    /// Summarize a table. Pure: the same table always yields the same metrics.
    pub fn summarize(table: &CanonicalTable) -> SummaryMetrics {
        let columns: Vec<ColumnMetrics> = table
            .schema()
            .columns()
            .par_iter()
            .enumerate()
            .map(|(i, spec)| {
                let missing = table.column(i).filter(|v| v.is_null()).count();
                let stats = if spec.dtype.is_numeric() {
                    ColumnStats::Numeric(Self::compute_descriptive_stats(&table.numeric_values(i)))
                } else {
                    ColumnStats::Categorical(Self::compute_categorical_stats(table.column(i)))
                };
                ColumnMetrics {
                    name: spec.name.clone(),
                    dtype: spec.dtype,
                    missing,
                    stats,
                }
            })
            .collect();

        let correlation = Self::compute_correlation_matrix(table);
        let insights = Self::generate_insights(table, &columns);

        SummaryMetrics {
            row_count: table.row_count(),
            column_count: table.column_count(),
            columns,
            correlation,
            insights,
        }
    }

    /// Compute descriptive statistics for an array of values.
    pub fn compute_descriptive_stats(values: &[f64]) -> NumericStats {
        let n = values.len();
        if n == 0 {
            return NumericStats::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mean = values.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        let (variance, std) = if n > 1 {
            let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            (MetricValue::from_f64(variance), MetricValue::from_f64(variance.sqrt()))
        } else {
            (MetricValue::NoData, MetricValue::NoData)
        };

        NumericStats {
            count: n,
            mean: MetricValue::from_f64(mean),
            median: MetricValue::from_f64(median),
            std,
            variance,
            min: MetricValue::Value(sorted[0]),
            max: MetricValue::Value(sorted[n - 1]),
            p05: MetricValue::from_f64(Self::percentile(&sorted, 5.0)),
            p25: MetricValue::from_f64(Self::percentile(&sorted, 25.0)),
            p75: MetricValue::from_f64(Self::percentile(&sorted, 75.0)),
            p95: MetricValue::from_f64(Self::percentile(&sorted, 95.0)),
        }
    }

    /// Calculate percentile using linear interpolation (NumPy compatible).
    fn percentile(sorted_values: &[f64], p: f64) -> f64 {
        let n = sorted_values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n == 1 {
            return sorted_values[0];
        }

        let rank = (p / 100.0) * (n - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = (rank.ceil() as usize).min(n - 1);
        let frac = rank - lower as f64;

        if lower == upper {
            sorted_values[lower]
        } else {
            sorted_values[lower] * (1.0 - frac) + sorted_values[upper] * frac
        }
    }

    pub fn compute_categorical_stats<'a>(values: impl Iterator<Item = &'a Value>) -> CategoricalStats {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut count = 0;
        for v in values.filter(|v| !v.is_null()) {
            *counts.entry(v.to_string()).or_insert(0) += 1;
            count += 1;
        }

        let mut top: Vec<(String, usize)> = counts.into_iter().collect();
        let unique = top.len();
        // Stable sort keeps the BTreeMap order among equal counts
        top.sort_by(|a, b| b.1.cmp(&a.1));
        top.truncate(TOP_CATEGORIES);

        CategoricalStats { count, unique, top }
    }

    /// Pearson correlation with a two-tailed significance test.
    pub fn pearson(xs: &[f64], ys: &[f64]) -> Correlation {
        let n = xs.len().min(ys.len());
        if n < MIN_CORRELATION_PAIRS {
            return Correlation::Undefined {
                reason: format!("{n} paired values"),
            };
        }

        let mean_x = xs.iter().sum::<f64>() / n as f64;
        let mean_y = ys.iter().sum::<f64>() / n as f64;
        let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
        for (x, y) in xs.iter().zip(ys) {
            let (dx, dy) = (x - mean_x, y - mean_y);
            sxy += dx * dy;
            sxx += dx * dx;
            syy += dy * dy;
        }

        if sxx == 0.0 || syy == 0.0 {
            return Correlation::Undefined {
                reason: "zero variance".to_string(),
            };
        }

        let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
        Correlation::Defined {
            r,
            p_value: Self::correlation_p_value(r, n),
        }
    }

    fn correlation_p_value(r: f64, n: usize) -> MetricValue {
        let df = (n - 2) as f64;
        let denom = 1.0 - r * r;
        if denom <= 0.0 {
            return MetricValue::Value(0.0);
        }

        let t = r * (df / denom).sqrt();
        match StudentsT::new(0.0, 1.0, df) {
            Ok(dist) => MetricValue::from_f64(2.0 * (1.0 - dist.cdf(t.abs()))),
            Err(_) => MetricValue::NoData,
        }
    }

    /// Correlations between every pair of numeric columns, over rows where both are present.
    pub fn compute_correlation_matrix(table: &CanonicalTable) -> CorrelationMatrix {
        let numeric = table.schema().numeric_columns();
        let names = numeric
            .iter()
            .map(|&i| table.schema().columns()[i].name.clone())
            .collect();

        let cells = numeric
            .par_iter()
            .map(|&a| {
                numeric
                    .iter()
                    .map(|&b| {
                        let (xs, ys): (Vec<f64>, Vec<f64>) = table
                            .rows()
                            .iter()
                            .filter_map(|row| Some((row[a].as_f64()?, row[b].as_f64()?)))
                            .unzip();
                        Self::pearson(&xs, &ys)
                    })
                    .collect()
            })
            .collect();

        CorrelationMatrix {
            columns: names,
            cells,
        }
    }

    fn generate_insights(table: &CanonicalTable, columns: &[ColumnMetrics]) -> Vec<String> {
        let mut insights = vec![format!(
            "Dataset has {} rows and {} columns",
            table.row_count(),
            table.column_count()
        )];

        if table.is_empty() {
            insights.push("No data: every statistic is reported as \"no data\"".to_string());
            return insights;
        }

        let missing: usize = columns.iter().map(|c| c.missing).sum();
        if missing > 0 {
            insights.push(format!("Found {missing} missing values"));
        }

        let numeric: Vec<&str> = columns
            .iter()
            .filter(|c| c.dtype.is_numeric())
            .map(|c| c.name.as_str())
            .collect();
        if !numeric.is_empty() {
            insights.push(format!("Numeric columns: {}", numeric.join(", ")));
        }

        insights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnSpec, TableSchema};

    fn table(rows: Vec<Vec<Value>>) -> CanonicalTable {
        let schema = TableSchema::new(vec![
            ColumnSpec::required("x", ColumnType::Float),
            ColumnSpec::required("y", ColumnType::Integer),
            ColumnSpec::required("kind", ColumnType::Text),
        ]);
        CanonicalTable::new(schema, rows).unwrap()
    }

    fn row(x: f64, y: i64, kind: &str) -> Vec<Value> {
        vec![Value::Float(x), Value::Integer(y), Value::Text(kind.into())]
    }

    #[test]
    fn descriptive_stats_match_numpy() {
        let stats = StatsCalculator::compute_descriptive_stats(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, MetricValue::Value(2.5));
        assert_eq!(stats.median, MetricValue::Value(2.5));
        assert_eq!(stats.p25, MetricValue::Value(1.75));
        assert_eq!(stats.min, MetricValue::Value(1.0));
        assert_eq!(stats.max, MetricValue::Value(4.0));
    }

    #[test]
    fn empty_table_reports_no_data() {
        let metrics = StatsCalculator::summarize(&table(vec![]));
        assert!(!metrics.has_data());
        let (_, x) = metrics.numeric().next().unwrap();
        assert_eq!(x.mean, MetricValue::NoData);
        assert_eq!(x.std, MetricValue::NoData);
        assert!(metrics
            .correlation
            .cells
            .iter()
            .flatten()
            .all(|c| matches!(c, Correlation::Undefined { .. })));
        assert!(metrics.insights.iter().any(|i| i.starts_with("No data")));
    }

    #[test]
    fn zero_variance_correlation_is_undefined() {
        let t = table(vec![row(1.0, 7, "a"), row(2.0, 7, "b"), row(3.0, 7, "a")]);
        let metrics = StatsCalculator::summarize(&t);
        assert_eq!(
            metrics.correlation.cells[0][1],
            Correlation::Undefined {
                reason: "zero variance".into()
            }
        );
    }

    #[test]
    fn perfect_correlation_is_significant() {
        let t = table(vec![row(1.0, 2, "a"), row(2.0, 4, "b"), row(3.0, 6, "a"), row(4.0, 8, "c")]);
        let metrics = StatsCalculator::summarize(&t);
        match &metrics.correlation.cells[0][1] {
            Correlation::Defined { r, p_value } => {
                assert!((r - 1.0).abs() < 1e-12);
                assert_eq!(*p_value, MetricValue::Value(0.0));
            }
            other => panic!("expected defined correlation, got {other:?}"),
        }
    }

    #[test]
    fn categorical_counts_break_ties_by_value() {
        let t = table(vec![row(1.0, 1, "b"), row(2.0, 2, "a"), row(3.0, 3, "b"), row(4.0, 4, "c")]);
        let metrics = StatsCalculator::summarize(&t);
        let (_, kind) = metrics.categorical().next().unwrap();
        assert_eq!(kind.unique, 3);
        assert_eq!(kind.top[0], ("b".to_string(), 2));
        assert_eq!(kind.top[1], ("a".to_string(), 1));
    }

    #[test]
    fn summarize_is_deterministic() {
        let t = table(vec![row(1.5, 3, "a"), row(2.5, 1, "b"), row(0.5, 2, "a"), row(4.0, 9, "c")]);
        assert_eq!(StatsCalculator::summarize(&t), StatsCalculator::summarize(&t));
    }
}
