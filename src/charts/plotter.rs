//! Chart Plotter Module
//! Decides which charts a table gets and prepares the data each one draws.

use crate::data::{CanonicalTable, ColumnType, Value};
use crate::stats::SummaryMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// At most this many numeric columns get a distribution chart.
    pub max_distribution_plots: usize,
    /// Categorical columns with more distinct values are skipped.
    pub max_categories: usize,
    pub histogram_bins: usize,
    /// Numeric columns with more distinct values get a histogram,
    /// otherwise a value-count bar chart.
    pub histogram_threshold: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            max_distribution_plots: 8,
            max_categories: 10,
            histogram_bins: 30,
            histogram_threshold: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartKind {
    Distribution { column: String },
    Correlation,
    Categorical { column: String },
}

impl ChartKind {
    /// File stem, unique per dataset.
    pub fn file_stem(&self) -> String {
        match self {
            ChartKind::Distribution { column } => format!("{column}_distribution"),
            ChartKind::Correlation => "correlation_heatmap".to_string(),
            ChartKind::Categorical { column } => format!("{column}_categories"),
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartKind::Distribution { column } => write!(f, "distribution of {column}"),
            ChartKind::Correlation => f.write_str("correlation heatmap"),
            ChartKind::Categorical { column } => write!(f, "categories of {column}"),
        }
    }
}

/// A chart that could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartFailure {
    pub chart: String,
    pub reason: String,
}

impl fmt::Display for ChartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.chart, self.reason)
    }
}

/// Charts to draw, declared before any rendering starts.
#[derive(Debug, Clone, Default)]
pub struct ChartPlan {
    pub charts: Vec<ChartKind>,
    /// Charts ruled out while planning.
    pub skipped: Vec<ChartFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Prepared data for one chart.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    Histogram {
        title: String,
        x_label: String,
        bins: Vec<HistogramBin>,
    },
    Bars {
        title: String,
        x_label: String,
        bars: Vec<(String, usize)>,
    },
    Heatmap {
        title: String,
        labels: Vec<String>,
        /// `None` where the correlation is undefined.
        cells: Vec<Vec<Option<f64>>>,
    },
}

/// Plans and prepares static charts.
pub struct ChartPlotter;

impl ChartPlotter {
    pub fn plan(table: &CanonicalTable, config: &ChartConfig) -> ChartPlan {
        let mut plan = ChartPlan::default();
        let schema = table.schema();
        let numeric = schema.numeric_columns();

        if numeric.is_empty() {
            plan.skipped.push(ChartFailure {
                chart: "distribution".to_string(),
                reason: "table has no numeric columns".to_string(),
            });
        }
        for &i in numeric.iter().take(config.max_distribution_plots) {
            plan.charts.push(ChartKind::Distribution {
                column: schema.columns()[i].name.clone(),
            });
        }
        for &i in numeric.iter().skip(config.max_distribution_plots) {
            plan.skipped.push(ChartFailure {
                chart: ChartKind::Distribution {
                    column: schema.columns()[i].name.clone(),
                }
                .to_string(),
                reason: format!(
                    "only the first {} numeric columns are plotted",
                    config.max_distribution_plots
                ),
            });
        }

        if numeric.len() >= 2 {
            plan.charts.push(ChartKind::Correlation);
        } else {
            plan.skipped.push(ChartFailure {
                chart: ChartKind::Correlation.to_string(),
                reason: "needs at least two numeric columns".to_string(),
            });
        }

        for (idx, spec) in schema.columns().iter().enumerate() {
            if !matches!(spec.dtype, ColumnType::Text | ColumnType::Boolean) {
                continue;
            }
            let distinct = Self::value_counts(table.column(idx)).len();
            let kind = ChartKind::Categorical {
                column: spec.name.clone(),
            };
            if distinct <= config.max_categories {
                plan.charts.push(kind);
            } else {
                plan.skipped.push(ChartFailure {
                    chart: kind.to_string(),
                    reason: format!(
                        "{distinct} distinct values (limit {})",
                        config.max_categories
                    ),
                });
            }
        }

        plan
    }

    /// Build the drawable data for one planned chart.
    pub fn prepare(
        kind: &ChartKind,
        table: &CanonicalTable,
        metrics: &SummaryMetrics,
        config: &ChartConfig,
    ) -> Result<ChartData, String> {
        match kind {
            ChartKind::Distribution { column } => {
                let idx = Self::column_index(table, column)?;
                let values = table.numeric_values(idx);
                if values.is_empty() {
                    return Err("column has no values".to_string());
                }

                let counts = Self::value_counts(table.column(idx));
                if counts.len() > config.histogram_threshold {
                    Ok(ChartData::Histogram {
                        title: format!("Distribution of {column}"),
                        x_label: column.clone(),
                        bins: Self::histogram(&values, config.histogram_bins),
                    })
                } else {
                    // Value counts in numeric order
                    let mut bars: Vec<(f64, String, usize)> = counts
                        .into_iter()
                        .filter_map(|(label, n)| Some((label.parse::<f64>().ok()?, label, n)))
                        .collect();
                    bars.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                    Ok(ChartData::Bars {
                        title: format!("Value Counts of {column}"),
                        x_label: column.clone(),
                        bars: bars.into_iter().map(|(_, label, n)| (label, n)).collect(),
                    })
                }
            }
            ChartKind::Correlation => {
                let matrix = &metrics.correlation;
                if matrix.columns.len() < 2 {
                    return Err("needs at least two numeric columns".to_string());
                }
                Ok(ChartData::Heatmap {
                    title: "Correlation Heatmap".to_string(),
                    labels: matrix.columns.clone(),
                    cells: matrix
                        .cells
                        .iter()
                        .map(|row| row.iter().map(|c| c.coefficient()).collect())
                        .collect(),
                })
            }
            ChartKind::Categorical { column } => {
                let idx = Self::column_index(table, column)?;
                let mut bars: Vec<(String, usize)> =
                    Self::value_counts(table.column(idx)).into_iter().collect();
                if bars.is_empty() {
                    return Err("column has no values".to_string());
                }
                bars.sort_by(|a, b| b.1.cmp(&a.1));
                Ok(ChartData::Bars {
                    title: format!("Distribution of {column}"),
                    x_label: column.clone(),
                    bars,
                })
            }
        }
    }

    fn column_index(table: &CanonicalTable, column: &str) -> Result<usize, String> {
        table
            .schema()
            .index_of(column)
            .ok_or_else(|| format!("unknown column {column:?}"))
    }

    /// Non-null values counted by their rendering.
    fn value_counts<'a>(values: impl Iterator<Item = &'a Value>) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for v in values.filter(|v| !v.is_null()) {
            *counts.entry(v.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Equal-width bins over [min, max]; the last bin is closed.
    pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
        let bins = bins.max(1);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !min.is_finite() || !max.is_finite() {
            return Vec::new();
        }
        let (min, max) = if min == max { (min - 0.5, max + 0.5) } else { (min, max) };
        let width = (max - min) / bins as f64;

        let mut out: Vec<HistogramBin> = (0..bins)
            .map(|i| HistogramBin {
                lower: min + i as f64 * width,
                upper: min + (i + 1) as f64 * width,
                count: 0,
            })
            .collect();
        for v in values {
            let i = (((v - min) / width).floor() as usize).min(bins - 1);
            out[i].count += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnSpec, TableSchema};
    use crate::stats::StatsCalculator;

    fn text_only() -> CanonicalTable {
        let schema = TableSchema::new(vec![ColumnSpec::required("color", ColumnType::Text)]);
        let rows = ["red", "blue", "red"]
            .iter()
            .map(|c| vec![Value::Text(c.to_string())])
            .collect();
        CanonicalTable::new(schema, rows).unwrap()
    }

    #[test]
    fn categorical_only_table_plans_failures_not_charts() {
        let plan = ChartPlotter::plan(&text_only(), &ChartConfig::default());
        assert_eq!(
            plan.charts,
            vec![ChartKind::Categorical {
                column: "color".into()
            }]
        );
        assert_eq!(plan.skipped.len(), 2);
        assert!(plan.skipped.iter().any(|f| f.reason.contains("no numeric columns")));
    }

    #[test]
    fn histogram_covers_every_value() {
        let values: Vec<f64> = (0..100).map(|v| v as f64).collect();
        let bins = ChartPlotter::histogram(&values, 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 100);
        assert_eq!(bins[9].count, 10);
    }

    #[test]
    fn low_cardinality_numeric_gets_value_counts() {
        let schema = TableSchema::new(vec![ColumnSpec::required("n", ColumnType::Integer)]);
        let rows = [3, 1, 3, 10]
            .iter()
            .map(|v| vec![Value::Integer(*v)])
            .collect();
        let table = CanonicalTable::new(schema, rows).unwrap();
        let metrics = StatsCalculator::summarize(&table);
        let data = ChartPlotter::prepare(
            &ChartKind::Distribution { column: "n".into() },
            &table,
            &metrics,
            &ChartConfig::default(),
        )
        .unwrap();
        match data {
            ChartData::Bars { bars, .. } => assert_eq!(
                bars,
                vec![("1".into(), 1), ("3".into(), 2), ("10".into(), 1)]
            ),
            other => panic!("expected bars, got {other:?}"),
        }
    }
}
