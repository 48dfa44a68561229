//! Report Composer Module
//! Writes the markdown run report and the CSV/JSON metric exports.

use crate::charts::ChartFailure;
use crate::data::CleaningReport;
use crate::error::{PipelineError, Result};
use crate::output::{Artifact, ArtifactKind, OutputConfig};
use crate::stats::{MetricValue, NumericStats, SummaryMetrics};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything a report is composed from.
#[derive(Debug, Clone)]
pub struct ReportInput<'a> {
    pub dataset: &'a str,
    pub origin: &'a str,
    pub raw_path: &'a Path,
    pub cleaned_path: &'a Path,
    pub raw_rows: usize,
    pub raw_columns: usize,
    pub cleaning: &'a CleaningReport,
    pub metrics: &'a SummaryMetrics,
    pub charts: &'a [Artifact],
    pub chart_failures: &'a [ChartFailure],
    pub generated_at: DateTime<Utc>,
}

/// The written report and its companion exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHandle {
    pub report: Artifact,
    pub exports: Vec<Artifact>,
}

#[derive(Serialize)]
struct MetricsExport<'a> {
    dataset: &'a str,
    generated_at: String,
    cleaning: &'a CleaningReport,
    metrics: &'a SummaryMetrics,
    chart_failures: &'a [ChartFailure],
}

pub struct Reporter;

impl Reporter {
    pub fn compose(input: &ReportInput<'_>, output: &OutputConfig) -> Result<ReportHandle> {
        output.prepare_reports()?;

        let numeric_path = output.report_path(input.dataset, "numeric_summary.csv");
        Self::export_numeric_summary(input.metrics, &numeric_path)?;
        let correlation_path = output.report_path(input.dataset, "correlation_matrix.csv");
        Self::export_correlation_matrix(input.metrics, &correlation_path)?;
        let json_path = output.report_path(input.dataset, "metrics.json");
        Self::export_json(input, &json_path)?;

        let exports = vec![
            Self::export_artifact("Numeric summary", numeric_path),
            Self::export_artifact("Correlation matrix", correlation_path),
            Self::export_artifact("Metrics (JSON)", json_path),
        ];

        let report_path = output.report_path(input.dataset, "report.md");
        let markdown =
            Self::markdown(input, &exports).map_err(|e| PipelineError::write(&report_path, e))?;
        fs::write(&report_path, markdown).map_err(|e| PipelineError::write(&report_path, e))?;
        info!(path = %report_path.display(), "report written");

        Ok(ReportHandle {
            report: Artifact {
                kind: ArtifactKind::Report,
                title: format!("{} report", input.dataset),
                path: report_path,
            },
            exports,
        })
    }

    fn export_artifact(title: &str, path: PathBuf) -> Artifact {
        Artifact {
            kind: ArtifactKind::Export,
            title: title.to_string(),
            path,
        }
    }

    fn markdown(input: &ReportInput<'_>, exports: &[Artifact]) -> std::result::Result<String, fmt::Error> {
        let mut md = String::new();
        writeln!(md, "# Data pipeline report: {}", input.dataset)?;
        writeln!(md)?;
        writeln!(md, "Generated {}", input.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(md)?;

        Self::ingestion_section(&mut md, input)?;
        Self::cleaning_section(&mut md, input.cleaning)?;
        Self::statistics_section(&mut md, input.metrics)?;
        Self::artifact_section(&mut md, input.charts, exports)?;
        Self::caveats_section(&mut md, input.chart_failures)?;
        Ok(md)
    }

    fn ingestion_section(md: &mut String, input: &ReportInput<'_>) -> fmt::Result {
        writeln!(md, "## Ingestion summary")?;
        writeln!(md)?;
        writeln!(md, "- Source: {}", input.origin)?;
        writeln!(md, "- Raw file: `{}`", input.raw_path.display())?;
        writeln!(md, "- Cleaned file: `{}`", input.cleaned_path.display())?;
        writeln!(md, "- Raw shape: {} rows x {} columns", input.raw_rows, input.raw_columns)?;
        writeln!(
            md,
            "- Stored shape: {} rows x {} columns",
            input.metrics.row_count, input.metrics.column_count
        )?;
        writeln!(md)
    }

    fn cleaning_section(md: &mut String, cleaning: &CleaningReport) -> fmt::Result {
        writeln!(md, "## Cleaning")?;
        writeln!(md)?;
        writeln!(md, "- Rows in: {}", cleaning.rows_in)?;
        writeln!(md, "- Rows out: {}", cleaning.rows_out)?;
        writeln!(md, "- Rows dropped: {}", cleaning.dropped_count())?;
        writeln!(md, "- Duplicates removed: {}", cleaning.duplicates_removed)?;
        for (from, to) in &cleaning.renamed_columns {
            writeln!(md, "- Renamed column `{from}` to `{to}`")?;
        }
        for (column, filled) in &cleaning.imputed {
            writeln!(md, "- Imputed {filled} missing value(s) in `{column}`")?;
        }
        if !cleaning.dropped.is_empty() {
            writeln!(md)?;
            writeln!(md, "| Row | Reason |")?;
            writeln!(md, "|---|---|")?;
            for drop in &cleaning.dropped {
                writeln!(md, "| {} | {} |", drop.row, drop.reason)?;
            }
        }
        writeln!(md)
    }

    fn statistics_section(md: &mut String, metrics: &SummaryMetrics) -> fmt::Result {
        writeln!(md, "## Statistics")?;
        writeln!(md)?;
        if !metrics.has_data() {
            writeln!(md, "The table has no rows; every metric is reported as no data.")?;
            writeln!(md)?;
        }

        let numeric: Vec<(&str, &NumericStats)> = metrics.numeric().collect();
        if !numeric.is_empty() {
            writeln!(md, "### Numeric columns")?;
            writeln!(md)?;
            writeln!(md, "| Column | Count | Mean | Std | Min | Median | Max |")?;
            writeln!(md, "|---|---|---|---|---|---|---|")?;
            for (name, s) in &numeric {
                writeln!(
                    md,
                    "| {name} | {} | {} | {} | {} | {} | {} |",
                    s.count, s.mean, s.std, s.min, s.median, s.max
                )?;
            }
            writeln!(md)?;
        }

        let categorical: Vec<_> = metrics.categorical().collect();
        if !categorical.is_empty() {
            writeln!(md, "### Categorical columns")?;
            writeln!(md)?;
            writeln!(md, "| Column | Count | Unique | Top values |")?;
            writeln!(md, "|---|---|---|---|")?;
            for (name, s) in &categorical {
                let top: Vec<String> = s.top.iter().map(|(v, n)| format!("{v} ({n})")).collect();
                writeln!(md, "| {name} | {} | {} | {} |", s.count, s.unique, top.join(", "))?;
            }
            writeln!(md)?;
        }

        let matrix = &metrics.correlation;
        if !matrix.is_empty() {
            writeln!(md, "### Correlations")?;
            writeln!(md)?;
            writeln!(md, "| | {} |", matrix.columns.join(" | "))?;
            writeln!(md, "|---|{}", "---|".repeat(matrix.columns.len()))?;
            for (name, row) in matrix.columns.iter().zip(&matrix.cells) {
                let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
                writeln!(md, "| {name} | {} |", cells.join(" | "))?;
            }
            writeln!(md)?;
        }

        if !metrics.insights.is_empty() {
            writeln!(md, "### Insights")?;
            writeln!(md)?;
            for insight in &metrics.insights {
                writeln!(md, "- {insight}")?;
            }
            writeln!(md)?;
        }
        Ok(())
    }

    fn artifact_section(md: &mut String, charts: &[Artifact], exports: &[Artifact]) -> fmt::Result {
        writeln!(md, "## Artifact index")?;
        writeln!(md)?;
        if charts.is_empty() {
            writeln!(md, "No charts were produced.")?;
        }
        for artifact in charts.iter().chain(exports) {
            writeln!(md, "- {}: `{}`", artifact.title, artifact.path.display())?;
        }
        writeln!(md)
    }

    fn caveats_section(md: &mut String, failures: &[ChartFailure]) -> fmt::Result {
        writeln!(md, "## Caveats")?;
        writeln!(md)?;
        if failures.is_empty() {
            return writeln!(md, "None.");
        }
        for failure in failures {
            writeln!(md, "- {failure}")?;
        }
        Ok(())
    }

    /// One row per numeric column; "no data" cells are left empty.
    fn export_numeric_summary(metrics: &SummaryMetrics, path: &Path) -> Result<()> {
        let numeric: Vec<(&str, &NumericStats)> = metrics.numeric().collect();
        let stat = |f: fn(&NumericStats) -> MetricValue| -> Vec<Option<f64>> {
            numeric.iter().map(|(_, s)| f(s).value()).collect()
        };

        let columns = vec![
            Column::new(
                "column".into(),
                numeric.iter().map(|(n, _)| n.to_string()).collect::<Vec<_>>(),
            ),
            Column::new(
                "count".into(),
                numeric.iter().map(|(_, s)| s.count as u64).collect::<Vec<_>>(),
            ),
            Column::new("mean".into(), stat(|s| s.mean)),
            Column::new("std".into(), stat(|s| s.std)),
            Column::new("min".into(), stat(|s| s.min)),
            Column::new("p05".into(), stat(|s| s.p05)),
            Column::new("p25".into(), stat(|s| s.p25)),
            Column::new("median".into(), stat(|s| s.median)),
            Column::new("p75".into(), stat(|s| s.p75)),
            Column::new("p95".into(), stat(|s| s.p95)),
            Column::new("max".into(), stat(|s| s.max)),
        ];
        Self::write_csv(columns, path)
    }

    /// Square matrix with a leading name column; undefined cells are left empty.
    fn export_correlation_matrix(metrics: &SummaryMetrics, path: &Path) -> Result<()> {
        let matrix = &metrics.correlation;
        let label = Self::label_header(&matrix.columns);
        let mut columns = vec![Column::new(label.as_str().into(), matrix.columns.clone())];
        for (j, name) in matrix.columns.iter().enumerate() {
            let values: Vec<Option<f64>> = matrix
                .cells
                .iter()
                .map(|row| row.get(j).and_then(|c| c.coefficient()))
                .collect();
            columns.push(Column::new(name.as_str().into(), values));
        }
        Self::write_csv(columns, path)
    }

    /// `column`, underscore-prefixed until it names none of `names`.
    fn label_header(names: &[String]) -> String {
        let mut label = "column".to_string();
        while names.contains(&label) {
            label.insert(0, '_');
        }
        label
    }

    fn write_csv(columns: Vec<Column>, path: &Path) -> Result<()> {
        let mut df = DataFrame::new(columns).map_err(|e| PipelineError::write(path, e))?;
        let mut file = File::create(path).map_err(|e| PipelineError::write(path, e))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| PipelineError::write(path, e))
    }

    fn export_json(input: &ReportInput<'_>, path: &Path) -> Result<()> {
        let export = MetricsExport {
            dataset: input.dataset,
            generated_at: input.generated_at.to_rfc3339(),
            cleaning: input.cleaning,
            metrics: input.metrics,
            chart_failures: input.chart_failures,
        };
        let json = serde_json::to_string_pretty(&export).map_err(|e| PipelineError::write(path, e))?;
        fs::write(path, json).map_err(|e| PipelineError::write(path, e))
    }
}
