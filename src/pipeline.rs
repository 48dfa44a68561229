//! Runs the stages in order: ingest, clean, persist, analyze, visualize, report.
//!
//! The first stage-level failure stops the run and is returned tagged with
//! its stage. Row drops and chart failures are recorded, not fatal.

use crate::charts::{self, ChartFailure};
use crate::config::PipelineConfig;
use crate::data::{CleaningReport, DataLoader, DataProcessor, DataSource, DatasetDescriptor};
use crate::error::{InStage, Stage, StageError};
use crate::output::Artifact;
use crate::report::{ReportHandle, ReportInput, Reporter};
use crate::stats::{StatsCalculator, SummaryMetrics};
use crate::store::{Expectation, TableStore};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{info, info_span, warn};

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub dataset: String,
    pub origin: String,
    pub raw_path: PathBuf,
    pub cleaned_path: PathBuf,
    pub raw_rows: usize,
    pub raw_columns: usize,
    pub cleaning: CleaningReport,
    pub expectation: Expectation,
    pub metrics: SummaryMetrics,
    pub artifacts: Vec<Artifact>,
    pub chart_failures: Vec<ChartFailure>,
    pub report: ReportHandle,
}

impl RunOutcome {
    /// Non-fatal problems worth surfacing to the caller.
    pub fn caveats(&self) -> Vec<String> {
        let mut caveats = Vec::new();
        if self.cleaning.dropped_count() > 0 {
            caveats.push(format!(
                "{} of {} rows dropped during cleaning",
                self.cleaning.dropped_count(),
                self.cleaning.rows_in
            ));
        }
        caveats.extend(self.chart_failures.iter().map(|f| format!("chart skipped: {f}")));
        caveats
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    source: DataSource,
}

impl Pipeline {
    /// Pipeline fetching over HTTP with the configured timeout.
    pub fn new(config: PipelineConfig) -> Self {
        let source = DataSource::with_http(config.raw_dir(), config.http_timeout());
        Self { config, source }
    }

    pub fn with_source(config: PipelineConfig, source: DataSource) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, descriptor: &DatasetDescriptor) -> Result<RunOutcome, StageError> {
        let config = &self.config;
        let output = config.output();

        let source = {
            let _span = info_span!("stage", stage = %Stage::Ingest).entered();
            self.source.resolve(descriptor).in_stage(Stage::Ingest)?
        };
        let dataset = source.name.clone();

        let cleaned_path = config.processed_dir().join(format!("{dataset}_cleaned.csv"));
        let (table, cleaning) = {
            let _span = info_span!("stage", stage = %Stage::Clean, dataset = %dataset).entered();
            let schema = match &source.schema {
                Some(schema) => schema.clone(),
                None => DataProcessor::infer_schema(&source.raw, &config.cleaning),
            };
            let (table, cleaning) =
                DataProcessor::clean(&source.raw, &schema, &config.cleaning).in_stage(Stage::Clean)?;
            DataLoader::save_csv(&table, &cleaned_path).in_stage(Stage::Clean)?;
            (table, cleaning)
        };
        if cleaning.dropped_count() > 0 {
            warn!(dataset = %dataset, dropped = cleaning.dropped_count(), "rows dropped during cleaning");
        }

        // The store is opened only once the data is known to be usable.
        let (store, expectation) = {
            let _span = info_span!("stage", stage = %Stage::Persist, dataset = %dataset).entered();
            let mut store = TableStore::open(config.database_path()).in_stage(Stage::Persist)?;
            let expectation = store.save(&dataset, &table).in_stage(Stage::Persist)?;
            (store, expectation)
        };
        drop(table);

        let (stored, metrics) = {
            let _span = info_span!("stage", stage = %Stage::Analyze, dataset = %dataset).entered();
            let stored = store.load(&dataset).in_stage(Stage::Analyze)?;
            let metrics = StatsCalculator::summarize(&stored);
            (stored, metrics)
        };

        let rendered = {
            let _span = info_span!("stage", stage = %Stage::Visualize, dataset = %dataset).entered();
            charts::render(&stored, &metrics, &output, &dataset, &config.charts)
                .in_stage(Stage::Visualize)?
        };

        let report = {
            let _span = info_span!("stage", stage = %Stage::Report, dataset = %dataset).entered();
            let input = ReportInput {
                dataset: &dataset,
                origin: &source.origin,
                raw_path: &source.raw_path,
                cleaned_path: &cleaned_path,
                raw_rows: source.raw.row_count(),
                raw_columns: source.raw.column_count(),
                cleaning: &cleaning,
                metrics: &metrics,
                charts: &rendered.artifacts,
                chart_failures: &rendered.failures,
                generated_at: Utc::now(),
            };
            Reporter::compose(&input, &output).in_stage(Stage::Report)?
        };

        info!(
            dataset = %dataset,
            rows = metrics.row_count,
            charts = rendered.artifacts.len(),
            chart_failures = rendered.failures.len(),
            "pipeline finished"
        );

        Ok(RunOutcome {
            dataset,
            origin: source.origin,
            raw_path: source.raw_path,
            cleaned_path,
            raw_rows: source.raw.row_count(),
            raw_columns: source.raw.column_count(),
            cleaning,
            expectation,
            metrics,
            artifacts: rendered.artifacts,
            chart_failures: rendered.failures,
            report,
        })
    }
}
