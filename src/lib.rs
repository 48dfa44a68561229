//! Data Pipeline - CSV ingestion, cleaning, SQLite persistence and reporting
//!
//! Loads a dataset from a built-in preset or a URL, cleans it against a
//! schema, stores it in SQLite, and writes statistics, charts and a report.

pub mod charts;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod store;
pub mod verify;

pub use config::PipelineConfig;
pub use data::DatasetDescriptor;
pub use error::{PipelineError, Result, Stage, StageError};
pub use pipeline::{Pipeline, RunOutcome};
pub use store::TableStore;
pub use verify::{ColumnProfile, Discrepancy, VerificationReport, VerificationResult, Verifier};
