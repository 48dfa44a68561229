//! Error taxonomy shared by every pipeline stage.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Unparseable payload: {0}")]
    Format(String),

    #[error("Schema mismatch: missing required columns {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    #[error("Invalid dataset name: {0:?}")]
    InvalidName(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn write(path: &Path, reason: impl fmt::Display) -> Self {
        PipelineError::Write {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Clean,
    Persist,
    Analyze,
    Visualize,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingest => "ingest",
            Stage::Clean => "clean",
            Stage::Persist => "persist",
            Stage::Analyze => "analyze",
            Stage::Visualize => "visualize",
            Stage::Report => "report",
        };
        f.write_str(name)
    }
}

/// A stage-level failure: aborts the run and names the stage that failed.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {error}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

/// Tags a stage result with the stage it came from.
pub trait InStage<T> {
    fn in_stage(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> InStage<T> for Result<T> {
    fn in_stage(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|error| StageError { stage, error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_names_the_stage() {
        let err: std::result::Result<(), _> =
            Err(PipelineError::SourceUnavailable("unknown preset \"x\"".into())).in_stage(Stage::Ingest);
        let err = err.unwrap_err();
        assert_eq!(err.stage, Stage::Ingest);
        assert!(err.to_string().starts_with("ingest stage failed"));
    }

    #[test]
    fn schema_mismatch_lists_columns() {
        let err = PipelineError::SchemaMismatch {
            missing: vec!["age".into(), "fare".into()],
        };
        assert_eq!(err.to_string(), "Schema mismatch: missing required columns age, fare");
    }
}
