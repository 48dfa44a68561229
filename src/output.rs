//! Output layout and artifact references.

use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Where charts and reports go. Passed explicitly to the stages that write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub plots_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl OutputConfig {
    pub fn under(root: &Path) -> Self {
        Self {
            plots_dir: root.join("plots"),
            reports_dir: root.join("reports"),
        }
    }

    pub fn prepare_plots(&self) -> Result<()> {
        fs::create_dir_all(&self.plots_dir).map_err(|e| PipelineError::write(&self.plots_dir, e))
    }

    pub fn prepare_reports(&self) -> Result<()> {
        fs::create_dir_all(&self.reports_dir)
            .map_err(|e| PipelineError::write(&self.reports_dir, e))
    }

    /// `<plots_dir>/<dataset>_<stem>.svg`; stable across runs so re-runs overwrite.
    /// Characters outside `[A-Za-z0-9_-]` become `_`, so column names never leave `plots_dir`.
    pub fn plot_path(&self, dataset: &str, stem: &str) -> PathBuf {
        self.plots_dir
            .join(format!("{}_{}.svg", file_safe(dataset), file_safe(stem)))
    }

    pub fn report_path(&self, dataset: &str, file: &str) -> PathBuf {
        self.reports_dir.join(format!("{dataset}_{file}"))
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Chart,
    Report,
    Export,
}

/// A generated file, referenced by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub title: String,
    pub path: PathBuf,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.path.display())
    }
}
