//! Pipeline configuration, loaded from an optional TOML file.

use crate::charts::ChartConfig;
use crate::data::CleaningStrategy;
use crate::error::{PipelineError, Result};
use crate::output::OutputConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Raw downloads, cleaned CSVs and the database live here.
    pub data_dir: PathBuf,
    /// Charts and reports are written below this directory.
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub http_timeout_secs: u64,
    pub cleaning: CleaningStrategy,
    pub charts: ChartConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("outputs"),
            log_dir: PathBuf::from("."),
            http_timeout_secs: 30,
            cleaning: CleaningStrategy::default(),
            charts: ChartConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults when `path` is `None`, otherwise the file's values over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))
    }

    /// Re-root relative directories under `root`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        for dir in [&mut self.data_dir, &mut self.output_dir, &mut self.log_dir] {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("pipeline.db")
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    /// Where the cleaned `<dataset>_cleaned.csv` copies go.
    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    pub fn output(&self) -> OutputConfig {
        OutputConfig::under(&self.output_dir)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NumericFill;

    #[test]
    fn missing_file_means_defaults() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.database_path(), Path::new("data/pipeline.db"));
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(
            &path,
            "output_dir = \"out\"\n\n[cleaning]\nremove_duplicates = true\nnumeric_fill = \"mean\"\n\n[charts]\nmax_categories = 4\n",
        )
        .unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.cleaning.remove_duplicates);
        assert_eq!(config.cleaning.numeric_fill, NumericFill::Mean);
        assert_eq!(config.charts.max_categories, 4);
        assert_eq!(config.charts.histogram_bins, 30);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, "http_timeout_secs = \"soon\"").unwrap();
        let err = PipelineConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn rooting_keeps_absolute_paths() {
        let config = PipelineConfig {
            log_dir: PathBuf::from("/var/log/pipeline"),
            ..PipelineConfig::default()
        }
        .rooted_at(Path::new("/work"));
        assert_eq!(config.data_dir, PathBuf::from("/work/data"));
        assert_eq!(config.log_dir, PathBuf::from("/var/log/pipeline"));
    }
}
