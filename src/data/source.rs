//! Data Source Module
//! Resolves a dataset descriptor (preset, URL, or default) into a raw table.

use crate::data::loader::DataLoader;
use crate::data::model::{RawTable, TableSchema};
use crate::data::presets::{self, PresetOrigin, DEFAULT_PRESET};
use crate::error::{PipelineError, Result};
use crate::store::dataset_key;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Dataset name used for URLs that do not point at a `.csv` file.
const FALLBACK_URL_NAME: &str = "downloaded_dataset";

/// Identifies what to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetDescriptor {
    Preset(String),
    Url(String),
    Default,
}

impl DatasetDescriptor {
    /// A URL takes precedence over a preset name.
    pub fn from_args(dataset: Option<String>, url: Option<String>) -> Self {
        match (url, dataset) {
            (Some(url), _) => DatasetDescriptor::Url(url),
            (None, Some(name)) => DatasetDescriptor::Preset(name),
            (None, None) => DatasetDescriptor::Default,
        }
    }

    /// Store key this descriptor persists under.
    pub fn dataset_name(&self) -> Result<String> {
        match self {
            DatasetDescriptor::Preset(name) => dataset_key(name),
            DatasetDescriptor::Default => dataset_key(DEFAULT_PRESET),
            DatasetDescriptor::Url(url) => {
                let path = url.split(['?', '#']).next().unwrap_or_default();
                let file = path.rsplit('/').next().unwrap_or_default();
                match file.strip_suffix(".csv") {
                    Some(stem) if !stem.is_empty() => dataset_key(stem),
                    _ => dataset_key(FALLBACK_URL_NAME),
                }
            }
        }
    }
}

/// Fetches a remote payload. Exactly one attempt per call.
pub trait Fetch {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP fetcher with a fixed timeout.
pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let unavailable = |e: reqwest::Error| PipelineError::SourceUnavailable(format!("{url}: {e}"));

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(unavailable)?;
        let response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(unavailable)?;
        let body = response.bytes().map_err(unavailable)?;
        Ok(body.to_vec())
    }
}

/// Everything the cleaner needs about a resolved dataset.
#[derive(Debug, Clone)]
pub struct SourceData {
    pub name: String,
    /// Human-readable origin: preset name or URL.
    pub origin: String,
    pub raw: RawTable,
    /// Fixed schema for presets; `None` when it must be inferred.
    pub schema: Option<TableSchema>,
    /// Copy of the payload as received.
    pub raw_path: PathBuf,
}

pub struct DataSource {
    raw_dir: PathBuf,
    fetcher: Box<dyn Fetch>,
}

impl DataSource {
    pub fn new(raw_dir: impl Into<PathBuf>, fetcher: Box<dyn Fetch>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            fetcher,
        }
    }

    pub fn with_http(raw_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self::new(raw_dir, Box::new(HttpFetcher::new(timeout)))
    }

    pub fn resolve(&self, descriptor: &DatasetDescriptor) -> Result<SourceData> {
        let (origin, payload, schema) = match descriptor {
            DatasetDescriptor::Url(url) => {
                info!(%url, "Downloading dataset");
                (url.clone(), self.fetcher.fetch(url)?, None)
            }
            DatasetDescriptor::Preset(name) => self.preset_payload(name)?,
            DatasetDescriptor::Default => self.preset_payload(DEFAULT_PRESET)?,
        };
        let name = descriptor.dataset_name()?;

        if payload.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(PipelineError::Format(format!("{origin}: empty payload")));
        }

        let raw_path = self.write_raw(&name, &payload)?;
        let raw = DataLoader::load_csv(&raw_path)?;
        info!(
            dataset = %name,
            rows = raw.row_count(),
            columns = raw.column_count(),
            "Loaded raw data"
        );

        Ok(SourceData {
            name,
            origin,
            raw,
            schema,
            raw_path,
        })
    }

    fn preset_payload(&self, name: &str) -> Result<(String, Vec<u8>, Option<TableSchema>)> {
        let preset = presets::find(name).ok_or_else(|| {
            PipelineError::SourceUnavailable(format!(
                "unknown dataset {name:?} (available: {})",
                presets::names().join(", ")
            ))
        })?;

        let payload = match preset.origin {
            PresetOrigin::Builtin(csv) => csv.as_bytes().to_vec(),
            PresetOrigin::Remote(url) => {
                info!(%url, preset = preset.name, "Downloading dataset");
                self.fetcher.fetch(url)?
            }
        };
        Ok((preset.name.to_string(), payload, Some(preset.schema())))
    }

    fn write_raw(&self, name: &str, payload: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.raw_dir).map_err(|e| PipelineError::write(&self.raw_dir, e))?;
        let path = self.raw_dir.join(format!("{name}.csv"));
        fs::write(&path, payload).map_err(|e| PipelineError::write(&path, e))?;
        Ok(path)
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct StubFetcher {
        body: Option<&'static str>,
        calls: Cell<usize>,
    }

    impl Fetch for StubFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            self.body
                .map(|b| b.as_bytes().to_vec())
                .ok_or_else(|| PipelineError::SourceUnavailable(format!("{url}: connection refused")))
        }
    }

    fn source(dir: &Path, body: Option<&'static str>) -> DataSource {
        DataSource::new(
            dir.join("raw"),
            Box::new(StubFetcher {
                body,
                calls: Cell::new(0),
            }),
        )
    }

    #[test]
    fn url_names_come_from_the_file_stem() {
        let d = DatasetDescriptor::Url("https://host/data/Sales-2024.csv?raw=1".into());
        assert_eq!(d.dataset_name().unwrap(), "sales2024");
        let d = DatasetDescriptor::Url("https://host/api/export".into());
        assert_eq!(d.dataset_name().unwrap(), "downloaded_dataset");
    }

    #[test]
    fn url_wins_over_preset() {
        let d = DatasetDescriptor::from_args(Some("iris".into()), Some("https://x/y.csv".into()));
        assert!(matches!(d, DatasetDescriptor::Url(_)));
        assert_eq!(DatasetDescriptor::from_args(None, None), DatasetDescriptor::Default);
    }

    #[test]
    fn default_resolves_builtin_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let src = source(dir.path(), None);
        let data = src.resolve(&DatasetDescriptor::Default).unwrap();
        assert_eq!(data.name, "iris");
        assert_eq!(data.raw.row_count(), 150);
        assert!(data.schema.is_some());
        assert!(data.raw_path.exists());
    }

    #[test]
    fn unknown_preset_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let src = source(dir.path(), None);
        let err = src
            .resolve(&DatasetDescriptor::Preset("nonexistent-dataset".into()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable(_)));
    }

    #[test]
    fn fetch_failure_is_surfaced_after_one_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StubFetcher {
            body: None,
            calls: Cell::new(0),
        };
        let err = fetcher.fetch("https://x/y.csv").unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable(_)));
        assert_eq!(fetcher.calls.get(), 1);

        let src = source(dir.path(), None);
        let err = src
            .resolve(&DatasetDescriptor::Url("https://x/y.csv".into()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable(_)));
    }

    #[test]
    fn empty_payload_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = source(dir.path(), Some("  \n"));
        let err = src
            .resolve(&DatasetDescriptor::Url("https://x/y.csv".into()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Format(_)));
    }

    #[test]
    fn url_payload_has_no_fixed_schema() {
        let dir = tempfile::tempdir().unwrap();
        let src = source(dir.path(), Some("a,b\n1,x\n2,y\n"));
        let data = src
            .resolve(&DatasetDescriptor::Url("https://x/y.csv".into()))
            .unwrap();
        assert_eq!(data.name, "y");
        assert!(data.schema.is_none());
        assert_eq!(data.raw.row_count(), 2);
    }
}
