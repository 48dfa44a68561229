//! Data module - ingestion, table model and cleaning

mod loader;
pub mod model;
pub mod presets;
mod processor;
mod source;

pub use loader::{DataLoader, LoaderError};
pub use model::{CanonicalTable, ColumnSpec, ColumnType, RawTable, TableSchema, Value};
pub use processor::{
    CleaningReport, CleaningStrategy, DataProcessor, DropReason, DroppedRow, NumericFill, TextFill,
};
pub use source::{DataSource, DatasetDescriptor, Fetch, HttpFetcher, SourceData};
