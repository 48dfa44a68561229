//! CSV Data Loader Module
//! Parses CSV files into raw tables and writes cleaned tables back out, using Polars.

use crate::data::model::{CanonicalTable, ColumnType, RawTable, Value};
use crate::error::PipelineError;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to load CSV: {0}")]
    CsvError(#[from] PolarsError),
    #[error("No data loaded")]
    NoData,
}

impl From<LoaderError> for PipelineError {
    fn from(err: LoaderError) -> Self {
        PipelineError::Format(err.to_string())
    }
}

/// Handles CSV file loading with Polars.
pub struct DataLoader;

impl DataLoader {
    /// Load a CSV file. Every column is read as text so that type
    /// coercion is left entirely to the cleaner.
    pub fn load_csv(file_path: &Path) -> Result<RawTable, LoaderError> {
        let df = LazyCsvReader::new(file_path)
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .with_truncate_ragged_lines(true)
            .finish()?
            .collect()?;

        if df.width() == 0 {
            return Err(LoaderError::NoData);
        }

        let table = Self::to_raw_table(&df)?;
        debug!(
            rows = table.row_count(),
            columns = table.column_count(),
            "Parsed CSV"
        );
        Ok(table)
    }

    fn to_raw_table(df: &DataFrame) -> Result<RawTable, LoaderError> {
        let headers: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut rows: Vec<Vec<Option<String>>> =
            vec![Vec::with_capacity(headers.len()); df.height()];

        for column in df.get_columns() {
            let series = column.as_materialized_series();
            let text = series.str()?;
            for (row, cell) in rows.iter_mut().zip(text.into_iter()) {
                row.push(
                    cell.filter(|c| !c.trim().is_empty())
                        .map(|c| c.to_string()),
                );
            }
        }

        Ok(RawTable::new(headers, rows))
    }

    /// Write a cleaned table as CSV with typed columns. Nulls become empty cells.
    pub fn save_csv(table: &CanonicalTable, file_path: &Path) -> crate::error::Result<()> {
        let columns: Vec<Column> = table
            .schema()
            .columns()
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let name: PlSmallStr = spec.name.as_str().into();
                let cells = table.column(i);
                match spec.dtype {
                    ColumnType::Integer => Column::new(
                        name,
                        cells
                            .map(|v| match v {
                                Value::Integer(n) => Some(*n),
                                _ => None,
                            })
                            .collect::<Vec<_>>(),
                    ),
                    ColumnType::Float => Column::new(name, cells.map(Value::as_f64).collect::<Vec<_>>()),
                    ColumnType::Boolean => Column::new(
                        name,
                        cells
                            .map(|v| match v {
                                Value::Boolean(b) => Some(*b),
                                _ => None,
                            })
                            .collect::<Vec<_>>(),
                    ),
                    ColumnType::Text => Column::new(name, cells.map(Value::to_cell).collect::<Vec<_>>()),
                }
            })
            .collect();

        let write_err = |e: &dyn std::fmt::Display| PipelineError::write(file_path, e);
        let mut df = DataFrame::new(columns).map_err(|e| write_err(&e))?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_err(&e))?;
        }
        let mut file = File::create(file_path).map_err(|e| write_err(&e))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| write_err(&e))?;

        debug!(path = %file_path.display(), rows = df.height(), "wrote cleaned CSV");
        Ok(())
    }
}
