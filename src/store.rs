//! SQLite-backed table store keyed by dataset name.
//!
//! Each dataset is one physical table; `_pipeline_datasets` records the
//! expectation (shape, fingerprint, sample) captured when it was saved.

use crate::data::{CanonicalTable, ColumnSpec, ColumnType, TableSchema, Value};
use crate::error::{PipelineError, Result};
use chrono::Utc;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Rows captured in an expectation for spot-checking.
pub const SAMPLE_ROWS: usize = 3;

const META_TABLE: &str = "_pipeline_datasets";
const STAGING_SUFFIX: &str = "__staging";

/// Insertion-order column added to every stored table. Not part of the schema.
pub const ORDINAL_COLUMN: &str = "_pipeline_row";

/// Sanitize a dataset name into a table key: alphanumerics and `_`, lowercased.
pub fn dataset_key(name: &str) -> Result<String> {
    let key: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase();
    if key.is_empty() || key.starts_with("_pipeline") || key.ends_with(STAGING_SUFFIX) {
        return Err(PipelineError::InvalidName(name.to_string()));
    }
    Ok(key)
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Shape and content recorded at save time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub row_count: usize,
    pub columns: Vec<(String, ColumnType)>,
    pub fingerprint: String,
    pub sample: Vec<Vec<String>>,
}

impl Expectation {
    pub fn from_table(table: &CanonicalTable) -> Self {
        Self {
            row_count: table.row_count(),
            columns: table
                .schema()
                .columns()
                .iter()
                .map(|c| (c.name.clone(), c.dtype))
                .collect(),
            fingerprint: table.fingerprint(),
            sample: table.sample(SAMPLE_ROWS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDataset {
    pub name: String,
    pub row_count: usize,
    pub saved_at: String,
}

pub struct TableStore {
    conn: Connection,
    path: PathBuf,
}

impl TableStore {
    /// Open (creating if needed) the database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::write(parent, e))?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS {META_TABLE} (
                name        TEXT PRIMARY KEY,
                row_count   INTEGER NOT NULL,
                columns     TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                sample      TEXT NOT NULL,
                saved_at    TEXT NOT NULL
            );
            "#
        ))?;
        Ok(Self { conn, path })
    }

    /// Open an existing database read-only; `NotFound` if the file does not exist.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::NotFound(format!(
                "database {} (run the pipeline first)",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace whatever is stored under `name` with `table`.
    ///
    /// Rows are written to a staging table; dropping the old table, renaming
    /// the staging table and recording the expectation happen in the same
    /// transaction, so readers see either the old or the new table.
    pub fn save(&mut self, name: &str, table: &CanonicalTable) -> Result<Expectation> {
        let key = dataset_key(name)?;
        if table.schema().is_empty() {
            return Err(PipelineError::Format(format!(
                "cannot persist {key}: table has no columns"
            )));
        }
        if table
            .schema()
            .columns()
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(ORDINAL_COLUMN))
        {
            return Err(PipelineError::Format(format!(
                "cannot persist {key}: column name {ORDINAL_COLUMN:?} is reserved"
            )));
        }
        let staging = format!("{key}{STAGING_SUFFIX}");
        let expectation = Expectation::from_table(table);

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {staging_q}; {create};",
            staging_q = quote(&staging),
            create = create_sql(&staging, table.schema())
        ))?;
        {
            let placeholders = vec!["?"; table.column_count()].join(", ");
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                quote(&staging),
                column_list(table.schema())
            ))?;
            for row in table.rows() {
                stmt.execute(params_from_iter(row.iter().map(to_sql)))?;
            }
        }
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {key_q}; ALTER TABLE {staging_q} RENAME TO {key_q};",
            key_q = quote(&key),
            staging_q = quote(&staging)
        ))?;
        tx.execute(
            &format!(
                "INSERT INTO {META_TABLE} (name, row_count, columns, fingerprint, sample, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(name) DO UPDATE SET
                    row_count=excluded.row_count,
                    columns=excluded.columns,
                    fingerprint=excluded.fingerprint,
                    sample=excluded.sample,
                    saved_at=excluded.saved_at"
            ),
            params![
                key,
                expectation.row_count as i64,
                to_json(&expectation.columns)?,
                expectation.fingerprint,
                to_json(&expectation.sample)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        info!(table = %key, rows = table.row_count(), "Saved table");
        Ok(expectation)
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        let key = dataset_key(name)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Reload a table; schema comes from the physical table definition.
    pub fn load(&self, name: &str) -> Result<CanonicalTable> {
        let key = dataset_key(name)?;
        if !self.exists(&key)? {
            return Err(PipelineError::NotFound(format!("no dataset stored as {key:?}")));
        }

        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote(&key)))?;
        let declared = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)? != 0,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let columns = declared
            .into_iter()
            .filter(|(name, _, _)| name != ORDINAL_COLUMN)
            .map(|(name, decl, not_null)| {
                let dtype = ColumnType::from_sql_type(&decl).ok_or_else(|| {
                    PipelineError::Format(format!("column {name:?} has unsupported type {decl:?}"))
                })?;
                Ok(ColumnSpec {
                    name,
                    dtype,
                    required: not_null,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let schema = TableSchema::new(columns);

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY {}",
            column_list(&schema),
            quote(&key),
            quote(ORDINAL_COLUMN)
        ))?;
        let mut rows = stmt.query([])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(schema.len());
            for (i, spec) in schema.columns().iter().enumerate() {
                record.push(from_sql(row.get_ref(i)?, spec)?);
            }
            values.push(record);
        }

        CanonicalTable::new(schema, values)
    }

    /// Expectation recorded by the last save of `name`.
    pub fn expectation(&self, name: &str) -> Result<Expectation> {
        let key = dataset_key(name)?;
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT row_count, columns, fingerprint, sample FROM {META_TABLE} WHERE name = ?1"
                ),
                params![key],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let (row_count, columns, fingerprint, sample) = row.ok_or_else(|| {
            PipelineError::NotFound(format!("no recorded expectation for {key:?}"))
        })?;
        Ok(Expectation {
            row_count: row_count as usize,
            columns: from_json(&columns)?,
            fingerprint,
            sample: from_json(&sample)?,
        })
    }

    /// Datasets with a recorded expectation, by name.
    pub fn list(&self) -> Result<Vec<StoredDataset>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT name, row_count, saved_at FROM {META_TABLE} ORDER BY name"
        ))?;
        let datasets = stmt
            .query_map([], |row| {
                Ok(StoredDataset {
                    name: row.get(0)?,
                    row_count: row.get::<_, i64>(1)? as usize,
                    saved_at: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(datasets)
    }

    /// Names of every physical table, internal ones excluded.
    pub fn tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE '\\_pipeline%' ESCAPE '\\' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

fn create_sql(table: &str, schema: &TableSchema) -> String {
    let mut columns = vec![format!("{} INTEGER PRIMARY KEY", quote(ORDINAL_COLUMN))];
    columns.extend(schema.columns().iter().map(|c| {
        let not_null = if c.required { " NOT NULL" } else { "" };
        format!("{} {}{not_null}", quote(&c.name), c.dtype.sql_type())
    }));
    format!("CREATE TABLE {} ({})", quote(table), columns.join(", "))
}

fn column_list(schema: &TableSchema) -> String {
    schema
        .columns()
        .iter()
        .map(|c| quote(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Float(v) => SqlValue::Real(*v),
        Value::Boolean(v) => SqlValue::Integer(i64::from(*v)),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Null => SqlValue::Null,
    }
}

fn from_sql(value: ValueRef<'_>, spec: &ColumnSpec) -> Result<Value> {
    let mismatch = |found: &str| {
        PipelineError::Format(format!(
            "column {:?} declared {} holds {found}",
            spec.name, spec.dtype
        ))
    };
    Ok(match (value, spec.dtype) {
        (ValueRef::Null, _) => Value::Null,
        (ValueRef::Integer(v), ColumnType::Integer) => Value::Integer(v),
        (ValueRef::Integer(v), ColumnType::Boolean) => Value::Boolean(v != 0),
        (ValueRef::Integer(v), ColumnType::Float) => Value::Float(v as f64),
        (ValueRef::Real(v), ColumnType::Float) => Value::Float(v),
        (ValueRef::Text(bytes), ColumnType::Text) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
        (ValueRef::Integer(v), ColumnType::Text) => Value::Text(v.to_string()),
        (ValueRef::Real(v), ColumnType::Text) => Value::Text(v.to_string()),
        (ValueRef::Real(_), _) => return Err(mismatch("a real")),
        (ValueRef::Text(_), _) => return Err(mismatch("text")),
        (ValueRef::Blob(_), _) => return Err(mismatch("a blob")),
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| PipelineError::Format(e.to_string()))
}

fn from_json<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| PipelineError::Format(format!("corrupt dataset metadata: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ColumnSpec;

    fn table() -> CanonicalTable {
        let schema = TableSchema::new(vec![
            ColumnSpec::required("id", ColumnType::Integer),
            ColumnSpec::required("ratio", ColumnType::Float),
            ColumnSpec::required("flag", ColumnType::Boolean),
            ColumnSpec::optional("label", ColumnType::Text),
        ]);
        CanonicalTable::new(
            schema,
            vec![
                vec![Value::Integer(1), Value::Float(0.1), Value::Boolean(true), Value::Text("007".into())],
                vec![Value::Integer(-2), Value::Float(3.0), Value::Boolean(false), Value::Null],
                vec![Value::Integer(i64::MAX), Value::Float(1e-300), Value::Boolean(true), Value::Text("x y".into())],
            ],
        )
        .unwrap()
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TableStore::open(dir.path().join("pipeline.db")).unwrap();
        let t = table();

        store.save("Mixed", &t).unwrap();
        let loaded = store.load("mixed").unwrap();
        assert_eq!(loaded, t);
        assert_eq!(loaded.fingerprint(), t.fingerprint());
    }

    #[test]
    fn save_replaces_previous_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TableStore::open(dir.path().join("pipeline.db")).unwrap();
        let t = table();
        store.save("mixed", &t).unwrap();

        let smaller = CanonicalTable::new(t.schema().clone(), t.rows()[..1].to_vec()).unwrap();
        store.save("mixed", &smaller).unwrap();

        assert_eq!(store.load("mixed").unwrap().row_count(), 1);
        assert_eq!(store.expectation("mixed").unwrap().row_count, 1);
        assert_eq!(store.tables().unwrap(), vec!["mixed"]);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn load_unknown_name_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::open(dir.path().join("pipeline.db")).unwrap();
        assert!(matches!(store.load("ghost"), Err(PipelineError::NotFound(_))));
        assert!(matches!(store.expectation("ghost"), Err(PipelineError::NotFound(_))));
    }

    #[test]
    fn open_existing_requires_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TableStore::open_existing(dir.path().join("missing.db"));
        assert!(matches!(err, Err(PipelineError::NotFound(_))));
    }

    #[test]
    fn expectation_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.db");
        let expected = {
            let mut store = TableStore::open(&path).unwrap();
            store.save("mixed", &table()).unwrap()
        };
        let store = TableStore::open_existing(&path).unwrap();
        assert_eq!(store.expectation("mixed").unwrap(), expected);
    }

    #[test]
    fn rowid_named_column_keeps_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TableStore::open(dir.path().join("pipeline.db")).unwrap();
        let schema = TableSchema::new(vec![
            ColumnSpec::required("rowid", ColumnType::Integer),
            ColumnSpec::required("v", ColumnType::Text),
        ]);
        let rows = [(3, "a"), (1, "b"), (2, "c")]
            .iter()
            .map(|(id, v)| vec![Value::Integer(*id), Value::Text(v.to_string())])
            .collect();
        let t = CanonicalTable::new(schema, rows).unwrap();

        store.save("ordered", &t).unwrap();
        let loaded = store.load("ordered").unwrap();
        assert_eq!(loaded, t);
        assert_eq!(loaded.schema().names(), vec!["rowid", "v"]);
    }

    #[test]
    fn ordinal_column_name_is_reserved() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TableStore::open(dir.path().join("pipeline.db")).unwrap();
        let schema = TableSchema::new(vec![ColumnSpec::required(ORDINAL_COLUMN, ColumnType::Integer)]);
        let t = CanonicalTable::new(schema, vec![vec![Value::Integer(1)]]).unwrap();
        assert!(matches!(store.save("clash", &t), Err(PipelineError::Format(_))));
    }

    #[test]
    fn open_existing_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.db");
        TableStore::open(&path).unwrap().save("mixed", &table()).unwrap();

        let store = TableStore::open_existing(&path).unwrap();
        assert_eq!(store.load("mixed").unwrap(), table());
        assert!(store.execute_raw("CREATE TABLE scratch (x INTEGER)").is_err());
        assert_eq!(store.tables().unwrap(), vec!["mixed"]);
    }

    #[test]
    fn dataset_key_sanitizes() {
        assert_eq!(dataset_key("Titanic-Cleaned v2").unwrap(), "titaniccleanedv2");
        assert!(matches!(dataset_key("--"), Err(PipelineError::InvalidName(_))));
        assert!(dataset_key("_pipeline_datasets").is_err());
    }
}
