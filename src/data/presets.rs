//! Named datasets with fixed schemas.

use crate::data::model::{ColumnSpec, ColumnType, TableSchema};

/// Preset used when no dataset is given.
pub const DEFAULT_PRESET: &str = "iris";

const IRIS_CSV: &str = include_str!("../../assets/iris.csv");

/// Where a preset's payload comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetOrigin {
    /// Embedded in the binary, no network access.
    Builtin(&'static str),
    Remote(&'static str),
}

pub struct Preset {
    pub name: &'static str,
    pub origin: PresetOrigin,
    schema: fn() -> TableSchema,
}

impl Preset {
    pub fn schema(&self) -> TableSchema {
        (self.schema)()
    }
}

static PRESETS: [Preset; 2] = [
    Preset {
        name: "iris",
        origin: PresetOrigin::Builtin(IRIS_CSV),
        schema: iris_schema,
    },
    Preset {
        name: "titanic",
        origin: PresetOrigin::Remote(
            "https://raw.githubusercontent.com/datasciencedojo/datasets/master/titanic.csv",
        ),
        schema: titanic_schema,
    },
];

pub fn find(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name.trim()))
}

pub fn names() -> Vec<&'static str> {
    PRESETS.iter().map(|p| p.name).collect()
}

fn iris_schema() -> TableSchema {
    use ColumnType::*;
    TableSchema::new(vec![
        ColumnSpec::required("sepal_length", Float),
        ColumnSpec::required("sepal_width", Float),
        ColumnSpec::required("petal_length", Float),
        ColumnSpec::required("petal_width", Float),
        ColumnSpec::required("species", Text),
    ])
}

fn titanic_schema() -> TableSchema {
    use ColumnType::*;
    TableSchema::new(vec![
        ColumnSpec::required("passengerid", Integer),
        ColumnSpec::required("survived", Integer),
        ColumnSpec::required("pclass", Integer),
        ColumnSpec::required("name", Text),
        ColumnSpec::required("sex", Text),
        ColumnSpec::optional("age", Float),
        ColumnSpec::required("sibsp", Integer),
        ColumnSpec::required("parch", Integer),
        ColumnSpec::required("ticket", Text),
        ColumnSpec::required("fare", Float),
        ColumnSpec::optional("cabin", Text),
        ColumnSpec::optional("embarked", Text),
    ])
}
