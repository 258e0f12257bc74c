//! Shared serde helper functions for deserialization and default values.
//!
//! Stage and table definitions are produced by people and by a suggestion service, so a few
//! fields accept more than one shape.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::stages::{SortDirection, SortKey};
use crate::tables::{ColumnDefinition, Row};

// =============================================================================
// Default value functions
// =============================================================================

/// Column type used when a raw table does not declare one
pub fn default_column_type() -> String {
    "VARCHAR".to_string()
}

// =============================================================================
// Custom deserializers
// =============================================================================

/// Sort keys given either as `"column"` or `{ "column": "..", "direction": ".." }`
pub fn deserialize_sort_keys<'de, D>(deserializer: D) -> Result<Vec<SortKey>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawSortKey {
        Name(String),
        Object {
            column: String,
            #[serde(default)]
            direction: SortDirection,
        },
    }

    let keys: Vec<RawSortKey> = Vec::deserialize(deserializer)?;

    Ok(keys
        .into_iter()
        .map(|key| match key {
            RawSortKey::Name(column) => SortKey::new(column, SortDirection::default()),
            RawSortKey::Object { column, direction } => SortKey::new(column, direction),
        })
        .collect())
}

/// Columns given either as plain names or as `{ "name": .., "type": .. }` objects
pub fn deserialize_columns<'de, D>(deserializer: D) -> Result<Vec<ColumnDefinition>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawColumn {
        Name(String),
        Object(ColumnDefinition),
    }

    let columns: Vec<RawColumn> = Vec::deserialize(deserializer)?;

    Ok(columns
        .into_iter()
        .map(|column| match column {
            RawColumn::Name(name) => ColumnDefinition::new(name, default_column_type()),
            RawColumn::Object(column) => column,
        })
        .collect())
}

/// Rows given as objects, or as positional arrays keyed by the declared column order
pub fn rows_from_values(
    columns: &[ColumnDefinition],
    rows: Vec<Value>,
) -> Result<Vec<Row>, String> {
    rows.into_iter()
        .map(|row| match row {
            Value::Object(map) => Ok(map),
            Value::Array(values) => {
                if values.len() > columns.len() {
                    return Err(format!(
                        "Row has {} values but only {} columns are declared",
                        values.len(),
                        columns.len()
                    ));
                }

                Ok(columns
                    .iter()
                    .map(|column| column.name.clone())
                    .zip(values)
                    .collect())
            }
            other => Err(format!(
                "Invalid row, expected an object or an array: {other}"
            )),
        })
        .collect()
}
