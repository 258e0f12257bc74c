//! Table shapes: raw table definitions used for imports and column schemas of materialized tables.

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::serde_helpers::{default_column_type, deserialize_columns, rows_from_values};

/// A row keyed by column name
pub type Row = Map<String, Value>;

/// A raw table to create before stages reference it.
///
/// Rows may be given either as objects keyed by column name or as positional arrays matching
/// the order of `columns`; both are normalized to objects on deserialization.
///
/// # Examples
///
/// ```
/// use sluice_schemas::TableDefinition;
///
/// let table: TableDefinition = serde_json::from_str(
///     r#"{
///         "name": "customers",
///         "columns": [{ "name": "customer_id", "type": "INTEGER" }, "name"],
///         "rows": [[1, "Ada"], { "customer_id": 2, "name": "Grace" }]
///     }"#,
/// )
/// .unwrap();
///
/// assert_eq!(table.columns[1].data_type, "VARCHAR");
/// assert_eq!(table.rows[0]["name"], "Ada");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "snake_case", try_from = "RawTableDefinition")]
pub struct TableDefinition {
    /// SQL visible name of the table
    pub name: String,

    #[builder(default)]
    pub columns: Vec<ColumnDefinition>,

    #[builder(default)]
    pub rows: Vec<Row>,
}

#[derive(Deserialize)]
struct RawTableDefinition {
    name: String,
    #[serde(default, deserialize_with = "deserialize_columns")]
    columns: Vec<ColumnDefinition>,
    #[serde(default)]
    rows: Vec<Value>,
}

impl TryFrom<RawTableDefinition> for TableDefinition {
    type Error = String;

    fn try_from(raw: RawTableDefinition) -> Result<Self, Self::Error> {
        let rows = rows_from_values(&raw.columns, raw.rows)
            .map_err(|e| format!("Invalid rows for table '{}': {e}", raw.name))?;

        Ok(Self {
            name: raw.name,
            columns: raw.columns,
            rows,
        })
    }
}

/// Declared column of a raw table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_new::new)]
#[serde(rename_all = "snake_case")]
pub struct ColumnDefinition {
    pub name: String,

    /// SQL-ish type name, e.g. `INTEGER`, `DOUBLE`, `VARCHAR`
    #[serde(rename = "type", alias = "data_type", default = "default_column_type")]
    pub data_type: String,
}

/// Column of a materialized table as reported by the analytical engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
#[serde(rename_all = "snake_case")]
pub struct Column {
    pub name: String,
    pub data_type: String,
}
