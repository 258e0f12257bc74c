//! Seam between the materialization engine and the analytical engine that runs the SQL.

use async_trait::async_trait;
use miette::Diagnostic;
use sluice_schemas::{Column, Row, TableDefinition};

mod datafusion;

pub use self::datafusion::{preview_batch, DataFusionEngine};

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum EngineError {
    #[error("DataFusion error: {0}")]
    #[diagnostic(code(sluice::engine::datafusion))]
    DataFusion(#[from] ::datafusion::error::DataFusionError),

    #[error("Arrow error: {0}")]
    #[diagnostic(code(sluice::engine::arrow))]
    Arrow(#[from] ::datafusion::arrow::error::ArrowError),

    #[error("Failed to convert rows: {0}")]
    #[diagnostic(code(sluice::engine::rows))]
    Rows(#[from] serde_json::Error),

    #[error("{0}")]
    #[diagnostic(code(sluice::engine::other))]
    Other(String),
}

/// An embedded analytical engine holding the session's tables
///
/// Calls are issued one at a time per session; implementations only need to make
/// `create_or_replace_table` safe against overlapping callers.
#[async_trait]
pub trait AnalyticalEngine: Send + Sync {
    /// Run `sql` and store its result as `name`, replacing any previous table of that name
    async fn create_or_replace_table(&self, name: &str, sql: &str) -> Result<(), EngineError>;

    /// Column names and types of table `name`
    async fn describe(&self, name: &str) -> Result<Vec<Column>, EngineError>;

    /// Run `sql` and return its rows keyed by column name
    async fn query(&self, sql: &str) -> Result<Vec<Row>, EngineError>;

    /// Create a table from a raw definition, replacing any previous table of that name
    async fn register_table(&self, table: &TableDefinition) -> Result<(), EngineError>;
}
