use std::sync::Arc;

use async_trait::async_trait;
use datafusion::{
    arrow::{
        array::RecordBatch,
        datatypes::{DataType, Field, Schema, SchemaRef},
        json::{writer::JsonArray, ReaderBuilder, WriterBuilder},
    },
    datasource::MemTable,
    execution::{
        context::{SQLOptions, SessionContext},
        runtime_env::RuntimeEnvBuilder,
    },
};
use sluice_schemas::{Column, ColumnDefinition, Row, TableDefinition};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{AnalyticalEngine, EngineError};
use crate::config::SessionConfig;

/// [`AnalyticalEngine`] backed by an in-process DataFusion `SessionContext`
///
/// Stage results are collected into in-memory tables. Stage SQL must be a query: DDL, DML
/// and statements (e.g. `SET VARIABLE`, `CREATE TABLE`) are rejected.
pub struct DataFusionEngine {
    ctx: Arc<SessionContext>,
    ddl: Mutex<()>,
}

impl Default for DataFusionEngine {
    fn default() -> Self {
        Self::new(Arc::new(SessionContext::new()))
    }
}

impl DataFusionEngine {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self {
            ctx,
            ddl: Mutex::new(()),
        }
    }

    /// Create an engine with its own context, memory bounded by `config.max_memory_gb` if set
    pub fn try_from_config(config: &SessionConfig) -> Result<Self, EngineError> {
        let ctx = match config.max_memory_gb {
            Some(memory_gb) => {
                let max_memory_bytes = memory_gb * 1024 * 1024 * 1024;
                debug!("Creating runtime environment with memory limit of {memory_gb} GB ({max_memory_bytes} bytes)");

                // allow 95% of the limit to be used
                let runtime_env = RuntimeEnvBuilder::new()
                    .with_memory_limit(max_memory_bytes, 0.95)
                    .build_arc()?;

                SessionContext::new_with_config_rt(
                    datafusion::execution::config::SessionConfig::new(),
                    runtime_env,
                )
            }
            None => SessionContext::new(),
        };

        Ok(Self::new(Arc::new(ctx)))
    }

    /// The underlying context, e.g. to register UDFs or inspect tables directly
    pub fn context(&self) -> Arc<SessionContext> {
        self.ctx.clone()
    }

    fn query_options() -> SQLOptions {
        SQLOptions::new()
            .with_allow_ddl(false)
            .with_allow_dml(false)
            .with_allow_statements(false)
    }

    async fn replace(&self, name: &str, table: MemTable) -> Result<(), EngineError> {
        let _guard = self.ddl.lock().await;

        self.ctx.deregister_table(name)?;
        self.ctx.register_table(name, Arc::new(table))?;

        Ok(())
    }
}

#[async_trait]
impl AnalyticalEngine for DataFusionEngine {
    #[instrument(skip(self, sql), err)]
    async fn create_or_replace_table(&self, name: &str, sql: &str) -> Result<(), EngineError> {
        debug!("Materializing '{name}': {sql}");

        let result = self.ctx.sql_with_options(sql, Self::query_options()).await?;
        let schema = Arc::new(result.schema().as_arrow().clone());
        let partitioned = result.collect_partitioned().await?;
        let table = MemTable::try_new(schema, partitioned)?;

        self.replace(name, table).await
    }

    async fn describe(&self, name: &str) -> Result<Vec<Column>, EngineError> {
        let table = self.ctx.table(name).await?;

        Ok(table
            .schema()
            .fields()
            .iter()
            .map(|field| Column::new(field.name().clone(), field.data_type().to_string()))
            .collect())
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, EngineError> {
        let batches = self
            .ctx
            .sql_with_options(sql, Self::query_options())
            .await?
            .collect()
            .await?;

        rows_from_batches(&batches)
    }

    #[instrument(skip_all, fields(table = %table.name), err)]
    async fn register_table(&self, table: &TableDefinition) -> Result<(), EngineError> {
        let schema = arrow_schema(&table.columns);
        let batch = decode_rows(schema.clone(), &table.rows)?;
        let mem_table = MemTable::try_new(schema, vec![vec![batch]])?;

        debug!(
            "Registering table '{}' with {} rows",
            table.name,
            table.rows.len()
        );
        self.replace(&table.name, mem_table).await
    }
}

/// Arrow type for a declared column type, unknown names fall back to strings
pub fn arrow_type(declared: &str) -> DataType {
    match declared.trim().to_uppercase().as_str() {
        "INTEGER" | "BIGINT" | "INT" => DataType::Int64,
        "DOUBLE" | "FLOAT" | "REAL" | "DECIMAL" | "NUMERIC" => DataType::Float64,
        "BOOLEAN" | "BOOL" => DataType::Boolean,
        _ => DataType::Utf8,
    }
}

fn arrow_schema(columns: &[ColumnDefinition]) -> SchemaRef {
    let fields = columns
        .iter()
        .map(|column| Field::new(&column.name, arrow_type(&column.data_type), true))
        .collect::<Vec<_>>();

    Arc::new(Schema::new(fields))
}

/// Preview rows as a record batch typed by the columns `describe` reported
///
/// Column types that do not parse as arrow types fall back to [`arrow_type`].
pub fn preview_batch(columns: &[Column], rows: &[Row]) -> Result<RecordBatch, EngineError> {
    let fields = columns
        .iter()
        .map(|column| {
            let data_type = column
                .data_type
                .parse::<DataType>()
                .unwrap_or_else(|_| arrow_type(&column.data_type));
            Field::new(&column.name, data_type, true)
        })
        .collect::<Vec<_>>();

    decode_rows(Arc::new(Schema::new(fields)), rows)
}

fn decode_rows(schema: SchemaRef, rows: &[Row]) -> Result<RecordBatch, EngineError> {
    let mut decoder = ReaderBuilder::new(schema.clone())
        .with_batch_size(rows.len().max(1))
        .with_coerce_primitive(true)
        .build_decoder()?;
    decoder.serialize(rows)?;

    Ok(decoder
        .flush()?
        .unwrap_or_else(|| RecordBatch::new_empty(schema)))
}

fn rows_from_batches(batches: &[RecordBatch]) -> Result<Vec<Row>, EngineError> {
    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());

    for batch in batches {
        writer.write(batch)?;
    }
    writer.finish()?;

    let buffer = writer.into_inner();
    if buffer.is_empty() {
        return Ok(vec![]);
    }

    Ok(serde_json::from_slice(&buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn customers() -> TableDefinition {
        serde_json::from_value(json!({
            "name": "customers",
            "columns": [
                { "name": "id", "type": "INTEGER" },
                { "name": "name", "type": "VARCHAR" },
                { "name": "score", "type": "DOUBLE" },
                { "name": "active", "type": "BOOLEAN" }
            ],
            "rows": [
                [1, "Ada", 1.5, true],
                [2, "Grace", 2.5, false]
            ]
        }))
        .unwrap()
    }

    #[rstest]
    #[case("INTEGER", DataType::Int64)]
    #[case("bigint", DataType::Int64)]
    #[case("REAL", DataType::Float64)]
    #[case("numeric", DataType::Float64)]
    #[case("BOOL", DataType::Boolean)]
    #[case("VARCHAR", DataType::Utf8)]
    #[case("DATE", DataType::Utf8)]
    fn declared_types_map_to_arrow(#[case] declared: &str, #[case] expected: DataType) {
        assert_eq!(arrow_type(declared), expected);
    }

    #[tokio::test]
    async fn registered_table_can_be_described_and_queried() {
        let engine = DataFusionEngine::default();
        engine.register_table(&customers()).await.unwrap();

        let columns = engine.describe("customers").await.unwrap();
        assert_eq!(
            columns,
            vec![
                Column::new("id".to_string(), "Int64".to_string()),
                Column::new("name".to_string(), "Utf8".to_string()),
                Column::new("score".to_string(), "Float64".to_string()),
                Column::new("active".to_string(), "Boolean".to_string()),
            ]
        );

        let rows = engine
            .query("SELECT id, name FROM customers ORDER BY id")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], 1);
        assert_eq!(rows[1]["name"], "Grace");
    }

    #[test]
    fn memory_bounded_engine_builds() {
        let config = SessionConfig::try_new(10, Some(1)).unwrap();
        assert!(DataFusionEngine::try_from_config(&config).is_ok());
    }

    #[tokio::test]
    async fn create_or_replace_overwrites_previous_table() {
        let engine = DataFusionEngine::default();

        engine
            .create_or_replace_table("t", "SELECT 1 AS a")
            .await
            .unwrap();
        engine
            .create_or_replace_table("t", "SELECT 'x' AS b, 2 AS c")
            .await
            .unwrap();

        let columns = engine.describe("t").await.unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "b");
    }

    #[tokio::test]
    async fn stage_sql_must_be_a_query() {
        let engine = DataFusionEngine::default();

        let result = engine
            .create_or_replace_table("t", "CREATE TABLE other AS SELECT 1")
            .await;

        assert!(result.is_err());
        assert!(engine.describe("t").await.is_err());
    }

    #[tokio::test]
    async fn preview_batch_follows_described_types() {
        let engine = DataFusionEngine::default();
        engine.register_table(&customers()).await.unwrap();

        let columns = engine.describe("customers").await.unwrap();
        let rows = engine.query("SELECT * FROM customers").await.unwrap();
        let batch = preview_batch(&columns, &rows).unwrap();

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Int64);
        assert_eq!(batch.schema().field(3).data_type(), &DataType::Boolean);
    }

    #[test]
    fn preview_batch_falls_back_on_declared_types() {
        let columns = vec![Column::new("n".to_string(), "INTEGER".to_string())];

        let batch = preview_batch(&columns, &[]).unwrap();

        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Int64);
    }

    #[tokio::test]
    async fn empty_table_has_schema_and_no_rows() {
        let engine = DataFusionEngine::default();
        let table = TableDefinition::builder()
            .name("empty".to_string())
            .columns(vec![ColumnDefinition::new(
                "id".to_string(),
                "INTEGER".to_string(),
            )])
            .build();

        engine.register_table(&table).await.unwrap();

        assert_eq!(engine.describe("empty").await.unwrap().len(), 1);
        assert!(engine.query("SELECT * FROM empty").await.unwrap().is_empty());
    }
}
