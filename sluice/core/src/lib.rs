//! # Sluice Core
//!
//! Turns declarative stages into materialized tables.
//!
//! - [`validation`] gates incomplete stages
//! - [`compiler`] emits the SQL of a stage
//! - [`graph`] infers how stages connect through the tables they read
//! - [`materialize`] runs a stage against an [`engine::AnalyticalEngine`] and records its table
//! - [`session`] ties an engine, the stage list and the table catalogue together
//!
//! ## Example
//!
//! ```rust,no_run
//! use sluice_core::prelude::*;
//! use sluice_schemas::{Stage, StageKind, SelectStage, TableDefinition};
//!
//! # async fn example() -> sluice_core::Result<()> {
//! let mut session = Session::try_with_datafusion(SessionConfig::default())?;
//!
//! let customers: TableDefinition = serde_json::from_str(
//!     r#"{ "name": "customers", "columns": ["id", "name"], "rows": [[1, "Ada"]] }"#,
//! )
//! .expect("valid table");
//! session.import_table(customers).await?;
//!
//! let stage = Stage::new(
//!     "names",
//!     StageKind::Select(SelectStage {
//!         table: Some("customers".to_string()),
//!         columns: vec!["name".to_string()],
//!     }),
//! );
//! let materialization = session.execute(stage).await?;
//! assert_eq!(materialization.table.name, "result_stage_0_select");
//! # Ok(())
//! # }
//! ```

pub mod catalogue;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod materialize;
pub mod pipeline;
pub mod prelude;
pub mod session;
pub mod suggestions;
pub mod templating;
pub mod validation;

pub use pipeline::progress_tracker;
pub use pipeline::{plan_flow, run_flow};

pub type Result<T> = core::result::Result<T, error::Error>;
