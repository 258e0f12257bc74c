//! # Sluice Schemas
//!
//! This crate contains the serializable definitions shared across the sluice workspace:
//! stages and their payloads, raw table definitions, flows (the persisted form of a
//! pipeline) and progress events. Keeping them here lets the core engine, the CLI and any
//! suggestion service agree on one wire format.

use bon::Builder;
use serde::{Deserialize, Serialize};

pub mod progress;
pub mod stages;
pub mod tables;

mod serde_helpers;

pub use progress::ProgressEvent;
pub use stages::{
    export_stages, Aggregation, AggregateStage, CandidateStage, CustomStage, FilterCondition,
    FilterStage, GroupStage, JoinStage, JoinType, LoadStage, Logic, SelectStage, SortDirection,
    SortKey, SortStage, Stage, StageKind, StageType, UnionStage, UnionType,
};
pub use tables::{Column, ColumnDefinition, Row, TableDefinition};

fn current_version() -> String {
    "v1".to_string()
}

/// A saved pipeline: the raw tables it starts from and its ordered stages.
///
/// Flows are what gets written to disk, shared between users and produced by the
/// suggestion service when it proposes a whole pipeline at once.
///
/// # Examples
///
/// ```
/// use sluice_schemas::{Flow, LoadStage, Stage, StageKind, TableDefinition};
///
/// let flow = Flow::builder()
///     .tables(vec![TableDefinition::builder().name("customers".to_string()).build()])
///     .stages(vec![Stage::new(
///         "load_customers",
///         StageKind::Load(LoadStage::new(Some("customers".to_string()))),
///     )])
///     .build();
///
/// assert_eq!(flow.version, "v1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "snake_case")]
pub struct Flow {
    /// Schema version for migration compatibility
    #[serde(default = "current_version")]
    #[builder(default = current_version())]
    pub version: String,

    /// Raw tables that are registered before any stage runs
    #[serde(default)]
    #[builder(default)]
    pub tables: Vec<TableDefinition>,

    /// Ordered list of stages; a stage's position determines the name of its result table
    #[serde(default)]
    #[builder(default)]
    pub stages: Vec<Stage>,
}

impl Flow {
    /// Interchange copy of this flow with stage ids renumbered to `stage_1, stage_2, ...`
    pub fn export(&self) -> Self {
        Self {
            version: self.version.clone(),
            tables: self.tables.clone(),
            stages: export_stages(&self.stages),
        }
    }

    /// Pretty printed JSON rendering
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
