//! Materialization of stages into engine tables.
//!
//! [`materialize`] validates a stage, resolves the table it reads by default, compiles it,
//! runs the SQL and only then records the result. Any failure leaves the catalogue, the
//! stage to table map and the stage list exactly as they were.

use miette::Diagnostic;
use sluice_schemas::{Stage, StageKind};
use tracing::{debug, instrument};

use crate::catalogue::{Catalogue, Table};
use crate::compiler::{compile, table_name_for, CompileError};
use crate::config::{SessionConfig, DEFAULT_PREVIEW_LIMIT};
use crate::engine::{AnalyticalEngine, EngineError};
use crate::validation::{validate, ValidationError};

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum MaterializeError {
    #[error("Stage {} is incomplete", label(.stage_id, .description))]
    #[diagnostic(code(sluice::materialize::invalid_stage))]
    Invalid {
        stage_id: String,
        description: String,
        #[source]
        #[diagnostic_source]
        source: ValidationError,
    },

    #[error("Stage {} could not be compiled", label(.stage_id, .description))]
    #[diagnostic(code(sluice::materialize::compile))]
    Compile {
        stage_id: String,
        description: String,
        #[source]
        #[diagnostic_source]
        source: CompileError,
    },

    #[error("Stage {} failed to execute: {source}", label(.stage_id, .description))]
    #[diagnostic(
        code(sluice::materialize::execution),
        help("Check the column and table names used by the stage")
    )]
    Execution {
        stage_id: String,
        description: String,
        #[source]
        source: EngineError,
    },

    #[error("Cannot resolve the input of stage {}: {reason}", label(.stage_id, .description))]
    #[diagnostic(
        code(sluice::materialize::resolution),
        help("Set the stage's table explicitly or import a table first")
    )]
    Resolution {
        stage_id: String,
        description: String,
        reason: String,
    },
}

impl MaterializeError {
    /// Id of the stage that failed
    pub fn stage_id(&self) -> &str {
        match self {
            MaterializeError::Invalid { stage_id, .. }
            | MaterializeError::Compile { stage_id, .. }
            | MaterializeError::Execution { stage_id, .. }
            | MaterializeError::Resolution { stage_id, .. } => stage_id,
        }
    }
}

fn label(stage_id: &str, description: &str) -> String {
    if description.is_empty() {
        format!("'{stage_id}'")
    } else {
        format!("'{stage_id}' ({description})")
    }
}

/// Options of a single materialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_new::new)]
pub struct MaterializeOptions {
    /// Number of rows fetched as preview of the result
    pub preview_limit: usize,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_LIMIT)
    }
}

impl From<&SessionConfig> for MaterializeOptions {
    fn from(config: &SessionConfig) -> Self {
        Self::new(config.preview_limit)
    }
}

/// Result of a successful materialization
#[derive(Debug, Clone, PartialEq)]
pub struct Materialization {
    /// The table now mapped to the stage
    pub table: Table,

    /// The stage already had a table, which was updated in place
    pub mapping_updated: bool,

    /// Position of the stage in the ordered stage list
    pub position: usize,
}

/// Ordered stages and the tables they produced
#[derive(Debug, Default)]
pub struct PipelineContext {
    catalogue: Catalogue,
    stages: Vec<Stage>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub(crate) fn catalogue_mut(&mut self) -> &mut Catalogue {
        &mut self.catalogue
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, stage_id: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.id == stage_id)
    }

    pub fn position_of(&self, stage_id: &str) -> Option<usize> {
        self.stages.iter().position(|stage| stage.id == stage_id)
    }

    /// Remove a stage and forget its table mapping
    pub(crate) fn remove_stage(&mut self, stage_id: &str) -> Option<Stage> {
        let position = self.position_of(stage_id)?;
        self.catalogue.unmap_stage(stage_id);

        Some(self.stages.remove(position))
    }

    /// Table a stage at `position` reads when it names none itself
    ///
    /// The output of the preceding stage first, then the active table, then the first table.
    pub fn default_input(&self, position: usize) -> Option<&Table> {
        position
            .checked_sub(1)
            .and_then(|previous| self.stages.get(previous))
            .and_then(|previous| self.catalogue.table_for_stage(&previous.id))
            .or_else(|| self.catalogue.active())
            .or_else(|| self.catalogue.first())
    }

    fn place_stage(&mut self, position: usize, stage: Stage) {
        match self.stages.get_mut(position) {
            Some(existing) => *existing = stage,
            None => self.stages.push(stage),
        }
    }
}

/// Materialize `stage` into the engine and record its table in `context`
///
/// A stage already in the list is re-run in place and keeps its table id; a new stage is
/// appended. `LOAD` stages are not executed, they map the loaded table onto the stage.
#[instrument(skip_all, fields(stage = %stage.id, stage_type = %stage.stage_type()), err)]
pub async fn materialize<E>(
    engine: &E,
    context: &mut PipelineContext,
    stage: Stage,
    options: &MaterializeOptions,
) -> Result<Materialization, MaterializeError>
where
    E: AnalyticalEngine + ?Sized,
{
    validate(&stage.kind).map_err(|source| MaterializeError::Invalid {
        stage_id: stage.id.clone(),
        description: stage.description.clone(),
        source,
    })?;

    let position = context
        .position_of(&stage.id)
        .unwrap_or(context.stages.len());

    if matches!(stage.kind, StageKind::Load(_)) {
        return load_stage(context, stage, position);
    }

    let default_input = match stage.kind.explicit_table() {
        None if stage.kind.takes_implicit_input() => {
            let table = context.default_input(position).ok_or_else(|| {
                MaterializeError::Resolution {
                    stage_id: stage.id.clone(),
                    description: stage.description.clone(),
                    reason: "no table available to read from".to_string(),
                }
            })?;
            Some(table.name.clone())
        }
        _ => None,
    };

    let sql = compile(&stage.kind, default_input.as_deref()).map_err(|source| {
        MaterializeError::Compile {
            stage_id: stage.id.clone(),
            description: stage.description.clone(),
            source,
        }
    })?;

    let name = table_name_for(position, stage.stage_type());
    debug!("Stage '{}' at position {position} -> {name}", stage.id);

    let execution_error = |source| MaterializeError::Execution {
        stage_id: stage.id.clone(),
        description: stage.description.clone(),
        source,
    };

    engine
        .create_or_replace_table(&name, &sql)
        .await
        .map_err(execution_error)?;
    let columns = engine.describe(&name).await.map_err(execution_error)?;
    let rows = engine
        .query(&format!("SELECT * FROM {name} LIMIT {}", options.preview_limit))
        .await
        .map_err(execution_error)?;

    // nothing below may fail
    let commit = context
        .catalogue
        .commit_stage(&stage.id, name, columns, rows);
    context.place_stage(position, stage);

    Ok(Materialization {
        table: commit.table,
        mapping_updated: commit.mapping_updated,
        position,
    })
}

fn load_stage(
    context: &mut PipelineContext,
    stage: Stage,
    position: usize,
) -> Result<Materialization, MaterializeError> {
    let resolution_error = |reason: String| MaterializeError::Resolution {
        stage_id: stage.id.clone(),
        description: stage.description.clone(),
        reason,
    };

    let table_name = match &stage.kind {
        StageKind::Load(load) => load.table_name.as_deref(),
        _ => None,
    };
    let table_name = table_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| resolution_error("LOAD stage names no table".to_string()))?;
    let table = context
        .catalogue
        .by_name(table_name)
        .cloned()
        .ok_or_else(|| resolution_error(format!("table '{table_name}' has not been imported")))?;

    let mapping_updated = context
        .catalogue
        .map_stage(&stage.id, table.id)
        .map_err(|e| resolution_error(e.to_string()))?;
    context.place_stage(position, stage);

    Ok(Materialization {
        table,
        mapping_updated,
        position,
    })
}
