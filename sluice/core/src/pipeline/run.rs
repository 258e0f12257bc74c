//! Flow execution logic

use std::time::Instant;

use serde::Serialize;
use sluice_schemas::{Flow, ProgressEvent, StageKind, StageType};
use tracing::{debug, instrument};

use crate::compiler::{compile, table_name_for};
use crate::materialize::{Materialization, MaterializeError};
use crate::pipeline::Result;
use crate::session::Session;
use crate::validation::validate;

/// Options of a flow run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Hand the preview of every materialized table to the progress tracker
    pub show: bool,
}

/// Import the tables of `flow` and materialize its stages in order
///
/// The first failing stage aborts the run; stages before it stay materialized in the session.
#[instrument(skip_all, err)]
pub async fn run_flow(
    session: &mut Session,
    flow: Flow,
    options: RunOptions,
) -> Result<Vec<Materialization>> {
    let start_time = Instant::now();
    debug!("Running flow ...");

    session.emit(ProgressEvent::Started);

    for table in flow.tables {
        let time = Instant::now();
        let name = table.name.clone();

        session.import_table(table).await?;

        debug!("Imported table {name} ... Elapsed time: {:.2?}", time.elapsed());
    }

    let mut materializations = Vec::with_capacity(flow.stages.len());
    for stage in flow.stages {
        let materialization = session.execute(stage).await?;

        if options.show {
            if let Some(tracker) = session.progress_tracker() {
                let table = &materialization.table;
                tracker.on_output(&table.name, &table.columns, &table.rows);
            }
        }

        materializations.push(materialization);
    }

    let total_duration = start_time.elapsed();
    debug!(
        "Finished processing flow ... Total time: {:.2?}",
        total_duration
    );

    session.emit(ProgressEvent::Completed {
        duration_ms: total_duration.as_millis() as u64,
    });

    Ok(materializations)
}

/// A stage of a flow as it would run, without touching an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStage {
    pub id: String,
    pub stage_type: StageType,

    /// Table the stage produces, or loads for `LOAD` stages
    pub table_name: String,

    /// Compiled SQL, absent for `LOAD` stages
    pub sql: Option<String>,
}

/// Validate and compile every stage of `flow` offline
///
/// Default inputs are resolved the way a fresh session would: the output of the preceding
/// stage, else the first table of the flow.
pub fn plan_flow(flow: &Flow) -> Result<Vec<PlannedStage>> {
    let first_table = flow.tables.first().map(|table| table.name.clone());
    let mut previous_output: Option<String> = None;
    let mut planned = Vec::with_capacity(flow.stages.len());

    for (pos, stage) in flow.stages.iter().enumerate() {
        validate(&stage.kind).map_err(|source| MaterializeError::Invalid {
            stage_id: stage.id.clone(),
            description: stage.description.clone(),
            source,
        })?;

        let (table_name, sql) = match &stage.kind {
            StageKind::Load(load) => (load.table_name.clone().unwrap_or_default(), None),
            kind => {
                let default_input = previous_output.as_deref().or(first_table.as_deref());
                let sql = compile(kind, default_input).map_err(|source| {
                    MaterializeError::Compile {
                        stage_id: stage.id.clone(),
                        description: stage.description.clone(),
                        source,
                    }
                })?;
                (table_name_for(pos, kind.stage_type()), Some(sql))
            }
        };

        previous_output = Some(table_name.clone());
        planned.push(PlannedStage {
            id: stage.id.clone(),
            stage_type: stage.stage_type(),
            table_name,
            sql,
        });
    }

    Ok(planned)
}
