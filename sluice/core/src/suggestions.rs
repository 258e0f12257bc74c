//! Merging of stages proposed by an external suggestion service.
//!
//! Suggestions are untrusted input. Raw tables are imported first, then every candidate stage
//! is validated; invalid candidates are dropped and reported, never patched up.

use serde::{Deserialize, Serialize};
use sluice_schemas::{CandidateStage, ProgressEvent, TableDefinition};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::catalogue::TableId;
use crate::error::Error;
use crate::materialize::Materialization;
use crate::session::Session;
use crate::validation::{validate, ValidationError};
use crate::Result;

/// What a suggestion service returns for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionBatch {
    #[serde(default)]
    pub stages: Vec<CandidateStage>,

    /// Raw tables the stages may read, imported before any stage runs
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
}

/// A candidate that did not pass validation
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedCandidate {
    /// Id the candidate came with, if any
    pub id: Option<String>,
    pub reason: ValidationError,
}

/// Outcome of [`merge_suggestions`]
#[derive(Debug, Default)]
pub struct MergeReport {
    pub imported: Vec<TableId>,
    pub accepted: Vec<Materialization>,
    pub rejected: Vec<RejectedCandidate>,

    /// Valid candidates the engine failed to run, by stage id
    pub failed: Vec<(String, Error)>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.failed.is_empty()
    }
}

/// Import the suggested tables and materialize the valid candidates in order
///
/// Candidates without an id get a fresh UUID. A failing table import aborts the merge; a
/// failing stage only drops that stage.
#[instrument(skip_all, fields(stages = batch.stages.len(), tables = batch.tables.len()), err)]
pub async fn merge_suggestions(
    session: &mut Session,
    batch: SuggestionBatch,
) -> Result<MergeReport> {
    let mut report = MergeReport::default();

    for table in batch.tables {
        report.imported.push(session.import_table(table).await?);
    }

    for candidate in batch.stages {
        let original_id = candidate.id.clone();
        let stage = candidate.into_stage(|| Uuid::new_v4().to_string());

        if let Err(reason) = validate(&stage.kind) {
            warn!("Dropping suggested stage {}: {reason}", stage.id);
            session.emit(ProgressEvent::StageRejected {
                id: original_id.clone(),
                reason: reason.to_string(),
            });
            report.rejected.push(RejectedCandidate {
                id: original_id,
                reason,
            });
            continue;
        }

        let stage_id = stage.id.clone();
        match session.execute(stage).await {
            Ok(materialization) => report.accepted.push(materialization),
            Err(error) => {
                warn!("Suggested stage {stage_id} failed: {error}");
                report.failed.push((stage_id, error));
            }
        }
    }

    Ok(report)
}
