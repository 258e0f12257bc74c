//! Interactive editing session over a pipeline.
//!
//! A [`Session`] owns one analytical engine, the pipeline context and its configuration. All
//! operations take `&mut self`, so materializations of a session never overlap.

use std::{sync::Arc, time::Instant};

use sluice_schemas::{Flow, ProgressEvent, Stage, TableDefinition};
use tracing::{debug, instrument, warn};

use crate::catalogue::{Catalogue, Table, TableId};
use crate::config::SessionConfig;
use crate::engine::{AnalyticalEngine, DataFusionEngine};
use crate::graph::{build_graph, DependencyGraph};
use crate::materialize::{materialize, Materialization, MaterializeOptions, PipelineContext};
use crate::progress_tracker::ProgressTracker;
use crate::Result;

pub struct Session {
    engine: Arc<dyn AnalyticalEngine>,
    context: PipelineContext,
    config: SessionConfig,
    imported: Vec<TableDefinition>,
    progress_tracker: Option<Arc<dyn ProgressTracker>>,
}

impl Session {
    pub fn new(engine: Arc<dyn AnalyticalEngine>, config: SessionConfig) -> Self {
        Self {
            engine,
            context: PipelineContext::new(),
            config,
            imported: Vec::new(),
            progress_tracker: None,
        }
    }

    /// Session backed by a fresh in-memory DataFusion engine
    pub fn try_with_datafusion(config: SessionConfig) -> Result<Self> {
        let engine = DataFusionEngine::try_from_config(&config)?;
        Ok(Self::new(Arc::new(engine), config))
    }

    pub fn with_progress_tracker(mut self, tracker: Arc<dyn ProgressTracker>) -> Self {
        self.progress_tracker = Some(tracker);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn engine(&self) -> Arc<dyn AnalyticalEngine> {
        self.engine.clone()
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn catalogue(&self) -> &Catalogue {
        self.context.catalogue()
    }

    pub fn stages(&self) -> &[Stage] {
        self.context.stages()
    }

    /// Register a raw table in the engine and the catalogue
    #[instrument(skip_all, fields(table = %table.name), err)]
    pub async fn import_table(&mut self, table: TableDefinition) -> Result<TableId> {
        self.engine.register_table(&table).await?;

        let columns = self.engine.describe(&table.name).await?;
        let rows = self
            .engine
            .query(&format!(
                "SELECT * FROM {} LIMIT {}",
                table.name, self.config.preview_limit
            ))
            .await?;

        let id = self
            .context
            .catalogue_mut()
            .import(&table.name, columns, rows);

        self.emit(ProgressEvent::TableImported {
            name: table.name.clone(),
        });

        match self.imported.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.imported.push(table),
        }

        Ok(id)
    }

    /// Materialize a new or edited stage
    ///
    /// On failure nothing in the session changes.
    pub async fn execute(&mut self, stage: Stage) -> Result<Materialization> {
        let time = Instant::now();
        let position = self
            .context
            .position_of(&stage.id)
            .unwrap_or(self.context.stages().len());
        let id = stage.id.clone();

        self.emit(ProgressEvent::StageStarted {
            id: id.clone(),
            position,
            stage_type: stage.stage_type(),
        });

        let options = MaterializeOptions::from(&self.config);
        let materialization =
            materialize(self.engine.as_ref(), &mut self.context, stage, &options).await?;

        let elapsed = time.elapsed();
        debug!(
            "Finished stage {id} #{position} ... Elapsed time: {:.2?}",
            elapsed
        );

        self.emit(ProgressEvent::StageCompleted {
            id,
            position,
            table_name: materialization.table.name.clone(),
            duration_ms: elapsed.as_millis() as u64,
        });

        Ok(materialization)
    }

    /// Remove a stage and its table mapping, returning the removed stage
    ///
    /// Stages after it move up one position; their tables are renamed on their next
    /// execution.
    pub fn remove_stage(&mut self, stage_id: &str) -> Option<Stage> {
        let invalidated = self.graph().downstream(stage_id);
        let removed = self.context.remove_stage(stage_id)?;

        if !invalidated.is_empty() {
            warn!("Removed stage {stage_id}, stages reading its output: {invalidated:?}");
        }

        Some(removed)
    }

    pub fn set_active_table(&mut self, id: TableId) -> Result<()> {
        self.context.catalogue_mut().set_active(id)?;
        Ok(())
    }

    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.context.catalogue().get(id)
    }

    pub fn table_for_stage(&self, stage_id: &str) -> Option<&Table> {
        self.context.catalogue().table_for_stage(stage_id)
    }

    /// Dependency graph over the current stage list
    pub fn graph(&self) -> DependencyGraph {
        build_graph(self.context.stages())
    }

    /// Interchange copy of the session: the imported tables and the renumbered stages
    pub fn export(&self) -> Flow {
        Flow::builder()
            .tables(self.imported.clone())
            .stages(self.context.stages().to_vec())
            .build()
            .export()
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        if let Some(tracker) = &self.progress_tracker {
            tracker.on_progress(event);
        }
    }

    pub(crate) fn progress_tracker(&self) -> Option<&Arc<dyn ProgressTracker>> {
        self.progress_tracker.as_ref()
    }
}
