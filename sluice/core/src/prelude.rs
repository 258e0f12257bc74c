//! Prelude module that exports commonly used types and functions.
//!
//! `use sluice_core::prelude::*;` brings in everything needed to run stages and flows.

pub use crate::Result;

// Session and configuration
pub use crate::config::SessionConfig;
pub use crate::session::Session;

// Tables
pub use crate::catalogue::{Catalogue, Table, TableId};

// Compilation and graph
pub use crate::compiler::{compile, table_name_for};
pub use crate::graph::{build_graph, join_output_name, DependencyGraph, GraphNode};
pub use crate::validation::{is_valid, validate};

// Execution
pub use crate::engine::{AnalyticalEngine, DataFusionEngine};
pub use crate::materialize::{
    materialize, Materialization, MaterializeOptions, PipelineContext,
};
pub use crate::pipeline::{plan_flow, run_flow, PlannedStage, RunOptions};
pub use crate::suggestions::{merge_suggestions, MergeReport, SuggestionBatch};

// Progress tracking
pub use crate::pipeline::progress_tracker::{LoggingProgressTracker, ProgressTracker};

// Flow loading
pub use crate::templating::{format_from_path, TemplateFormat, TemplateLoader};
