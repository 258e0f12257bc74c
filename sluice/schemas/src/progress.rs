//! Progress event types for tracking flow execution

use serde::{Deserialize, Serialize};

use crate::stages::StageType;

/// Progress events emitted while a flow or a batch of suggested stages is materialized
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Execution started
    Started,
    /// A raw table has been imported into the engine
    TableImported {
        /// Name of the table
        name: String,
    },
    /// A stage has started materializing
    StageStarted {
        /// Id of the stage
        id: String,
        /// Position in the ordered stage list
        position: usize,
        /// Type of the stage
        stage_type: StageType,
    },
    /// A stage has been materialized
    StageCompleted {
        /// Id of the stage
        id: String,
        /// Position in the ordered stage list
        position: usize,
        /// Name of the table the stage produced
        table_name: String,
        /// Duration of the materialization
        duration_ms: u64,
    },
    /// A candidate stage failed validation and was dropped
    StageRejected {
        /// Id of the candidate, if it had one
        id: Option<String>,
        /// Why the candidate was dropped
        reason: String,
    },
    /// Execution completed
    Completed {
        /// Total duration
        duration_ms: u64,
    },
}
