//! Flow execution
//!
//! - Flow execution through [`run_flow`], offline checks through [`plan_flow`]
//! - Progress tracking through the [`ProgressTracker`] trait

use crate::error;

pub mod progress_tracker;
pub use progress_tracker::{LoggingProgressTracker, ProgressTracker};

pub mod run;
pub use run::{plan_flow, run_flow, PlannedStage, RunOptions};

pub type Result<T> = core::result::Result<T, error::Error>;
