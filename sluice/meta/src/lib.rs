//! Sluice - build tabular transformations from composable SQL stages
//!
//! This crate is a meta-package that re-exports the most commonly used
//! types and functions of the Sluice crates.
//!
//! # Features
//!
//! - **core**: Stage compiler, graph and materialization (enabled by default)
//! - **yaml**: YAML flow files (enabled by default)
//! - **json**: JSON flow files
//!
//! # Examples
//!
//! ```no_run
//! use sluice::prelude::*;
//!
//! # async fn run() -> sluice::Result<()> {
//! let flow = Flow::builder()
//!     .stages(vec![Stage::new(
//!         "numbers",
//!         StageKind::Custom(CustomStage {
//!             sql: Some("SELECT 1 AS n".to_string()),
//!         }),
//!     )])
//!     .build();
//!
//! let mut session = Session::try_with_datafusion(SessionConfig::default())?;
//! let materializations = run_flow(&mut session, flow, RunOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

// Re-exports from schemas
pub use sluice_schemas::{
    self as schemas, Flow, ProgressEvent, Stage, StageKind, StageType, TableDefinition,
};

// Re-exports from core
#[cfg(feature = "core")]
pub use sluice_core::{self as core, prelude as core_prelude};

#[cfg(feature = "core")]
pub use sluice_core::{
    error,
    pipeline::progress_tracker::{LoggingProgressTracker, ProgressTracker},
    pipeline::{plan_flow, run_flow, RunOptions},
    session::Session,
    Result,
};

/// Prelude module that exports commonly used types and functions.
///
/// `use sluice::prelude::*;` brings in the stage definitions and everything needed to run them.
pub mod prelude {
    pub use sluice_schemas::*;

    #[cfg(feature = "core")]
    pub use sluice_core::prelude::*;
}

/// A simpler API for common use cases
#[cfg(feature = "core")]
pub mod api {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;

    use sluice_core::prelude::*;

    /// Load a flow file and run it in a fresh DataFusion session
    ///
    /// The file format is determined by the file extension. The session is returned so its
    /// catalogue and stages can be inspected afterwards.
    pub async fn run_flow_from_file<P: AsRef<Path>>(
        path: P,
        params: HashMap<String, String>,
        config: SessionConfig,
    ) -> sluice_core::Result<Session> {
        let path = path.as_ref();
        let flow = sluice_schemas::Flow::from_file(path, format_from_path(path), params)?;

        let mut session = Session::try_with_datafusion(config)?
            .with_progress_tracker(Arc::new(LoggingProgressTracker));
        run_flow(&mut session, flow, RunOptions::default()).await?;

        Ok(session)
    }
}
