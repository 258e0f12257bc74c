use datafusion::arrow::util::pretty::pretty_format_batches;
use sluice_schemas::{Column, ProgressEvent, Row};
use tracing::{error, info, instrument, warn};

use crate::engine::preview_batch;

/// A trait for handling progress events and table previews while stages are materialized.
///
/// Implement this trait to forward progress to a UI or an external system.
///
/// # Examples
///
/// ```rust
/// use sluice_core::progress_tracker::ProgressTracker;
/// use sluice_schemas::{Column, ProgressEvent, Row};
///
/// struct StageCounter;
///
/// impl ProgressTracker for StageCounter {
///     fn on_progress(&self, event: ProgressEvent) {
///         if let ProgressEvent::StageCompleted { id, duration_ms, .. } = event {
///             println!("Stage '{id}' completed in {duration_ms}ms");
///         }
///     }
///
///     fn on_output(&self, table_name: &str, _columns: &[Column], rows: &[Row]) {
///         println!("{table_name}: {} preview rows", rows.len());
///     }
/// }
/// ```
pub trait ProgressTracker: Send + Sync {
    /// Called for every progress event
    fn on_progress(&self, event: ProgressEvent);

    /// Called with the preview of a materialized table when output was requested
    fn on_output(&self, table_name: &str, columns: &[Column], rows: &[Row]);
}

/// Progress tracker that logs events and previews using `tracing`
#[derive(Debug)]
pub struct LoggingProgressTracker;

impl ProgressTracker for LoggingProgressTracker {
    #[instrument(skip_all)]
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started => {
                info!("🚀 Flow execution started");
            }
            ProgressEvent::TableImported { name } => {
                info!("📚 Imported table: {}", name);
            }
            ProgressEvent::StageStarted {
                id,
                position,
                stage_type,
            } => {
                info!(
                    "⚙️  Processing {} stage: {} (position: {})",
                    stage_type, id, position
                );
            }
            ProgressEvent::StageCompleted {
                id,
                position: _,
                table_name,
                duration_ms,
            } => {
                info!(
                    "✅ Completed stage: {} -> {} (took: {:.2}s)",
                    id,
                    table_name,
                    duration_ms as f64 / 1000.0
                );
            }
            ProgressEvent::StageRejected { id, reason } => {
                warn!(
                    "⛔ Rejected stage {}: {}",
                    id.as_deref().unwrap_or("<no id>"),
                    reason
                );
            }
            ProgressEvent::Completed { duration_ms } => {
                info!(
                    "🎉 Flow execution completed (total time: {:.2}s)",
                    duration_ms as f64 / 1000.0
                );
            }
        }
    }

    #[instrument(skip_all)]
    fn on_output(&self, table_name: &str, columns: &[Column], rows: &[Row]) {
        let output = preview_batch(columns, rows)
            .and_then(|batch| Ok(pretty_format_batches(&[batch])?));

        match output {
            Ok(output_str) => info!(
                "\n📋 Table Data (Preview): {table_name}\n───────────────────────────────────────\n{output_str}\n"
            ),
            Err(e) => error!("❗ Failed to render the preview of {table_name}: {e}"),
        }
    }
}
