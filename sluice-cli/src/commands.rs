use std::{collections::HashMap, path::PathBuf, sync::Arc};

use miette::{IntoDiagnostic, Result};
use sluice::prelude::*;
use tracing::{debug, info};

fn load_flow(file: &PathBuf, params: HashMap<String, String>) -> Result<Flow> {
    debug!("Parsing flow from file: {}", file.display());

    let format = format_from_path(file);
    let flow = Flow::from_file(file, format, params)?;

    Ok(flow)
}

pub async fn run(
    file: PathBuf,
    params: HashMap<String, String>,
    preview_limit: usize,
    max_memory_gb: Option<usize>,
    show: bool,
) -> Result<()> {
    info!("Running flow from file: {}", file.display());

    let flow = load_flow(&file, params)?;
    let config = SessionConfig::try_new(preview_limit, max_memory_gb)?;

    debug!("Creating session");
    let mut session = Session::try_with_datafusion(config)?
        .with_progress_tracker(Arc::new(LoggingProgressTracker));

    run_flow(&mut session, flow, RunOptions { show }).await?;

    debug!("Flow execution completed successfully");
    Ok(())
}

pub fn check(file: PathBuf, params: HashMap<String, String>) -> Result<()> {
    let flow = load_flow(&file, params)?;
    let planned = plan_flow(&flow)?;

    for stage in &planned {
        match &stage.sql {
            Some(sql) => println!(
                "{} [{}] -> {}\n  {sql}",
                stage.id, stage.stage_type, stage.table_name
            ),
            None => println!("{} [{}] -> {}", stage.id, stage.stage_type, stage.table_name),
        }
    }

    info!("✅ {} stages are valid", planned.len());
    Ok(())
}

pub fn graph(file: PathBuf, params: HashMap<String, String>) -> Result<()> {
    let flow = load_flow(&file, params)?;
    let graph = build_graph(&flow.stages);

    println!("{}", serde_json::to_string_pretty(&graph).into_diagnostic()?);
    Ok(())
}

pub fn export(
    file: PathBuf,
    params: HashMap<String, String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let flow = load_flow(&file, params)?;
    let exported = flow.export().to_json_pretty().into_diagnostic()?;

    match output {
        Some(path) => {
            std::fs::write(&path, exported).into_diagnostic()?;
            info!("📦 Exported {} stages to {}", flow.stages.len(), path.display());
        }
        None => println!("{exported}"),
    }

    Ok(())
}
