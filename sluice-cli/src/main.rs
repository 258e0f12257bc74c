use std::{collections::HashMap, error::Error, path::PathBuf, str::FromStr};

use clap::{Parser, Subcommand};
use miette::Result;
use sluice::core::config::DEFAULT_PREVIEW_LIMIT;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

/// Sluice CLI for checking and running flows of SQL stages
#[derive(Debug, Parser)]
#[command(name = "sluice", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Logging level (info, debug, trace)
    #[arg(long, env = "SLUICE_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a flow, materializing every stage in memory
    Run {
        #[command(flatten)]
        flow: FlowArgs,

        /// Maximum number of rows kept in each table preview
        #[arg(long, env = "SLUICE_PREVIEW_LIMIT", default_value_t = DEFAULT_PREVIEW_LIMIT)]
        preview_limit: usize,

        /// Maximum memory usage in GB (optional)
        #[arg(long, env = "SLUICE_MAX_MEMORY")]
        max_memory_gb: Option<usize>,

        /// Print the preview of every materialized table
        #[arg(long)]
        show: bool,
    },

    /// Validate a flow and print the SQL of every stage without running it
    Check {
        #[command(flatten)]
        flow: FlowArgs,
    },

    /// Print the dependency graph of the stages of a flow as JSON
    Graph {
        #[command(flatten)]
        flow: FlowArgs,
    },

    /// Write the flow in interchange form, stage ids renumbered to stage_1, stage_2, ...
    Export {
        #[command(flatten)]
        flow: FlowArgs,

        /// Output path, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, clap::Args)]
struct FlowArgs {
    /// Path to the flow file (.yml, .yaml or .json)
    #[arg(short, long)]
    file: PathBuf,

    /// k=v list of parameters to pass to the flow file
    /// e.g. sluice run -f flow.yml -p key1=value1 -p key2=value2
    #[arg(short, long, value_parser = parse_key_val::<String, String>)]
    params: Option<Vec<(String, String)>>,
}

impl FlowArgs {
    fn params(&self) -> HashMap<String, String> {
        self.params.clone().unwrap_or_default().into_iter().collect()
    }
}

fn parse_key_val<T, U>(s: &str) -> Result<(T, U), Box<dyn Error + Send + Sync + 'static>>
where
    T: FromStr,
    T::Err: Error + Send + Sync + 'static,
    U: FromStr,
    U::Err: Error + Send + Sync + 'static,
{
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = Level::from_str(cli.log_level.to_lowercase().as_str()).unwrap_or(Level::INFO);
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    match cli.command {
        Commands::Run {
            flow,
            preview_limit,
            max_memory_gb,
            show,
        } => {
            let params = flow.params();
            commands::run(flow.file, params, preview_limit, max_memory_gb, show).await?;
        }
        Commands::Check { flow } => {
            let params = flow.params();
            commands::check(flow.file, params)?;
        }
        Commands::Graph { flow } => {
            let params = flow.params();
            commands::graph(flow.file, params)?;
        }
        Commands::Export { flow, output } => {
            let params = flow.params();
            commands::export(flow.file, params, output)?;
        }
    }

    Ok(())
}
