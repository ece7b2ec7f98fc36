use crate::{
    commands::{Commands, RunArgs},
    error::CliError,
    shutdown::{ExitCode, RunInterrupt},
};
use clap::Parser;
use connectors::adapter::SourceKind;
use engine_config::{
    env::EnvManager,
    settings::{Overrides, SyncConfig},
};
use engine_runtime::executor::Executor;
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod shutdown;

const DEFAULT_ENV_FILE: &str = ".env";

#[derive(Parser, Debug)]
#[command(
    name = "matsync",
    version,
    about = "Incremental ingestion of materials databases"
)]
struct Cli {
    #[arg(long, global = true, help = "Process units one at a time, log at debug level")]
    debug: bool,

    #[arg(long, global = true, help = "Read settings from this file instead of ./.env")]
    env_file: Option<PathBuf>,

    /// Source to work on: optimade or jsonl
    source: SourceKind,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let interrupt = RunInterrupt::new(CancellationToken::new());
    interrupt.listen();

    let outcome = run(cli, interrupt.cancel_token()).await;
    let code = ExitCode::for_outcome(&outcome, interrupt.received());
    if let Err(err) = &outcome {
        match code {
            ExitCode::Interrupted => warn!("Stopped before completion: {}", err),
            _ => error!("{}", err),
        }
    }

    std::process::exit(code.as_i32());
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<(), CliError> {
    let config = load_config(&cli)?;
    let executor = Executor::new(config.upsert_chunk, cancel);

    match cli.command {
        Commands::Fetch(_) => {
            executor.fetch(cli.source, Arc::new(config)).await?;
        }
        Commands::Transform(_) => {
            executor.transform(cli.source, Arc::new(config)).await?;
        }
        Commands::Status { json } => {
            let rows = executor.status(&config).await?;
            if json {
                output::print_status_json(&rows)?;
            } else {
                output::print_status_table(&rows);
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<SyncConfig, CliError> {
    let mut env = EnvManager::from_process();
    match &cli.env_file {
        Some(path) => env.load_from_file(path)?,
        None => {
            let default = PathBuf::from(DEFAULT_ENV_FILE);
            if default.is_file() {
                env.load_from_file(&default)?;
            }
        }
    }

    let overrides = match &cli.command {
        Commands::Fetch(args) | Commands::Transform(args) => overrides(args, cli.debug),
        Commands::Status { .. } => Overrides::default(),
    };

    let config = SyncConfig::from_env(cli.source.as_str(), &env, &overrides)?;
    info!(
        "Source {}: store {}, table {}, {} workers, batch size {}",
        config.source, config.store, config.table_name, config.workers, config.batch_size
    );
    Ok(config)
}

fn overrides(args: &RunArgs, debug: bool) -> Overrides {
    Overrides {
        workers: args.workers,
        batch_size: args.batch_size,
        offset: args.offset,
        debug,
        table_name: args.table_name.clone(),
        dest_table_name: args.dest_table_name.clone(),
    }
}
