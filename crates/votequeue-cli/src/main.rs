//! votequeue CLI - cast votes that survive losing the network
//!
//! Votes that cannot reach the ledger are kept in a local queue and replayed
//! once the gateway is reachable again.

mod cli;
mod commands;
mod config_profiles;
mod error;
mod signer;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::cast::{run_cast, run_enqueue};
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::discard::run_discard;
use crate::commands::list::{run_list, run_show};
use crate::commands::purge::run_purge;
use crate::commands::receipts::run_receipts;
use crate::commands::signer::run_signer;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "votequeue=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Cast { ballot, json } => {
            run_cast(&ballot, json, &db_path, profile, cli.offline).await?;
        }
        Commands::Enqueue { ballot, json } => run_enqueue(&ballot, json, &db_path).await?,
        Commands::List { status, json } => {
            run_list(status.map(Into::into), json, &db_path).await?;
        }
        Commands::Show { id, json } => run_show(&id, json, &db_path).await?,
        Commands::Status { json } => run_status(json, &db_path).await?,
        Commands::Sync { json } => run_sync(json, &db_path, profile, cli.offline).await?,
        Commands::Watch => run_watch(&db_path, profile, cli.offline).await?,
        Commands::Purge => run_purge(&db_path).await?,
        Commands::Discard { id } => run_discard(&id, &db_path).await?,
        Commands::Receipts { limit, json } => run_receipts(limit, json, &db_path).await?,
        Commands::Config { command } => run_config(command, profile)?,
        Commands::Signer { command } => run_signer(command, profile)?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
