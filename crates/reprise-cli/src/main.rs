//! Reprise CLI - video bookmarks and resume positions from the terminal
//!
//! Derives resource keys, edits the local bookmark store and syncs it with
//! the configured remote blob.

mod cli;
mod commands;
mod error;

use clap::{CommandFactory, Parser};
use tracing_subscriber::filter::LevelFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::clear::run_clear;
use crate::commands::common::{load_engine_config, resolve_config_path, resolve_db_path};
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::export::run_export;
use crate::commands::import::run_import;
use crate::commands::key::run_key;
use crate::commands::list::run_list;
use crate::commands::position::run_position;
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

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_log_directive()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    if let Commands::Completions { shell, output } = &command {
        return run_completions(*shell, output.as_deref());
    }

    let db_path = resolve_db_path(cli.db_path);
    let config = load_engine_config(&resolve_config_path(cli.config))?;

    match command {
        Commands::Key(args) => run_key(&args, &config)?,
        Commands::Add {
            key,
            position,
            label,
            color,
            resource,
        } => run_add(
            &key,
            &position,
            &label,
            color.as_deref(),
            &resource,
            &db_path,
            &config,
        )?,
        Commands::Position {
            key,
            position,
            resource,
        } => run_position(&key, &position, &resource, &db_path, &config)?,
        Commands::List { key, json } => run_list(key.as_deref(), json, &db_path, &config)?,
        Commands::Delete { key, target } => run_delete(&key, &target, &db_path, &config)?,
        Commands::Export { format, output } => {
            run_export(format, output.as_deref(), &db_path, &config)?;
        }
        Commands::Import { path } => run_import(path.as_deref(), &db_path, &config)?,
        Commands::Clear { yes } => run_clear(yes, &db_path, &config)?,
        Commands::Sync => run_sync(&db_path, &config).await?,
        Commands::Watch { playing, positions } => {
            run_watch(playing, positions, &db_path, &config).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn default_log_directive() -> tracing_subscriber::filter::Directive {
    "reprise=info"
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into())
}

#[cfg(test)]
mod tests;
