//! Notely CLI - offline-first notes from the command line
//!
//! Every change is saved locally first and pushed to the sync server when one
//! is configured.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use cli::{Cli, Commands};
use commands::add::run_add;
use commands::common::CliPaths;
use commands::config::run_config;
use commands::delete::run_delete;
use commands::edit::{run_edit, EditArgs};
use commands::list::run_list;
use commands::show::run_show;
use commands::status::run_status;
use commands::sync::run_sync;
use error::CliError;

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
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("notely=warn".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let paths = CliPaths::resolve(cli.db_path, cli.config)?;

    match cli.command {
        Commands::Add {
            title,
            tags,
            content,
        } => run_add(&paths, title, &tags, &content).await?,
        Commands::List {
            limit,
            all,
            tag,
            json,
        } => {
            let limit = if all { None } else { Some(limit) };
            run_list(&paths, limit, tag.as_deref(), json).await?;
        }
        Commands::Show { id, json } => run_show(&paths, &id, json).await?,
        Commands::Edit {
            id,
            title,
            content,
            tags,
            clear_tags,
        } => {
            let args = EditArgs {
                title,
                content,
                tags,
                clear_tags,
            };
            run_edit(&paths, &id, args).await?;
        }
        Commands::Delete { id } => run_delete(&paths, &id).await?,
        Commands::Sync => run_sync(&paths).await?,
        Commands::Status { json } => run_status(&paths, json).await?,
        Commands::Config { command } => run_config(&paths, command)?,
    }

    Ok(())
}
