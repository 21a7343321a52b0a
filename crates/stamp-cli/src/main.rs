//! Stamp CLI - travel journal from the terminal
//!
//! Record entries locally and sync them with the hosted journal.

mod cli;
mod commands;
mod error;


use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands, SyncAction};
use crate::commands::add::run_add;
use crate::commands::archive::run_set_archived;
use crate::commands::common::resolve_db_path;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, EditRequest};
use crate::commands::list::run_list;
use crate::commands::sync::{
    run_pull, run_reset_pending, run_sync, run_sync_conflicts, run_sync_status,
};
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
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stamp=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Add { title, fields }) => run_add(&title, &fields, &db_path).await?,
        Some(Commands::List { limit, all, json }) => run_list(limit, all, json, &db_path).await?,
        Some(Commands::Edit {
            id,
            title,
            fields,
            clear_photo,
            clear_coordinate,
        }) => {
            let request = EditRequest {
                id: &id,
                title: title.as_deref(),
                fields: &fields,
                clear_photo,
                clear_coordinate,
            };
            run_edit(&request, &db_path).await?;
        }
        Some(Commands::Archive { id }) => run_set_archived(&id, true, &db_path).await?,
        Some(Commands::Restore { id }) => run_set_archived(&id, false, &db_path).await?,
        Some(Commands::Delete { id, local_only }) => run_delete(&id, local_only, &db_path).await?,
        Some(Commands::Sync { action }) => match action {
            None => run_sync(&db_path).await?,
            Some(SyncAction::Status) => run_sync_status(&db_path).await?,
            Some(SyncAction::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, &db_path).await?;
            }
            Some(SyncAction::ResetPending) => run_reset_pending(&db_path).await?,
            Some(SyncAction::Pull { ids }) => run_pull(&ids, &db_path).await?,
        },
        None => {
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
