use std::path::Path;

use stamp_core::sync::SyncOutcome;
use stamp_core::{EntryId, SyncSettings};

use crate::commands::common::{
    format_sync_conflict_lines, format_sync_timestamp, open_engine, open_journal,
    sync_conflict_to_item, SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let session = open_engine(db_path).await?;

    match session.inner.perform_sync().await? {
        SyncOutcome::Completed(report) => {
            println!(
                "Sync completed: {} downloaded ({} applied, {} skipped, {} kept local, {} conflicts), {} uploaded",
                report.downloaded,
                report.applied,
                report.skipped,
                report.kept_local,
                report.conflicts,
                report.uploaded
            );
            if report.pruned > 0 {
                println!("Dropped {} pending ids for deleted entries", report.pruned);
            }
        }
        SyncOutcome::AlreadyRunning => println!("Sync already in progress"),
    }
    Ok(())
}

pub async fn run_sync_status(db_path: &Path) -> Result<(), CliError> {
    let configured = SyncSettings::from_env()?.is_some();
    let session = open_journal(db_path).await?;
    let checkpoint = session.inner.checkpoint().await?;

    println!(
        "Remote:     {}",
        if configured { "configured" } else { "not configured" }
    );
    if checkpoint.last_sync_at == 0 {
        println!("Last sync:  never");
    } else {
        println!("Last sync:  {}", format_sync_timestamp(checkpoint.last_sync_at));
    }
    if checkpoint.remote_cursor > 0 {
        println!(
            "Cursor:     {} (server clock)",
            format_sync_timestamp(checkpoint.remote_cursor)
        );
    }
    println!("Pending:    {}", checkpoint.pending.len());
    for id in &checkpoint.pending {
        println!("  {id}");
    }
    Ok(())
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let session = open_journal(db_path).await?;
    let conflicts = session.inner.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_reset_pending(db_path: &Path) -> Result<(), CliError> {
    let session = open_journal(db_path).await?;
    let count = session.inner.pending().snapshot().await.len();
    session.inner.clear_pending_changes().await?;
    println!("Cleared {count} pending changes");
    Ok(())
}

pub async fn run_pull(ids: &[String], db_path: &Path) -> Result<(), CliError> {
    let ids = parse_entry_ids(ids)?;
    let session = open_engine(db_path).await?;
    let report = session.inner.pull_entries(&ids).await?;
    println!(
        "Pulled {} of {} requested entries ({} skipped)",
        report.applied,
        ids.len(),
        report.skipped
    );
    Ok(())
}

pub fn parse_entry_ids(ids: &[String]) -> Result<Vec<EntryId>, CliError> {
    ids.iter()
        .map(|id| {
            id.parse::<EntryId>()
                .map_err(|_| CliError::InvalidEntryId(id.trim().to_string()))
        })
        .collect()
}
