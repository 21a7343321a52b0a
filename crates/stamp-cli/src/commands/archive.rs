use std::path::Path;

use crate::commands::common::{normalize_entry_identifier, open_journal, resolve_entry};
use crate::error::CliError;

/// Archive (`archived = true`) or restore an entry.
pub async fn run_set_archived(id: &str, archived: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let session = open_journal(db_path).await?;
    let entry = resolve_entry(&normalized_id, &session.inner).await?;

    let updated = session.inner.set_archived(&entry.id, archived).await?;
    println!("{}", updated.id);
    Ok(())
}
