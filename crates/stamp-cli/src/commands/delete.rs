use std::path::Path;

use crate::commands::common::{
    normalize_entry_identifier, open_engine, open_journal, resolve_entry,
};
use crate::error::CliError;

pub async fn run_delete(id: &str, local_only: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;

    if local_only {
        let session = open_journal(db_path).await?;
        let entry = resolve_entry(&normalized_id, &session.inner).await?;
        session.inner.delete_local(&entry.id).await?;
        println!("{}", entry.id);
        return Ok(());
    }

    let session = open_engine(db_path).await?;
    let engine = &session.inner;
    let entry = resolve_entry(&normalized_id, engine.journal()).await?;
    engine.delete_entry(&entry.id).await?;
    println!("{}", entry.id);
    Ok(())
}
