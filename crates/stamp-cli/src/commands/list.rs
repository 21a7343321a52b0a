use std::path::Path;

use crate::commands::common::{
    entry_to_list_item, format_entry_lines, open_journal, EntryListItem,
};
use crate::error::CliError;

pub async fn run_list(
    limit: usize,
    include_archived: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let session = open_journal(db_path).await?;
    let mut entries = session.inner.list(include_archived).await?;
    entries.truncate(limit);

    if as_json {
        let json_items = entries
            .iter()
            .map(entry_to_list_item)
            .collect::<Vec<EntryListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_entry_lines(&entries) {
            println!("{line}");
        }
    }

    Ok(())
}
