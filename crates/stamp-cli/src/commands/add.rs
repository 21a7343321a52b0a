use std::path::Path;

use stamp_core::models::EntryDraft;

use crate::cli::EntryFields;
use crate::commands::common::{
    normalize_title, open_journal, parse_coordinate, parse_event_date, read_photo, resolve_notes,
};
use crate::error::CliError;

pub async fn run_add(
    title_parts: &[String],
    fields: &EntryFields,
    db_path: &Path,
) -> Result<(), CliError> {
    let title = normalize_title(title_parts)?;
    let draft = EntryDraft {
        title,
        location: fields.location.as_deref().unwrap_or_default().trim().to_string(),
        notes: resolve_notes(fields)?,
        date: fields.date.as_deref().map(parse_event_date).transpose()?,
        photo: fields.photo.as_deref().map(read_photo).transpose()?,
        coordinate: parse_coordinate(fields.latitude, fields.longitude)?,
    };

    let session = open_journal(db_path).await?;
    let entry = session.inner.create(draft).await?;

    println!("{}", entry.id);
    Ok(())
}
