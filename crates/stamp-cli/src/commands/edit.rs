use std::path::Path;

use crate::cli::EntryFields;
use crate::commands::common::{
    capture_editor_input_with_initial, normalize_entry_identifier, open_journal, parse_coordinate,
    parse_event_date, read_photo, resolve_entry,
};
use crate::error::CliError;

pub struct EditRequest<'a> {
    pub id: &'a str,
    pub title: Option<&'a str>,
    pub fields: &'a EntryFields,
    pub clear_photo: bool,
    pub clear_coordinate: bool,
}

impl EditRequest<'_> {
    const fn has_changes(&self) -> bool {
        self.title.is_some() || !self.fields.is_empty() || self.clear_photo || self.clear_coordinate
    }
}

pub async fn run_edit(request: &EditRequest<'_>, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(request.id)?;
    let session = open_journal(db_path).await?;
    let journal = &session.inner;
    let original = resolve_entry(&normalized_id, journal).await?;
    let mut entry = original.clone();

    if request.has_changes() {
        let fields = request.fields;
        if let Some(title) = request.title {
            entry.title = title.trim().to_string();
            if entry.title.is_empty() {
                return Err(CliError::EmptyTitle);
            }
        }
        if let Some(location) = fields.location.as_deref() {
            entry.location = location.trim().to_string();
        }
        if let Some(notes) = fields.notes.as_deref() {
            entry.notes = notes.trim().to_string();
        }
        if let Some(date) = fields.date.as_deref() {
            entry.date = parse_event_date(date)?;
        }
        if let Some(path) = fields.photo.as_deref() {
            entry.photo = Some(read_photo(path)?);
        } else if request.clear_photo {
            entry.photo = None;
        }
        if request.clear_coordinate {
            entry.coordinate = None;
        } else if let Some(coordinate) = parse_coordinate(fields.latitude, fields.longitude)? {
            entry.coordinate = Some(coordinate);
        }
    } else {
        entry.notes = capture_editor_input_with_initial(&entry.notes)?.unwrap_or_default();
    }

    if entry == original {
        println!("{}", entry.id);
        return Ok(());
    }

    let updated = journal.save(entry).await?;
    println!("{}", updated.id);
    Ok(())
}
