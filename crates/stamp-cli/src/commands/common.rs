use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use serde::Serialize;
use stamp_core::db::{Database, LibSqlEntryStore, LibSqlSyncStateStore};
use stamp_core::models::{Coordinate, SyncConflict};
use stamp_core::remote::SupabaseTableClient;
use stamp_core::storage::PhotoStorage;
use stamp_core::sync::{Journal, SyncEngine};
use stamp_core::util::{format_iso_millis, parse_iso_millis, unix_millis_now};
use stamp_core::{Entry, EntryId, SyncOptions, SyncSettings};

use crate::cli::EntryFields;
use crate::error::CliError;

pub type LocalJournal = Journal<LibSqlEntryStore, LibSqlSyncStateStore>;
pub type CliEngine =
    SyncEngine<LibSqlEntryStore, LibSqlSyncStateStore, SupabaseTableClient, PhotoStorage>;

/// Open database plus the journal over it. The database handle must outlive the journal.
pub struct Session<T> {
    _db: Database,
    pub inner: T,
}

#[derive(Debug, Serialize)]
pub struct EntryListItem {
    pub id: String,
    pub title: String,
    pub location: String,
    pub notes: String,
    pub date: String,
    pub has_photo: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_archived: bool,
    pub edited_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub entry_id: String,
    pub local_edit_timestamp: i64,
    pub incoming_edit_timestamp: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

pub async fn open_journal(db_path: &Path) -> Result<Session<LocalJournal>, CliError> {
    let db = Database::open(db_path).await?;
    let journal = Journal::open(db.entry_store(), db.sync_state_store()).await?;
    Ok(Session {
        _db: db,
        inner: journal,
    })
}

pub async fn open_engine(db_path: &Path) -> Result<Session<CliEngine>, CliError> {
    let settings = SyncSettings::from_env()?.ok_or(CliError::SyncNotConfigured)?;
    let remote = settings.remote_table()?;
    let photos = settings.photo_storage()?;

    let Session { _db, inner: journal } = open_journal(db_path).await?;
    tracing::info!("Syncing with {}", settings.supabase.url);
    Ok(Session {
        _db,
        inner: SyncEngine::new(journal, remote, photos, SyncOptions::default()),
    })
}

pub async fn resolve_entry(query: &str, journal: &LocalJournal) -> Result<Entry, CliError> {
    if let Ok(id) = query.parse::<EntryId>() {
        if let Some(entry) = journal.get(&id).await? {
            return Ok(entry);
        }
    }

    let needle = query.to_ascii_lowercase();
    let mut matches: Vec<Entry> = journal
        .list(true)
        .await?
        .into_iter()
        .filter(|entry| entry.id.as_str().starts_with(&needle))
        .collect();

    match matches.len() {
        0 => Err(CliError::EntryNotFound(query.to_string())),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|entry| short_id(&entry.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousEntryId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &EntryId) -> String {
    id.as_str().chars().take(13).collect()
}

pub fn format_entry_lines(entries: &[Entry]) -> Vec<String> {
    let now_ms = unix_millis_now();
    entries
        .iter()
        .map(|entry| {
            let short_id = short_id(&entry.id);
            let title = truncate(&entry.title, 32);
            let location = truncate(&entry.location, 20);
            let date = format_event_date(entry.date);
            let relative_time = format_relative_time(entry.edit_timestamp, now_ms);
            let mut markers = String::new();
            if entry.has_photo() {
                markers.push_str(" [photo]");
            }
            if entry.is_archived {
                markers.push_str(" [archived]");
            }

            format!("{short_id:<13}  {date}  {title:<32}  {location:<20}  {relative_time}{markers}")
        })
        .collect()
}

pub fn entry_to_list_item(entry: &Entry) -> EntryListItem {
    let now_ms = unix_millis_now();
    EntryListItem {
        id: entry.id.to_string(),
        title: entry.title.clone(),
        location: entry.location.clone(),
        notes: entry.notes.clone(),
        date: format_iso_millis(entry.date),
        has_photo: entry.has_photo(),
        latitude: entry.coordinate.map(|coordinate| coordinate.latitude),
        longitude: entry.coordinate.map(|coordinate| coordinate.longitude),
        is_archived: entry.is_archived,
        edited_at: entry.edit_timestamp,
        relative_time: format_relative_time(entry.edit_timestamp, now_ms),
    }
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        entry_id: conflict.entry_id.clone(),
        local_edit_timestamp: conflict.local_edit_timestamp,
        incoming_edit_timestamp: conflict.incoming_edit_timestamp,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {}  entry={}  local={} incoming={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.entry_id,
                format_sync_timestamp(conflict.local_edit_timestamp),
                format_sync_timestamp(conflict.incoming_edit_timestamp)
            )
        })
        .collect()
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let mut truncated = collapsed
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_event_date(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d").to_string(),
    )
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_title(parts: &[String]) -> Result<String, CliError> {
    normalize_content(&parts.join(" ")).ok_or(CliError::EmptyTitle)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_entry_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyEntryId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn parse_event_date(value: &str) -> Result<i64, CliError> {
    parse_iso_millis(value).ok_or_else(|| CliError::InvalidDate(value.trim().to_string()))
}

/// Validate a coordinate pair from the command line.
///
/// `(0, 0)` is rejected because it reads back as "no position".
pub fn parse_coordinate(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Option<Coordinate>, CliError> {
    let (latitude, longitude) = match (latitude, longitude) {
        (None, None) => return Ok(None),
        (Some(latitude), Some(longitude)) => (latitude, longitude),
        _ => {
            return Err(CliError::InvalidCoordinate(
                "latitude and longitude must be given together".to_string(),
            ))
        }
    };

    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(CliError::InvalidCoordinate(format!(
            "({latitude}, {longitude}) is out of range"
        )));
    }
    Coordinate::from_parts(Some(latitude), Some(longitude))
        .map(Some)
        .ok_or_else(|| {
            CliError::InvalidCoordinate("(0, 0) is reserved for entries without GPS".to_string())
        })
}

pub fn read_photo(path: &Path) -> Result<Vec<u8>, CliError> {
    Ok(std::fs::read(path)?)
}

/// Notes from `--notes`, else piped stdin.
pub fn resolve_notes(fields: &EntryFields) -> Result<String, CliError> {
    if let Some(notes) = fields.notes.as_deref() {
        return Ok(notes.trim().to_string());
    }
    Ok(read_piped_stdin()?.unwrap_or_default())
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_notes_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_notes_file_path() -> PathBuf {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    env::temp_dir().join(format!("stamp-notes-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("STAMP_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stamp")
        .join("stamp.db")
}
