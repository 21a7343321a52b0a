//! Entry store: the local durable record store keyed by entry id

use std::collections::HashSet;

use libsql::{Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::{Coordinate, Entry, EntryId};

const ENTRY_COLUMNS: &str = "id, title, location, notes, event_date, photo, edit_timestamp, \
                             is_archived, latitude, longitude, created_at";

/// Trait for local entry storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EntryStore {
    /// All entries, archived included, newest event date first
    async fn fetch_all(&self) -> Result<Vec<Entry>>;

    /// Get an entry by ID, archived included
    async fn fetch_by_id(&self, id: &EntryId) -> Result<Option<Entry>>;

    /// Insert the entry, or overwrite every mutable field of the row with the same id
    async fn upsert(&self, entry: &Entry) -> Result<()>;

    /// Remove the row entirely. Returns whether a row existed.
    async fn delete_permanently(&self, id: &EntryId) -> Result<bool>;

    /// Entries whose `edit_timestamp` is strictly greater than `since` (Unix ms)
    async fn fetch_modified_since(&self, since: i64) -> Result<Vec<Entry>>;

    /// Ids of every stored entry
    async fn entry_ids(&self) -> Result<HashSet<EntryId>>;
}

/// libSQL implementation of `EntryStore`
#[derive(Clone)]
pub struct LibSqlEntryStore {
    conn: Connection,
}

impl LibSqlEntryStore {
    /// Create a new store over the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    async fn query_entries(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Entry>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    /// Parse an entry from a database row selected with `ENTRY_COLUMNS`
    fn parse_entry(row: &Row) -> Result<Entry> {
        let id: String = row.get(0)?;
        let id = id
            .parse()
            .map_err(|_| Error::Database(format!("Invalid entry id in store: {id}")))?;

        let latitude = optional_real(row.get_value(8)?);
        let longitude = optional_real(row.get_value(9)?);

        Ok(Entry {
            id,
            title: row.get(1)?,
            location: row.get(2)?,
            notes: row.get(3)?,
            date: row.get(4)?,
            photo: optional_blob(row.get_value(5)?),
            edit_timestamp: row.get(6)?,
            is_archived: row.get::<i64>(7)? != 0,
            coordinate: Coordinate::from_parts(latitude, longitude),
            created_at: row.get(10)?,
        })
    }
}

impl EntryStore for LibSqlEntryStore {
    async fn fetch_all(&self) -> Result<Vec<Entry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries ORDER BY event_date DESC, id DESC");
        self.query_entries(&sql, Vec::new()).await
    }

    async fn fetch_by_id(&self, id: &EntryId) -> Result<Option<Entry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?");
        let mut entries = self
            .query_entries(&sql, vec![Value::Text(id.as_str())])
            .await?;
        Ok(entries.pop())
    }

    async fn upsert(&self, entry: &Entry) -> Result<()> {
        let (latitude, longitude) = entry.coordinate.map_or((Value::Null, Value::Null), |c| {
            (Value::Real(c.latitude), Value::Real(c.longitude))
        });
        let photo = entry
            .photo
            .clone()
            .filter(|bytes| !bytes.is_empty())
            .map_or(Value::Null, Value::Blob);

        self.conn
            .execute(
                "INSERT INTO entries (id, title, location, notes, event_date, photo, edit_timestamp,
                                      is_archived, latitude, longitude, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     title = excluded.title,
                     location = excluded.location,
                     notes = excluded.notes,
                     event_date = excluded.event_date,
                     photo = excluded.photo,
                     edit_timestamp = excluded.edit_timestamp,
                     is_archived = excluded.is_archived,
                     latitude = excluded.latitude,
                     longitude = excluded.longitude,
                     created_at = excluded.created_at",
                vec![
                    Value::Text(entry.id.as_str()),
                    Value::Text(entry.title.clone()),
                    Value::Text(entry.location.clone()),
                    Value::Text(entry.notes.clone()),
                    Value::Integer(entry.date),
                    photo,
                    Value::Integer(entry.edit_timestamp),
                    Value::Integer(i64::from(entry.is_archived)),
                    latitude,
                    longitude,
                    Value::Integer(entry.created_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete_permanently(&self, id: &EntryId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM entries WHERE id = ?", [id.as_str()])
            .await?;
        Ok(rows > 0)
    }

    async fn fetch_modified_since(&self, since: i64) -> Result<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE edit_timestamp > ? ORDER BY edit_timestamp ASC"
        );
        self.query_entries(&sql, vec![Value::Integer(since)]).await
    }

    async fn entry_ids(&self) -> Result<HashSet<EntryId>> {
        let mut rows = self.conn.query("SELECT id FROM entries", ()).await?;
        let mut ids = HashSet::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            match id.parse() {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(_) => tracing::warn!("Ignoring entry row with invalid id {id}"),
            }
        }
        Ok(ids)
    }
}

#[allow(clippy::cast_precision_loss)] // REAL columns written as integers by older clients
fn optional_real(value: Value) -> Option<f64> {
    match value {
        Value::Real(number) => Some(number),
        Value::Integer(number) => Some(number as f64),
        _ => None,
    }
}

fn optional_blob(value: Value) -> Option<Vec<u8>> {
    match value {
        Value::Blob(bytes) if !bytes.is_empty() => Some(bytes),
        _ => None,
    }
}
