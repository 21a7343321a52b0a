//! Journal entry model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::unix_millis_now;

/// A unique identifier for an entry, using UUID v7 (time-sortable)
///
/// The id is the reconciliation key shared by the local and remote stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new unique entry ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// A geographic position attached to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build a coordinate from optional wire components.
    ///
    /// A missing component, or the `(0, 0)` "no GPS" sentinel, yields `None`.
    #[must_use]
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        let (latitude, longitude) = (latitude?, longitude?);
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        let coordinate = Self::new(latitude, longitude);
        (!coordinate.is_sentinel()).then_some(coordinate)
    }

    /// True for `(0, 0)`, which legacy clients write when there is no location.
    #[must_use]
    #[allow(clippy::float_cmp)] // exact zero is the sentinel, -0.0 included
    pub fn is_sentinel(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

/// A journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique identifier
    pub id: EntryId,
    pub title: String,
    pub location: String,
    pub notes: String,
    /// User-facing event date (Unix ms)
    pub date: i64,
    /// Raw photo bytes, when the entry has a photo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Vec<u8>>,
    /// Bumped on every local mutation; orders conflicting edits (Unix ms)
    pub edit_timestamp: i64,
    /// Soft delete flag, propagated through sync
    pub is_archived: bool,
    pub coordinate: Option<Coordinate>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Entry {
    /// Create a new entry from a draft, stamped with the current time
    #[must_use]
    pub fn new(draft: EntryDraft) -> Self {
        let now = unix_millis_now();
        Self {
            id: EntryId::new(),
            title: draft.title,
            location: draft.location,
            notes: draft.notes,
            date: draft.date.unwrap_or(now),
            photo: draft.photo,
            edit_timestamp: now,
            is_archived: false,
            coordinate: draft.coordinate.filter(|coordinate| !coordinate.is_sentinel()),
            created_at: now,
        }
    }

    /// Advance `edit_timestamp` for a local mutation.
    ///
    /// Never moves backwards, even when the wall clock does.
    pub fn touch(&mut self) {
        self.edit_timestamp = unix_millis_now().max(self.edit_timestamp.saturating_add(1));
    }

    /// Whether the entry carries a photo
    #[must_use]
    pub fn has_photo(&self) -> bool {
        self.photo.as_ref().is_some_and(|bytes| !bytes.is_empty())
    }
}

/// User-supplied fields for a new entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryDraft {
    pub title: String,
    pub location: String,
    pub notes: String,
    /// Event date (Unix ms); defaults to now
    pub date: Option<i64>,
    pub photo: Option<Vec<u8>>,
    pub coordinate: Option<Coordinate>,
}

impl EntryDraft {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}
