use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stamp")]
#[command(about = "Keep a travel journal and sync it across devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH", global = true)]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a new entry
    #[command(alias = "new")]
    Add {
        /// Entry title
        title: Vec<String>,
        #[command(flatten)]
        fields: EntryFields,
    },
    /// List entries, newest event first
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Include archived entries
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing entry; opens $EDITOR on the notes when no field is given
    Edit {
        /// Entry ID or unique ID prefix
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: EntryFields,
        /// Remove the photo
        #[arg(long, conflicts_with = "photo")]
        clear_photo: bool,
        /// Remove the GPS position
        #[arg(long, conflicts_with_all = ["latitude", "longitude"])]
        clear_coordinate: bool,
    },
    /// Archive an entry (synced soft delete)
    Archive {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Restore an archived entry
    Restore {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Permanently delete an entry from the remote and this device
    Delete {
        /// Entry ID or unique ID prefix
        id: String,
        /// Only delete the local copy
        #[arg(long)]
        local_only: bool,
    },
    /// Sync with the hosted journal
    Sync {
        #[command(subcommand)]
        action: Option<SyncAction>,
    },
}

#[derive(Subcommand)]
pub enum SyncAction {
    /// Show checkpoint and pending changes
    Status,
    /// List recently overwritten local edits
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget all pending changes
    ResetPending,
    /// Fetch specific entries from the remote
    Pull {
        /// Full entry IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

/// Optional entry fields shared by `add` and `edit`.
#[derive(Args, Debug, Default)]
pub struct EntryFields {
    /// Place name
    #[arg(long)]
    pub location: Option<String>,
    /// Free-text notes
    #[arg(long)]
    pub notes: Option<String>,
    /// Event date (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub date: Option<String>,
    /// Path to a JPEG photo
    #[arg(long, value_name = "PATH")]
    pub photo: Option<PathBuf>,
    /// Latitude in degrees
    #[arg(long = "lat", id = "latitude", allow_hyphen_values = true, requires = "longitude")]
    pub latitude: Option<f64>,
    /// Longitude in degrees
    #[arg(long = "lon", id = "longitude", allow_hyphen_values = true, requires = "latitude")]
    pub longitude: Option<f64>,
}

impl EntryFields {
    pub const fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.notes.is_none()
            && self.date.is_none()
            && self.photo.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
    }
}
