//! Bidirectional delta sync between the local journal and the remote table.
//!
//! A pass downloads every remote row the server stamped at or after the
//! download cursor and applies it locally, then uploads local entries edited
//! since the checkpoint plus everything still pending. An incoming row never
//! replaces a pending local edit with a newer `edit_timestamp`; that edit is
//! uploaded instead.
//!
//! Two watermarks are kept so no comparison mixes clocks: the download
//! cursor is the newest server `updated_at` seen, and the upload checkpoint
//! is this device's pass start time. Both advance only after both phases
//! succeed.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tokio::sync::{watch, Mutex};

use super::codec::{self, PhotoResolution};
use super::{Journal, SyncError, SyncStatus, SyncStatusPublisher};
use crate::config::SyncOptions;
use crate::db::{EntryStore, SyncStateStore};
use crate::models::{Entry, EntryId, REMOTE_WINS};
use crate::remote::{OrderBy, RemoteFilter, RemoteTable};
use crate::storage::BlobStorage;
use crate::util::{format_iso_millis, unix_millis_now};

/// Counts for one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Remote rows returned by the download query
    pub downloaded: usize,
    /// Rows written to the local store
    pub applied: usize,
    /// Rows skipped as undecodable or unwritable
    pub skipped: usize,
    /// Applied rows that replaced an unsynced local edit
    pub conflicts: usize,
    /// Rows ignored because a newer pending local edit exists
    pub kept_local: usize,
    pub uploaded: usize,
    /// Pending ids dropped because their entry no longer exists
    pub pruned: usize,
    /// Upload checkpoint stored by this pass (Unix ms, device clock)
    pub checkpoint: i64,
    /// Download cursor stored by this pass (Unix ms, server clock)
    pub remote_cursor: i64,
}

/// Result of a sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another pass was in flight; this request did nothing
    AlreadyRunning,
}

#[derive(Debug, Default)]
struct DownloadSummary {
    downloaded: usize,
    skipped: usize,
    conflicts: usize,
    kept_local: usize,
    applied: HashSet<EntryId>,
    newest_remote: Option<i64>,
}

/// What applying one remote row did locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Written { conflict: bool },
    KeptLocal,
}

#[derive(Debug, Default)]
struct UploadSummary {
    uploaded: usize,
    pruned: usize,
}

/// Marks the status as failed if a pass is dropped before finishing.
struct PassGuard<'a> {
    status: &'a SyncStatusPublisher,
    finished: bool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Sync pass cancelled before completion");
            self.status.fail("Sync cancelled");
        }
    }
}

/// Sync engine over injected local and remote collaborators.
pub struct SyncEngine<S, C, R, B> {
    journal: Journal<S, C>,
    remote: R,
    blobs: Option<B>,
    status: SyncStatusPublisher,
    options: SyncOptions,
    in_flight: Mutex<()>,
}

impl<S, C, R, B> SyncEngine<S, C, R, B>
where
    S: EntryStore,
    C: SyncStateStore,
    R: RemoteTable,
    B: BlobStorage,
{
    /// Build an engine. Without blob storage, photos travel inline.
    pub fn new(journal: Journal<S, C>, remote: R, blobs: Option<B>, options: SyncOptions) -> Self {
        Self {
            journal,
            remote,
            blobs,
            status: SyncStatusPublisher::new(options.status_display_delay),
            options,
            in_flight: Mutex::new(()),
        }
    }

    pub const fn journal(&self) -> &Journal<S, C> {
        &self.journal
    }

    pub fn status(&self) -> SyncStatus {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Observe whether local changes await upload.
    pub fn subscribe_pending(&self) -> watch::Receiver<bool> {
        self.journal.pending().subscribe()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.journal.pending().has_pending()
    }

    pub async fn mark_for_sync(&self, id: EntryId) -> crate::Result<()> {
        self.journal.mark_for_sync(id).await
    }

    /// Drop all pending ids; an escape hatch for stuck state.
    pub async fn clear_pending_changes(&self) -> crate::Result<()> {
        tracing::info!("Clearing all pending changes");
        self.journal.clear_pending_changes().await
    }

    /// Run one full download + upload pass.
    ///
    /// Returns [`SyncOutcome::AlreadyRunning`] without doing anything when
    /// another pass holds the engine.
    pub async fn perform_sync(&self) -> Result<SyncOutcome, SyncError> {
        let Ok(_lock) = self.in_flight.try_lock() else {
            tracing::debug!("Sync already in flight; ignoring request");
            return Ok(SyncOutcome::AlreadyRunning);
        };
        if !self.status.begin() {
            return Ok(SyncOutcome::AlreadyRunning);
        }

        let mut guard = PassGuard {
            status: &self.status,
            finished: false,
        };
        let result = self.run_pass().await;
        guard.finished = true;

        match result {
            Ok(report) => {
                tracing::info!(
                    downloaded = report.downloaded,
                    applied = report.applied,
                    skipped = report.skipped,
                    conflicts = report.conflicts,
                    uploaded = report.uploaded,
                    pruned = report.pruned,
                    "Sync completed"
                );
                self.status.succeed();
                Ok(SyncOutcome::Completed(report))
            }
            Err(error) => {
                tracing::warn!("Sync failed: {error}");
                self.status.fail(error.to_string());
                Err(error)
            }
        }
    }

    /// Fetch and apply specific remote rows without moving the checkpoint.
    pub async fn pull_entries(&self, ids: &[EntryId]) -> Result<SyncReport, SyncError> {
        let _lock = self.in_flight.lock().await;
        let summary = self.download(&RemoteFilter::IdIn(ids.to_vec())).await?;
        let state = self.journal.state();
        Ok(SyncReport {
            downloaded: summary.downloaded,
            applied: summary.applied.len(),
            skipped: summary.skipped,
            conflicts: summary.conflicts,
            kept_local: summary.kept_local,
            checkpoint: state.load_last_sync().await?,
            remote_cursor: state.load_remote_cursor().await?,
            ..SyncReport::default()
        })
    }

    /// Permanently delete an entry everywhere.
    ///
    /// The remote row goes first; local state is only touched once the
    /// remote delete succeeded.
    pub async fn delete_entry(&self, id: &EntryId) -> Result<(), SyncError> {
        let _lock = self.in_flight.lock().await;
        let local = self.journal.get(id).await?;

        self.remote
            .delete(id)
            .await
            .map_err(|error| SyncError::delete(&error))?;

        if let (Some(blobs), Some(entry)) = (&self.blobs, &local) {
            if entry.has_photo() {
                if let Err(error) = blobs.delete(&codec::photo_path(id)).await {
                    tracing::warn!("Entry {id} deleted but its photo was not: {error}");
                }
            }
        }

        self.journal.delete_local(id).await?;
        tracing::info!("Deleted entry {id}");
        Ok(())
    }

    async fn run_pass(&self) -> Result<SyncReport, SyncError> {
        let started_at = unix_millis_now();
        let state = self.journal.state();
        let since = state.load_last_sync().await?;
        let cursor = state.load_remote_cursor().await?;
        tracing::info!(
            since = %format_iso_millis(since),
            cursor = %format_iso_millis(cursor),
            "Sync pass started"
        );

        let download = self.download(&RemoteFilter::UpdatedSince(cursor)).await?;
        let upload = self.upload(since, &download.applied).await?;

        let checkpoint = started_at.max(since);
        let remote_cursor = download.newest_remote.map_or(cursor, |newest| newest.max(cursor));
        state.save_remote_cursor(remote_cursor).await?;
        state.save_last_sync(checkpoint).await?;

        Ok(SyncReport {
            downloaded: download.downloaded,
            applied: download.applied.len(),
            skipped: download.skipped,
            conflicts: download.conflicts,
            kept_local: download.kept_local,
            uploaded: upload.uploaded,
            pruned: upload.pruned,
            checkpoint,
            remote_cursor,
        })
    }

    async fn download(&self, filter: &RemoteFilter) -> Result<DownloadSummary, SyncError> {
        let rows = self
            .remote
            .select(filter, OrderBy::UPDATED_AT_DESC)
            .await
            .map_err(|error| SyncError::download(&error))?;

        let pending = self.journal.pending().snapshot().await;
        let mut summary = DownloadSummary {
            downloaded: rows.len(),
            newest_remote: rows.iter().filter_map(codec::row_updated_at).max(),
            ..DownloadSummary::default()
        };

        for row in rows {
            match self.apply_row(row, &pending).await {
                Ok((id, RowOutcome::Written { conflict })) => {
                    summary.applied.insert(id);
                    summary.conflicts += usize::from(conflict);
                }
                Ok((_, RowOutcome::KeptLocal)) => summary.kept_local += 1,
                Err(error) => {
                    tracing::warn!("Skipping remote record: {error}");
                    summary.skipped += 1;
                }
            }
        }

        // Applied rows now equal the remote copy
        if let Err(error) = self.journal.pending().clear_pending(&summary.applied).await {
            tracing::warn!("Could not clear pending flags for downloaded entries: {error}");
        }

        tracing::debug!(
            downloaded = summary.downloaded,
            applied = summary.applied.len(),
            skipped = summary.skipped,
            kept_local = summary.kept_local,
            "Download phase finished"
        );
        Ok(summary)
    }

    /// Decode and apply one remote row.
    ///
    /// A pending local edit with a newer `edit_timestamp` is left alone, so it
    /// stays pending and goes out in the upload phase. A newer remote row
    /// replacing a pending edit is logged as a conflict.
    async fn apply_row(
        &self,
        row: serde_json::Value,
        pending: &BTreeSet<EntryId>,
    ) -> Result<(EntryId, RowOutcome), SyncError> {
        let record = codec::decode_row(row)?;
        let id = record.entry.id;
        let incoming_edit = record.entry.edit_timestamp;
        let local = self.journal.store().fetch_by_id(&id).await?;
        let unsynced = local.as_ref().filter(|_| pending.contains(&id));

        if let Some(local) = unsynced.filter(|local| local.edit_timestamp > incoming_edit) {
            tracing::debug!(
                "Keeping pending local edit of entry {id} ({} > {incoming_edit})",
                local.edit_timestamp
            );
            return Ok((id, RowOutcome::KeptLocal));
        }

        let (mut entry, photo) = codec::resolve_photo(record, self.blobs.as_ref()).await;
        if photo == PhotoResolution::Unavailable {
            entry.photo = local.as_ref().and_then(|local| local.photo.clone());
        }

        let replaced = unsynced.filter(|local| local.edit_timestamp < incoming_edit);
        if let Some(local) = replaced {
            tracing::warn!(
                "Newer remote copy of entry {id} replaces a pending local edit ({} > {})",
                entry.edit_timestamp,
                local.edit_timestamp
            );
            if let Err(error) = self
                .journal
                .state()
                .record_conflict(&id, local.edit_timestamp, entry.edit_timestamp, REMOTE_WINS)
                .await
            {
                tracing::warn!("Failed to record conflict for entry {id}: {error}");
            }
        }

        self.journal.store().upsert(&entry).await?;
        tracing::debug!(archived = entry.is_archived, "Applied remote entry {id}");
        Ok((
            id,
            RowOutcome::Written {
                conflict: replaced.is_some(),
            },
        ))
    }

    async fn upload(
        &self,
        since: i64,
        downloaded: &HashSet<EntryId>,
    ) -> Result<UploadSummary, SyncError> {
        let pending = self.journal.pending();
        let mut summary = UploadSummary::default();

        match self.journal.store().entry_ids().await {
            Ok(existing) => match pending.prune_orphans(&existing).await {
                Ok(pruned) => summary.pruned = pruned.len(),
                Err(error) => tracing::warn!("Orphan pruning not persisted: {error}"),
            },
            Err(error) => tracing::warn!("Skipping orphan pruning: {error}"),
        }

        let mut changes: BTreeMap<EntryId, Entry> = self
            .journal
            .store()
            .fetch_modified_since(since)
            .await?
            .into_iter()
            .map(|entry| (entry.id, entry))
            .collect();
        for id in pending.snapshot().await {
            if changes.contains_key(&id) {
                continue;
            }
            if let Some(entry) = self.journal.store().fetch_by_id(&id).await? {
                changes.insert(id, entry);
            }
        }
        changes.retain(|id, _| !downloaded.contains(id));

        if changes.is_empty() {
            tracing::debug!("Nothing to upload");
            return Ok(summary);
        }

        let entries: Vec<Entry> = changes.into_values().collect();
        let mut confirmed = Vec::with_capacity(entries.len());
        for batch in entries.chunks(self.options.upload_batch_size.max(1)) {
            let mut payloads = Vec::with_capacity(batch.len());
            for entry in batch {
                payloads.push(codec::encode_with_photo(entry, self.blobs.as_ref()).await);
            }

            self.remote
                .upsert(&payloads)
                .await
                .map_err(|error| SyncError::upload(&error))?;
            confirmed.extend(batch.iter().map(|entry| entry.id));
            tracing::debug!("Uploaded batch of {} entries", batch.len());
        }

        if let Err(error) = pending.clear_pending(&confirmed).await {
            tracing::warn!("Uploaded entries stay flagged pending: {error}");
        }
        summary.uploaded = confirmed.len();
        Ok(summary)
    }
}
