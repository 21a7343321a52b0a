//! Durable set of entry ids with unconfirmed local mutations.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::db::SyncStateStore;
use crate::error::Result;
use crate::models::EntryId;

/// Tracks pending entry ids and publishes whether any remain.
///
/// Every mutation is persisted immediately. When persisting fails the
/// in-memory set keeps the change and the error is returned so the caller
/// can log it; the next successful mutation writes the whole set again.
pub struct PendingTracker<C> {
    state: Arc<C>,
    ids: Mutex<BTreeSet<EntryId>>,
    has_pending: watch::Sender<bool>,
}

impl<C: SyncStateStore> PendingTracker<C> {
    /// Restore the persisted pending set.
    pub async fn load(state: Arc<C>) -> Result<Self> {
        let ids = state.load_pending().await?;
        let (has_pending, _) = watch::channel(!ids.is_empty());
        Ok(Self {
            state,
            ids: Mutex::new(ids),
            has_pending,
        })
    }

    /// Flag `id` for upload. Marking an already pending id is a no-op.
    pub async fn mark_pending(&self, id: EntryId) -> Result<()> {
        let mut ids = self.ids.lock().await;
        if !ids.insert(id) {
            return Ok(());
        }
        self.persist(&ids).await
    }

    /// Drop ids confirmed by the remote.
    pub async fn clear_pending<'a>(
        &self,
        cleared: impl IntoIterator<Item = &'a EntryId>,
    ) -> Result<()> {
        let mut ids = self.ids.lock().await;
        let before = ids.len();
        for id in cleared {
            ids.remove(id);
        }
        if ids.len() == before {
            return Ok(());
        }
        self.persist(&ids).await
    }

    /// Remove pending ids whose entry no longer exists locally.
    ///
    /// Returns the pruned ids.
    pub async fn prune_orphans(&self, existing: &HashSet<EntryId>) -> Result<Vec<EntryId>> {
        let mut ids = self.ids.lock().await;
        let orphans: Vec<EntryId> = ids
            .iter()
            .filter(|id| !existing.contains(id))
            .copied()
            .collect();
        if orphans.is_empty() {
            return Ok(orphans);
        }

        for id in &orphans {
            ids.remove(id);
        }
        tracing::debug!("Pruned {} orphaned pending ids", orphans.len());
        self.persist(&ids).await?;
        Ok(orphans)
    }

    /// Forget every pending mutation.
    pub async fn clear_all(&self) -> Result<()> {
        let mut ids = self.ids.lock().await;
        if ids.is_empty() {
            return Ok(());
        }
        ids.clear();
        self.persist(&ids).await
    }

    pub async fn snapshot(&self) -> BTreeSet<EntryId> {
        self.ids.lock().await.clone()
    }

    pub async fn contains(&self, id: &EntryId) -> bool {
        self.ids.lock().await.contains(id)
    }

    pub fn has_pending(&self) -> bool {
        *self.has_pending.borrow()
    }

    /// Observe the "has pending changes" flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.has_pending.subscribe()
    }

    async fn persist(&self, ids: &BTreeSet<EntryId>) -> Result<()> {
        let non_empty = !ids.is_empty();
        self.has_pending.send_if_modified(|current| {
            let changed = *current != non_empty;
            *current = non_empty;
            changed
        });

        self.state.save_pending(ids).await.inspect_err(|error| {
            tracing::warn!("Failed to persist pending set ({} ids): {error}", ids.len());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn tracker(db: &Database) -> PendingTracker<crate::db::LibSqlSyncStateStore> {
        PendingTracker::load(Arc::new(db.sync_state_store()))
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_is_idempotent_and_persisted() {
        let db = Database::open_in_memory().await.unwrap();
        let pending = tracker(&db).await;
        let id = EntryId::new();

        pending.mark_pending(id).await.unwrap();
        pending.mark_pending(id).await.unwrap();
        assert_eq!(pending.snapshot().await, BTreeSet::from([id]));

        let reloaded = tracker(&db).await;
        assert!(reloaded.contains(&id).await);
        assert!(reloaded.has_pending());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_see_pending_flag_flip() {
        let db = Database::open_in_memory().await.unwrap();
        let pending = tracker(&db).await;
        let mut flag = pending.subscribe();
        assert!(!*flag.borrow_and_update());

        let id = EntryId::new();
        pending.mark_pending(id).await.unwrap();
        assert!(flag.has_changed().unwrap());
        assert!(*flag.borrow_and_update());

        pending.clear_pending([&id]).await.unwrap();
        assert!(!*flag.borrow_and_update());
        assert!(!pending.has_pending());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn prune_removes_only_missing_entries() {
        let db = Database::open_in_memory().await.unwrap();
        let pending = tracker(&db).await;
        let kept = EntryId::new();
        let orphan = EntryId::new();
        pending.mark_pending(kept).await.unwrap();
        pending.mark_pending(orphan).await.unwrap();

        let pruned = pending
            .prune_orphans(&HashSet::from([kept]))
            .await
            .unwrap();
        assert_eq!(pruned, vec![orphan]);
        assert_eq!(pending.snapshot().await, BTreeSet::from([kept]));
        assert_eq!(
            db.sync_state_store().load_pending().await.unwrap(),
            BTreeSet::from([kept])
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_all_empties_durable_set() {
        let db = Database::open_in_memory().await.unwrap();
        let pending = tracker(&db).await;
        pending.mark_pending(EntryId::new()).await.unwrap();

        pending.clear_all().await.unwrap();
        assert!(pending.snapshot().await.is_empty());
        assert!(db.sync_state_store().load_pending().await.unwrap().is_empty());
    }
}
