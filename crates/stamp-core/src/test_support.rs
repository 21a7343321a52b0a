//! In-memory fakes for the remote table and blob storage.
//!
//! Clones share state, so two engines built over clones of the same fake
//! behave like two devices talking to one backend.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::models::EntryId;
use crate::remote::{OrderBy, RemoteError, RemoteFilter, RemoteTable};
use crate::storage::BlobStorage;
use crate::sync::WirePayload;
use crate::util::{format_iso_millis, parse_iso_millis, unix_millis_now};

const BLOB_BASE_URL: &str = "https://blobs.test/photos";

#[derive(Default)]
struct TableState {
    rows: Mutex<Vec<Value>>,
    fail_select: AtomicBool,
    fail_upsert: AtomicBool,
    fail_delete: AtomicBool,
    upsert_calls: AtomicUsize,
    clock_offset: AtomicI64,
}

/// Remote table keeping raw JSON rows, so tests can plant malformed records.
///
/// Every write is stamped with the table's own clock, like the database
/// trigger does, so `updated_at` never comes from a device.
#[derive(Clone, Default)]
pub struct MemoryRemoteTable {
    state: Arc<TableState>,
}

impl MemoryRemoteTable {
    /// A table whose clock runs `offset_ms` away from the devices' clock.
    pub fn with_clock_offset(offset_ms: i64) -> Self {
        let table = Self::default();
        table.state.clock_offset.store(offset_ms, Ordering::SeqCst);
        table
    }

    pub fn server_now(&self) -> i64 {
        unix_millis_now() + self.state.clock_offset.load(Ordering::SeqCst)
    }

    pub fn insert_raw(&self, row: Value) {
        self.state.rows.lock().unwrap().push(row);
    }

    /// Write a row as another client would, stamped with the server clock.
    pub fn insert(&self, payload: &WirePayload) {
        self.insert_at(payload, self.server_now());
    }

    pub fn insert_at(&self, payload: &WirePayload, updated_at: i64) {
        let mut row = serde_json::to_value(payload).unwrap();
        row["updated_at"] = Value::String(format_iso_millis(updated_at));
        let mut rows = self.state.rows.lock().unwrap();
        rows.retain(|existing| existing["id"] != row["id"]);
        rows.push(row);
    }

    pub fn payload(&self, id: &EntryId) -> Option<WirePayload> {
        self.state
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row["id"] == id.as_str())
            .map(|row| serde_json::from_value(row.clone()).unwrap())
    }

    pub fn len(&self) -> usize {
        self.state.rows.lock().unwrap().len()
    }

    pub fn fail_selects(&self, fail: bool) {
        self.state.fail_select.store(fail, Ordering::SeqCst);
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.state.fail_upsert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.state.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn upsert_calls(&self) -> usize {
        self.state.upsert_calls.load(Ordering::SeqCst)
    }
}

fn updated_at(row: &Value) -> Option<i64> {
    row["updated_at"].as_str().and_then(parse_iso_millis)
}

impl RemoteTable for MemoryRemoteTable {
    async fn select(
        &self,
        filter: &RemoteFilter,
        order: OrderBy,
    ) -> Result<Vec<Value>, RemoteError> {
        // Suspend like a real request so concurrent callers interleave
        tokio::task::yield_now().await;
        if self.state.fail_select.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("simulated outage".to_string()));
        }

        let rows = self.state.rows.lock().unwrap();
        let mut selected: Vec<Value> = match filter {
            RemoteFilter::UpdatedSince(since) => rows
                .iter()
                .filter(|row| updated_at(row).is_some_and(|at| at >= *since))
                .cloned()
                .collect(),
            RemoteFilter::IdIn(ids) => {
                let ids: BTreeSet<String> = ids.iter().map(EntryId::as_str).collect();
                rows.iter()
                    .filter(|row| row["id"].as_str().is_some_and(|id| ids.contains(id)))
                    .cloned()
                    .collect()
            }
        };
        if order.descending {
            selected.sort_by_key(|row| std::cmp::Reverse(updated_at(row)));
        } else {
            selected.sort_by_key(updated_at);
        }
        Ok(selected)
    }

    async fn upsert(&self, payloads: &[WirePayload]) -> Result<(), RemoteError> {
        tokio::task::yield_now().await;
        self.state.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_upsert.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("simulated outage".to_string()));
        }
        // One transaction, one timestamp
        let stamped_at = self.server_now();
        for payload in payloads {
            self.insert_at(payload, stamped_at);
        }
        Ok(())
    }

    async fn delete(&self, id: &EntryId) -> Result<(), RemoteError> {
        if self.state.fail_delete.load(Ordering::SeqCst) {
            return Err(RemoteError::Api {
                status: 403,
                message: "permission denied".to_string(),
            });
        }
        self.state
            .rows
            .lock()
            .unwrap()
            .retain(|row| row["id"] != id.as_str());
        Ok(())
    }
}

#[derive(Default)]
struct BlobState {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
}

/// Blob storage serving objects under a fake public URL.
#[derive(Clone, Default)]
pub struct MemoryBlobStorage {
    state: Arc<BlobState>,
}

impl MemoryBlobStorage {
    pub fn fail_uploads(&self, fail: bool) {
        self.state.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.state.objects.lock().unwrap().get(path).cloned()
    }
}

impl BlobStorage for MemoryBlobStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        _content_type: &str,
        overwrite: bool,
    ) -> Result<(), RemoteError> {
        if self.state.fail_uploads.load(Ordering::SeqCst) {
            return Err(RemoteError::Api {
                status: 500,
                message: "simulated storage failure".to_string(),
            });
        }
        let mut objects = self.state.objects.lock().unwrap();
        if !overwrite && objects.contains_key(path) {
            return Err(RemoteError::Api {
                status: 409,
                message: "object exists".to_string(),
            });
        }
        objects.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn public_url(&self, path: &str) -> Result<String, RemoteError> {
        Ok(format!("{BLOB_BASE_URL}/{path}"))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        url.strip_prefix(BLOB_BASE_URL)
            .map(|path| path.trim_start_matches('/'))
            .and_then(|path| self.object(path))
            .ok_or_else(|| RemoteError::Api {
                status: 404,
                message: format!("{url} not found"),
            })
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        self.state.objects.lock().unwrap().remove(path);
        Ok(())
    }
}
