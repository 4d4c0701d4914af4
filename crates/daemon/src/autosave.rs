//! Debounced autosave: in-flight edits accumulate in memory per document
//! path and flush to the store after a quiet period, so typing does not
//! turn into a write per keystroke and an abrupt close loses at most one
//! debounce window. Explicit close forces a flush; drafts can be abandoned
//! or promoted into their final entity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::warn;

use crate::store::{deep_merge, draft_path, DocumentStore, StoreError, WriteOp};

struct PendingWrite {
    fields: Value,
    due_at: Instant,
}

pub struct AutosaveBuffer {
    store: Arc<dyn DocumentStore>,
    quiet: Duration,
    pending: Mutex<HashMap<String, PendingWrite>>,
}

impl AutosaveBuffer {
    pub fn new(store: Arc<dyn DocumentStore>, quiet: Duration) -> Self {
        AutosaveBuffer {
            store,
            quiet,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Record an edit. Merges into any pending fields for the same path and
    /// restarts that path's quiet window.
    pub fn stage(&self, path: &str, fields: Value) {
        let mut pending = self.pending.lock().unwrap();
        let due_at = Instant::now() + self.quiet;
        match pending.get_mut(path) {
            Some(entry) => {
                deep_merge(&mut entry.fields, &fields);
                entry.due_at = due_at;
            }
            None => {
                pending.insert(path.to_string(), PendingWrite { fields, due_at });
            }
        }
    }

    /// Drop pending edits for a path without writing them.
    pub fn discard(&self, path: &str) {
        self.pending.lock().unwrap().remove(path);
    }

    pub fn has_pending(&self, path: &str) -> bool {
        self.pending.lock().unwrap().contains_key(path)
    }

    /// Put fields that failed to write back into the buffer so a later
    /// cycle retries them. Edits staged after the failure win over the
    /// failed batch.
    fn restage(&self, path: &str, fields: Value) {
        let mut pending = self.pending.lock().unwrap();
        match pending.remove(path) {
            Some(newer) => {
                let mut merged = fields;
                deep_merge(&mut merged, &newer.fields);
                pending.insert(
                    path.to_string(),
                    PendingWrite {
                        fields: merged,
                        due_at: newer.due_at,
                    },
                );
            }
            None => {
                pending.insert(
                    path.to_string(),
                    PendingWrite {
                        fields,
                        due_at: Instant::now() + self.quiet,
                    },
                );
            }
        }
    }

    /// Force-flush one path, quiet window or not. Used on explicit close so
    /// nothing unsaved outlives the workspace. A failed write goes back
    /// into the buffer.
    pub async fn flush_now(&self, path: &str) -> Result<(), StoreError> {
        let entry = self.pending.lock().unwrap().remove(path);
        if let Some(entry) = entry {
            if let Err(e) = self.store.update(path, entry.fields.clone()).await {
                self.restage(path, entry.fields);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Flush every path whose quiet window has elapsed. Returns how many
    /// documents were written. A per-path failure re-stages that path's
    /// fields and does not stop the remaining flushes.
    pub async fn flush_due(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let due: Vec<(String, Value)> = {
            let mut pending = self.pending.lock().unwrap();
            let paths: Vec<String> = pending
                .iter()
                .filter(|(_, entry)| entry.due_at <= now)
                .map(|(path, _)| path.clone())
                .collect();
            paths
                .into_iter()
                .filter_map(|path| pending.remove(&path).map(|entry| (path, entry.fields)))
                .collect()
        };
        // No lock held across store awaits.
        let mut written = 0;
        let mut first_err = None;
        for (path, fields) in due {
            match self.store.update(&path, fields.clone()).await {
                Ok(()) => written += 1,
                Err(e) => {
                    self.restage(&path, fields);
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Background flush loop, spawned once at startup.
    pub async fn run(self: Arc<Self>) {
        loop {
            if let Err(e) = self.flush_due().await {
                warn!("autosave flush failed: {}", e);
            }
            sleep(Duration::from_millis(250)).await;
        }
    }

    /// Abandon a draft: drop pending edits and delete the stored document.
    /// Callable from a list view without the draft being open.
    pub async fn delete_draft(&self, draft_id: &str) -> Result<(), StoreError> {
        let path = draft_path(draft_id);
        self.discard(&path);
        self.store.delete(&path).await
    }

    /// Promote a draft into its final entity: flush pending edits, then
    /// move the body to the target path and delete the draft atomically.
    pub async fn promote_draft(
        &self,
        draft_id: &str,
        target_path: &str,
    ) -> Result<Value, StoreError> {
        let path = draft_path(draft_id);
        self.flush_now(&path).await?;
        let body = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;
        self.store
            .batch_write(vec![
                WriteOp::Set {
                    path: target_path.to_string(),
                    body: body.clone(),
                },
                WriteOp::Delete { path },
            ])
            .await?;
        Ok(body)
    }
}
