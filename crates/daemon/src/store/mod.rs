//! Document store: per-entity JSON documents addressed by hierarchical
//! path, with partial-field merge updates, atomic batches, and change
//! notifications. The rest of the daemon only talks to the
//! [`DocumentStore`] trait; sqlite is the backing implementation.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("document serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone)]
pub struct DocChange {
    pub path: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Replace the whole document.
    Set { path: String, body: Value },
    /// Deep-merge partial fields into the document, creating it if absent.
    Update { path: String, fields: Value },
    Delete { path: String },
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, path: &str, body: Value) -> Result<(), StoreError>;
    /// Partial update with merge semantics: nested objects merge field by
    /// field, everything else is replaced.
    async fn update(&self, path: &str, fields: Value) -> Result<(), StoreError>;
    /// All ops commit together or not at all.
    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
    /// Documents whose path starts with `prefix`, in path order. Stands in
    /// for a collection query.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError>;
    fn subscribe(&self) -> broadcast::Receiver<DocChange>;
}

/// Merge `patch` into `base` with JSON-merge-patch semantics: objects merge
/// recursively, a `null` member deletes the key, anything else replaces the
/// previous value wholesale.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    base_map.remove(key);
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None if patch_value.is_object() => {
                        // Strip nested nulls on the way in.
                        let mut fresh = Value::Object(serde_json::Map::new());
                        deep_merge(&mut fresh, patch_value);
                        base_map.insert(key.clone(), fresh);
                    }
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Build a merge patch that turns `old` into exactly `new`: keys present in
/// `old` but gone from `new` become explicit `null` deletions. Used wherever
/// a map-valued field must be replaced wholesale rather than merged.
pub fn replace_patch(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = serde_json::Map::new();
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            for (key, new_value) in new_map {
                let member = match old_map.get(key) {
                    Some(old_value) => replace_patch(old_value, new_value),
                    None => new_value.clone(),
                };
                patch.insert(key.clone(), member);
            }
            Value::Object(patch)
        }
        (_, new) => new.clone(),
    }
}

pub fn project_path(project_id: &str) -> String {
    format!("projects/{}", project_id)
}

pub fn videos_prefix(project_id: &str) -> String {
    format!("projects/{}/videos/", project_id)
}

pub fn video_path(project_id: &str, video_id: &str) -> String {
    format!("projects/{}/videos/{}", project_id, video_id)
}

pub fn draft_path(draft_id: &str) -> String {
    format!("drafts/{}", draft_id)
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<DocChange>,
}

impl SqliteStore {
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        let (changes, _) = broadcast::channel(256);
        let store = SqliteStore {
            conn: Mutex::new(conn),
            changes,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                path TEXT PRIMARY KEY,
                body_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn notify(&self, path: &str, kind: ChangeKind) {
        // Receivers may come and go; a send with no listeners is fine.
        let _ = self.changes.send(DocChange {
            path: path.to_string(),
            kind,
        });
    }

    fn read_doc(conn: &Connection, path: &str) -> Result<Option<Value>, StoreError> {
        let mut stmt = conn.prepare("SELECT body_json FROM documents WHERE path = ?1")?;
        let mut rows = stmt.query_map(params![path], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(Ok(body)) => Ok(Some(serde_json::from_str(&body)?)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    fn write_doc(conn: &Connection, path: &str, body: &Value) -> Result<bool, StoreError> {
        let existed = Self::read_doc(conn, path)?.is_some();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO documents (path, body_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET body_json = ?2, updated_at = ?3",
            params![path, serde_json::to_string(body)?, now],
        )?;
        Ok(existed)
    }

    fn apply_op(conn: &Connection, op: &WriteOp) -> Result<Option<(String, ChangeKind)>, StoreError> {
        match op {
            WriteOp::Set { path, body } => {
                let existed = Self::write_doc(conn, path, body)?;
                let kind = if existed {
                    ChangeKind::Modified
                } else {
                    ChangeKind::Added
                };
                Ok(Some((path.clone(), kind)))
            }
            WriteOp::Update { path, fields } => {
                let (mut body, existed) = match Self::read_doc(conn, path)? {
                    Some(body) => (body, true),
                    None => (Value::Object(serde_json::Map::new()), false),
                };
                deep_merge(&mut body, fields);
                Self::write_doc(conn, path, &body)?;
                let kind = if existed {
                    ChangeKind::Modified
                } else {
                    ChangeKind::Added
                };
                Ok(Some((path.clone(), kind)))
            }
            WriteOp::Delete { path } => {
                let removed = conn.execute("DELETE FROM documents WHERE path = ?1", params![path])?;
                if removed > 0 {
                    Ok(Some((path.clone(), ChangeKind::Removed)))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::read_doc(&conn, path)
    }

    async fn set(&self, path: &str, body: Value) -> Result<(), StoreError> {
        let existed = {
            let conn = self.conn.lock().unwrap();
            Self::write_doc(&conn, path, &body)?
        };
        self.notify(
            path,
            if existed {
                ChangeKind::Modified
            } else {
                ChangeKind::Added
            },
        );
        Ok(())
    }

    async fn update(&self, path: &str, fields: Value) -> Result<(), StoreError> {
        let change = {
            let conn = self.conn.lock().unwrap();
            Self::apply_op(&conn, &WriteOp::Update {
                path: path.to_string(),
                fields,
            })?
        };
        if let Some((path, kind)) = change {
            self.notify(&path, kind);
        }
        Ok(())
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let notifications = {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            let mut notifications = Vec::new();
            for op in &ops {
                if let Some(change) = Self::apply_op(&tx, op)? {
                    notifications.push(change);
                }
            }
            tx.commit()?;
            notifications
        };
        for (path, kind) in notifications {
            self.notify(&path, kind);
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let change = {
            let conn = self.conn.lock().unwrap();
            Self::apply_op(&conn, &WriteOp::Delete {
                path: path.to_string(),
            })?
        };
        if let Some((path, kind)) = change {
            self.notify(&path, kind);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let mut stmt = conn.prepare(
            "SELECT path, body_json FROM documents WHERE path LIKE ?1 ESCAPE '\\' ORDER BY path",
        )?;
        let rows = stmt.query_map(params![pattern], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut docs = Vec::new();
        for row in rows {
            let (path, body) = row?;
            docs.push((path, serde_json::from_str(&body)?));
        }
        Ok(docs)
    }

    fn subscribe(&self) -> broadcast::Receiver<DocChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_merges_objects_and_replaces_leaves() {
        let mut base = json!({
            "tasks": {"scripting": {"scripting_stage": "pending", "script_plan": "old"}},
            "title": "Highlands"
        });
        deep_merge(
            &mut base,
            &json!({"tasks": {"scripting": {"script_plan": "new"}}}),
        );
        assert_eq!(base["tasks"]["scripting"]["script_plan"], "new");
        assert_eq!(base["tasks"]["scripting"]["scripting_stage"], "pending");
        assert_eq!(base["title"], "Highlands");
    }

    #[test]
    fn deep_merge_null_deletes_a_key() {
        let mut base = json!({"answers": {"0": "a", "1": "b"}});
        deep_merge(&mut base, &json!({"answers": {"1": null}}));
        assert_eq!(base["answers"], json!({"0": "a"}));
    }

    #[test]
    fn replace_patch_round_trips_to_the_new_value() {
        let old = json!({"0": "a", "1": "b", "2": "c"});
        let new = json!({"0": "a", "1": "c"});
        let patch = replace_patch(&old, &new);
        assert_eq!(patch["2"], json!(null));
        let mut doc = old;
        deep_merge(&mut doc, &patch);
        assert_eq!(doc, new);
    }

    #[test]
    fn deep_merge_replaces_arrays_wholesale() {
        let mut base = json!({"locations_featured": ["a", "b"]});
        deep_merge(&mut base, &json!({"locations_featured": ["c"]}));
        assert_eq!(base["locations_featured"], json!(["c"]));
    }

    #[tokio::test]
    async fn update_creates_then_merges() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&dir.path().join("docs.db")).unwrap();
        store
            .update("projects/p1", json!({"name": "Trip", "locations": []}))
            .await
            .unwrap();
        store
            .update("projects/p1", json!({"name": "Scotland Trip"}))
            .await
            .unwrap();
        let doc = store.get("projects/p1").await.unwrap().unwrap();
        assert_eq!(doc["name"], "Scotland Trip");
        assert_eq!(doc["locations"], json!([]));
    }

    #[tokio::test]
    async fn batch_write_is_atomic_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&dir.path().join("docs.db")).unwrap();
        store
            .batch_write(vec![
                WriteOp::Set {
                    path: "drafts/d1".to_string(),
                    body: json!({"title": "t"}),
                },
                WriteOp::Set {
                    path: "projects/p1/videos/v1".to_string(),
                    body: json!({"title": "t"}),
                },
                WriteOp::Delete {
                    path: "drafts/d1".to_string(),
                },
            ])
            .await
            .unwrap();
        assert!(store.get("drafts/d1").await.unwrap().is_none());
        assert!(store.get("projects/p1/videos/v1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_scopes_to_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&dir.path().join("docs.db")).unwrap();
        store.set("projects/p1/videos/v1", json!({})).await.unwrap();
        store.set("projects/p1/videos/v2", json!({})).await.unwrap();
        store.set("projects/p2/videos/v3", json!({})).await.unwrap();
        let docs = store.list(&videos_prefix("p1")).await.unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn subscription_sees_adds_modifies_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&dir.path().join("docs.db")).unwrap();
        let mut changes = store.subscribe();
        store.set("drafts/d1", json!({"a": 1})).await.unwrap();
        store.update("drafts/d1", json!({"a": 2})).await.unwrap();
        store.delete("drafts/d1").await.unwrap();
        assert_eq!(changes.recv().await.unwrap().kind, ChangeKind::Added);
        assert_eq!(changes.recv().await.unwrap().kind, ChangeKind::Modified);
        assert_eq!(changes.recv().await.unwrap().kind, ChangeKind::Removed);
    }
}
