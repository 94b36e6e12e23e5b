//! Catalog Store Module
//!
//! Durable, keyed storage of VideoAsset records with point lookups, full
//! enumeration, insertion, and atomic per-record updates.
//!
//! Layout: records live in an in-memory arena keyed by id, each behind its
//! own mutex so updates to unrelated assets never serialize against each
//! other. Every mutating call writes the record's row to SQLite before
//! returning, so a restart between calls never loses an acknowledged write.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use rusqlite::{params, Connection};
use tracing::info;

use crate::core::assets::{AssetStatus, Sensitivity, VideoAsset};
use crate::core::{AssetId, CoreError, CoreResult};

// =============================================================================
// Record Entry
// =============================================================================

/// One arena slot. `seq` is the insertion counter used for
/// most-recent-first enumeration; `deleted` closes the race between a
/// delete and an update that grabbed the slot just before removal.
struct Entry {
    seq: i64,
    deleted: bool,
    asset: VideoAsset,
}

// =============================================================================
// Catalog Store
// =============================================================================

/// Durable keyed collection of video-asset records
pub struct CatalogStore {
    records: RwLock<HashMap<AssetId, Arc<Mutex<Entry>>>>,
    db: Mutex<Connection>,
    seq: AtomicI64,
}

impl CatalogStore {
    /// Opens (or creates) a catalog database at the given path and loads
    /// all persisted records.
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| CoreError::Storage(format!("Failed to open catalog database: {e}")))?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory catalog (for testing). Still exercises the
    /// same durability path, just against a transient database.
    pub fn in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            CoreError::Storage(format!("Failed to create in-memory catalog: {e}"))
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> CoreResult<Self> {
        init_schema(&conn)?;

        let mut records = HashMap::new();
        let mut max_seq = 0i64;
        for (seq, asset) in load_rows(&conn)? {
            max_seq = max_seq.max(seq);
            records.insert(
                asset.id.clone(),
                Arc::new(Mutex::new(Entry {
                    seq,
                    deleted: false,
                    asset,
                })),
            );
        }

        if !records.is_empty() {
            info!("Catalog loaded {} persisted asset(s)", records.len());
        }

        Ok(Self {
            records: RwLock::new(records),
            db: Mutex::new(conn),
            seq: AtomicI64::new(max_seq),
        })
    }

    /// Inserts a new record. Fails with `DuplicateId` if the id exists.
    pub fn put(&self, asset: VideoAsset) -> CoreResult<()> {
        let mut records = self.records.write().unwrap();
        if records.contains_key(&asset.id) {
            return Err(CoreError::DuplicateId(asset.id));
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.persist(seq, &asset)?;
        records.insert(
            asset.id.clone(),
            Arc::new(Mutex::new(Entry {
                seq,
                deleted: false,
                asset,
            })),
        );
        Ok(())
    }

    /// Returns a snapshot of the record, or `NotFound`.
    pub fn get(&self, id: &AssetId) -> CoreResult<VideoAsset> {
        let entry = self.entry(id)?;
        let guard = entry.lock().unwrap();
        if guard.deleted {
            return Err(CoreError::NotFound(id.clone()));
        }
        Ok(guard.asset.clone())
    }

    /// Applies a partial mutation atomically with respect to other updates
    /// on the same id, persists the result, and returns the updated
    /// snapshot. Fails with `NotFound` if the record is absent or deleted.
    ///
    /// The mutation runs against a copy; if persistence fails the
    /// in-memory record is left unchanged, so acknowledged state and
    /// durable state never diverge.
    pub fn update<F>(&self, id: &AssetId, mutation: F) -> CoreResult<VideoAsset>
    where
        F: FnOnce(&mut VideoAsset),
    {
        let entry = self.entry(id)?;
        let mut guard = entry.lock().unwrap();
        if guard.deleted {
            return Err(CoreError::NotFound(id.clone()));
        }

        let mut updated = guard.asset.clone();
        mutation(&mut updated);
        updated.id = guard.asset.id.clone(); // id is immutable

        self.persist(guard.seq, &updated)?;
        guard.asset = updated.clone();
        Ok(updated)
    }

    /// Returns all records, most-recent-first (insertion order reversed).
    pub fn list(&self) -> Vec<VideoAsset> {
        let records = self.records.read().unwrap();
        let mut rows: Vec<(i64, VideoAsset)> = records
            .values()
            .filter_map(|entry| {
                let guard = entry.lock().unwrap();
                if guard.deleted {
                    None
                } else {
                    Some((guard.seq, guard.asset.clone()))
                }
            })
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        rows.into_iter().map(|(_, asset)| asset).collect()
    }

    /// Removes the record. Fails with `NotFound` if absent.
    ///
    /// Callers that may hold an outstanding classification job for this id
    /// must cancel it first; `VideoVault::delete_asset` is the surface that
    /// guarantees this ordering.
    pub fn delete(&self, id: &AssetId) -> CoreResult<()> {
        let entry = {
            let mut records = self.records.write().unwrap();
            records
                .remove(id)
                .ok_or_else(|| CoreError::NotFound(id.clone()))?
        };

        // Marking the slot closes the window where an update already holds
        // the Arc but has not yet persisted: it will observe `deleted` and
        // fail with NotFound instead of resurrecting the row.
        let mut guard = entry.lock().unwrap();
        guard.deleted = true;

        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM assets WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// True when the catalog holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &AssetId) -> CoreResult<Arc<Mutex<Entry>>> {
        self.records
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(id.clone()))
    }

    fn persist(&self, seq: i64, asset: &VideoAsset) -> CoreResult<()> {
        let status = serde_json::to_string(&asset.status)?;
        let sensitivity = serde_json::to_string(&asset.sensitivity)?;

        let db = self.db.lock().unwrap();
        db.execute(
            r#"
            INSERT OR REPLACE INTO assets
                (id, seq, title, filename, size_bytes, uploaded_at,
                 status, sensitivity, duration_sec, thumbnail_url, media_ref)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                asset.id,
                seq,
                asset.title,
                asset.filename,
                asset.size_bytes as i64,
                asset.uploaded_at,
                status,
                sensitivity,
                asset.duration_sec.map(|d| d as i64),
                asset.thumbnail_url,
                asset.media_ref,
            ],
        )?;
        Ok(())
    }
}

// =============================================================================
// Schema & Row Mapping
// =============================================================================

fn init_schema(conn: &Connection) -> CoreResult<()> {
    conn.execute_batch(
        r#"
        -- Assets table: one row per tracked video asset
        CREATE TABLE IF NOT EXISTS assets (
            id            TEXT PRIMARY KEY,
            seq           INTEGER NOT NULL UNIQUE,
            title         TEXT NOT NULL,
            filename      TEXT NOT NULL,
            size_bytes    INTEGER NOT NULL,
            uploaded_at   TEXT NOT NULL,
            status        TEXT NOT NULL,
            sensitivity   TEXT NOT NULL,
            duration_sec  INTEGER,
            thumbnail_url TEXT,
            media_ref     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_assets_seq ON assets(seq);
        "#,
    )
    .map_err(|e| CoreError::Storage(format!("Failed to initialize catalog schema: {e}")))?;
    Ok(())
}

fn load_rows(conn: &Connection) -> CoreResult<Vec<(i64, VideoAsset)>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, seq, title, filename, size_bytes, uploaded_at,
               status, sensitivity, duration_sec, thumbnail_url, media_ref
        FROM assets ORDER BY seq
        "#,
    )?;

    let raw = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, Option<i64>>(8)?,
            row.get::<_, Option<String>>(9)?,
            row.get::<_, String>(10)?,
        ))
    })?;

    let mut rows = Vec::new();
    for item in raw {
        let (
            id,
            seq,
            title,
            filename,
            size_bytes,
            uploaded_at,
            status_json,
            sensitivity_json,
            duration_sec,
            thumbnail_url,
            media_ref,
        ) = item?;

        let status: AssetStatus = serde_json::from_str(&status_json)?;
        let sensitivity: Sensitivity = serde_json::from_str(&sensitivity_json)?;

        rows.push((
            seq,
            VideoAsset {
                id,
                title,
                filename,
                size_bytes: size_bytes as u64,
                uploaded_at,
                status,
                sensitivity,
                duration_sec: duration_sec.map(|d| d as u64),
                thumbnail_url,
                media_ref,
            },
        ));
    }
    Ok(rows)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> VideoAsset {
        VideoAsset::new(name, 1024, &format!("blob://{name}"))
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = CatalogStore::in_memory().unwrap();
        let a = asset("demo.mp4");
        let id = a.id.clone();

        store.put(a.clone()).unwrap();
        assert_eq!(store.get(&id).unwrap(), a);
    }

    #[test]
    fn test_put_duplicate_id_rejected() {
        let store = CatalogStore::in_memory().unwrap();
        let a = asset("demo.mp4");
        store.put(a.clone()).unwrap();

        let result = store.put(a);
        assert!(matches!(result, Err(CoreError::DuplicateId(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = CatalogStore::in_memory().unwrap();
        let result = store.get(&"nope".to_string());
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn test_update_applies_mutation_and_returns_snapshot() {
        let store = CatalogStore::in_memory().unwrap();
        let a = asset("demo.mp4");
        let id = a.id.clone();
        store.put(a).unwrap();

        let updated = store
            .update(&id, |asset| {
                asset.apply_progress(45);
            })
            .unwrap();
        assert_eq!(updated.progress_pct(), Some(45));
        assert_eq!(store.get(&id).unwrap().progress_pct(), Some(45));
    }

    #[test]
    fn test_update_cannot_change_id() {
        let store = CatalogStore::in_memory().unwrap();
        let a = asset("demo.mp4");
        let id = a.id.clone();
        store.put(a).unwrap();

        let updated = store
            .update(&id, |asset| {
                asset.id = "hijacked".to_string();
            })
            .unwrap();
        assert_eq!(updated.id, id);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = CatalogStore::in_memory().unwrap();
        let result = store.update(&"nope".to_string(), |_| {});
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn test_list_is_most_recent_first() {
        let store = CatalogStore::in_memory().unwrap();
        let first = asset("first.mp4");
        let second = asset("second.mp4");
        let third = asset("third.mp4");
        store.put(first.clone()).unwrap();
        store.put(second.clone()).unwrap();
        store.put(third.clone()).unwrap();

        let listed: Vec<String> = store.list().into_iter().map(|a| a.id).collect();
        assert_eq!(listed, vec![third.id, second.id, first.id]);
    }

    #[test]
    fn test_delete_removes_record() {
        let store = CatalogStore::in_memory().unwrap();
        let a = asset("demo.mp4");
        let id = a.id.clone();
        store.put(a).unwrap();

        store.delete(&id).unwrap();
        assert!(matches!(store.get(&id), Err(CoreError::NotFound(_))));
        assert!(store.is_empty());

        let again = store.delete(&id);
        assert!(matches!(again, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn test_durability_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");

        let a = asset("demo.mp4");
        let id = a.id.clone();
        {
            let store = CatalogStore::open(&path).unwrap();
            store.put(a.clone()).unwrap();
            store
                .update(&id, |asset| {
                    asset.apply_progress(100);
                    asset.resolve_sensitivity(Sensitivity::Safe);
                })
                .unwrap();
        }

        let reopened = CatalogStore::open(&path).unwrap();
        let restored = reopened.get(&id).unwrap();
        assert_eq!(restored.status, AssetStatus::Completed);
        assert_eq!(restored.sensitivity, Sensitivity::Safe);
        assert_eq!(restored.filename, "demo.mp4");
    }

    #[test]
    fn test_recency_order_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");

        let ids: Vec<String> = {
            let store = CatalogStore::open(&path).unwrap();
            (0..3)
                .map(|i| {
                    let a = asset(&format!("v{i}.mp4"));
                    let id = a.id.clone();
                    store.put(a).unwrap();
                    id
                })
                .collect()
        };

        let reopened = CatalogStore::open(&path).unwrap();
        let listed: Vec<String> = reopened.list().into_iter().map(|a| a.id).collect();
        let expected: Vec<String> = ids.into_iter().rev().collect();
        assert_eq!(listed, expected);
    }

    #[test]
    fn test_concurrent_updates_on_distinct_ids() {
        use std::sync::Arc;

        let store = Arc::new(CatalogStore::in_memory().unwrap());
        let a = asset("a.mp4");
        let b = asset("b.mp4");
        let (id_a, id_b) = (a.id.clone(), b.id.clone());
        store.put(a).unwrap();
        store.put(b).unwrap();

        let handles: Vec<_> = [(id_a.clone(), 0u8), (id_b.clone(), 0u8)]
            .into_iter()
            .map(|(id, _)| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        store.update(&id, |asset| {
                            asset.apply_progress(5);
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.get(&id_a).unwrap().progress_pct(), Some(50));
        assert_eq!(store.get(&id_b).unwrap().progress_pct(), Some(50));
    }
}
