//! InMemoryRemoteStore - HashMap-backed stand-in for the hosted data API.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Query, RemoteError, RemoteStore};
use crate::feed::{ChangeFeed, FeedFilter, FeedHub, FeedSubscription, RowChange};
use crate::record::{NewRecord, Record, Versioned, RESERVED_FIELDS};

/// Internal stored representation of a row.
struct StoredRow {
    record: Record,
    version: u64,
    /// Insertion order, breaks `created_at` ties.
    seq: u64,
}

/// In-memory remote store with a built-in change feed.
///
/// Storage key is `table` then `id`. Clone-friendly via Arc: clones share
/// rows, the feed and injected faults, the way two browser tabs share one
/// backend. Every successful write is published to the feed while the
/// table lock is held, so subscribers see writes in commit order.
#[derive(Clone)]
pub struct InMemoryRemoteStore {
    tables: Arc<RwLock<HashMap<String, HashMap<String, StoredRow>>>>,
    hub: Arc<FeedHub>,
    seq: Arc<AtomicU64>,
    /// `None` lets a call through.
    faults: Arc<Mutex<VecDeque<Option<RemoteError>>>>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemoteStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            hub: FeedHub::new(),
            seq: Arc::new(AtomicU64::new(1)),
            faults: Arc::new(Mutex::new(VecDeque::new())),
            latency: Arc::new(RwLock::new(None)),
        }
    }

    /// Make the next call fail with `error`. Faults queue up in order.
    pub fn fail_next(&self, error: RemoteError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push_back(Some(error));
        }
    }

    /// Let the next `calls` calls through before any queued fault.
    pub fn pass_next(&self, calls: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.extend(std::iter::repeat_with(|| None).take(calls));
        }
    }

    /// Delay every call by `latency` (None to disable).
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut current) = self.latency.write() {
            *current = latency;
        }
    }

    /// The feed this store publishes to.
    pub fn hub(&self) -> &Arc<FeedHub> {
        &self.hub
    }

    /// Number of rows in `table`.
    pub fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|tables| tables.get(table).map(|rows| rows.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Seed a row with an explicit `created_at`, bypassing id assignment.
    /// Published to the feed like any insert.
    pub fn seed(
        &self,
        table: &str,
        id: impl Into<String>,
        owner_id: impl Into<String>,
        created_at: DateTime<Utc>,
        payload: Map<String, Value>,
    ) -> Result<Record, RemoteError> {
        let record = Record {
            id: id.into(),
            owner_id: owner_id.into(),
            created_at,
            payload,
        };
        let mut tables = self.write_tables()?;
        let rows = tables.entry(table.to_string()).or_default();
        if rows.contains_key(&record.id) {
            return Err(RemoteError::rejected(format!(
                "duplicate key {} in {}",
                record.id, table
            )));
        }
        rows.insert(
            record.id.clone(),
            StoredRow {
                record: record.clone(),
                version: 1,
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
            },
        );
        self.hub.publish(&RowChange::inserted(table, record.clone()))?;
        Ok(record)
    }

    fn before_call(&self) -> Result<(), RemoteError> {
        let latency = self
            .latency
            .read()
            .map_err(|_| RemoteError::transport("latency lock poisoned"))?
            .as_ref()
            .copied();
        if let Some(latency) = latency {
            thread::sleep(latency);
        }

        let mut faults = self
            .faults
            .lock()
            .map_err(|_| RemoteError::transport("fault queue lock poisoned"))?;
        match faults.pop_front() {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }

    fn read_tables(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, HashMap<String, StoredRow>>>, RemoteError>
    {
        self.tables
            .read()
            .map_err(|_| RemoteError::transport("store lock poisoned"))
    }

    fn write_tables(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, HashMap<String, StoredRow>>>, RemoteError>
    {
        self.tables
            .write()
            .map_err(|_| RemoteError::transport("store lock poisoned"))
    }

    fn check_patch(patch: &Map<String, Value>) -> Result<(), RemoteError> {
        match RESERVED_FIELDS.iter().find(|f| patch.contains_key(**f)) {
            Some(field) => Err(RemoteError::rejected(format!(
                "column {} cannot be written",
                field
            ))),
            None => Ok(()),
        }
    }

    /// Apply a patch under the write lock, optionally checking the version.
    fn patch_row(
        &self,
        table: &str,
        id: &str,
        patch: Map<String, Value>,
        expected_version: Option<u64>,
    ) -> Result<Versioned<Record>, RemoteError> {
        Self::check_patch(&patch)?;
        let mut tables = self.write_tables()?;
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| RemoteError::no_rows(table, id))?;

        if let Some(expected) = expected_version {
            if row.version != expected {
                return Err(RemoteError::conflict(table, id, expected, row.version));
            }
        }

        row.record.payload.extend(patch);
        row.version += 1;
        let updated = Versioned {
            data: row.record.clone(),
            version: row.version,
        };
        self.hub
            .publish(&RowChange::updated(table, updated.data.clone()))?;
        Ok(updated)
    }
}

impl RemoteStore for InMemoryRemoteStore {
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Record>, RemoteError> {
        self.before_call()?;
        let tables = self.read_tables()?;
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<&StoredRow> = rows
            .values()
            .filter(|row| query.matches(&row.record))
            .collect();
        matched.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        let limit = query.max_rows().unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .take(limit)
            .map(|row| row.record.clone())
            .collect())
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Versioned<Record>>, RemoteError> {
        self.before_call()?;
        let tables = self.read_tables()?;
        Ok(tables
            .get(table)
            .and_then(|rows| rows.get(id))
            .map(|row| Versioned {
                data: row.record.clone(),
                version: row.version,
            }))
    }

    fn insert(&self, table: &str, record: NewRecord) -> Result<Record, RemoteError> {
        self.before_call()?;
        if record.owner_id.trim().is_empty() {
            return Err(RemoteError::rejected(format!(
                "insert into {} without an owner",
                table
            )));
        }
        Self::check_patch(&record.payload)?;

        let stored = Record {
            id: Uuid::new_v4().to_string(),
            owner_id: record.owner_id,
            created_at: Utc::now(),
            payload: record.payload,
        };

        let mut tables = self.write_tables()?;
        tables.entry(table.to_string()).or_default().insert(
            stored.id.clone(),
            StoredRow {
                record: stored.clone(),
                version: 1,
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
            },
        );
        self.hub.publish(&RowChange::inserted(table, stored.clone()))?;
        Ok(stored)
    }

    fn update(
        &self,
        table: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Record, RemoteError> {
        self.before_call()?;
        Ok(self.patch_row(table, id, patch, None)?.data)
    }

    fn update_if(
        &self,
        table: &str,
        id: &str,
        patch: Map<String, Value>,
        expected_version: u64,
    ) -> Result<Versioned<Record>, RemoteError> {
        self.before_call()?;
        self.patch_row(table, id, patch, Some(expected_version))
    }

    fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        self.before_call()?;
        let mut tables = self.write_tables()?;
        let removed = tables
            .get_mut(table)
            .and_then(|rows| rows.remove(id))
            .is_some();
        if removed {
            self.hub.publish(&RowChange::deleted(table, id))?;
        }
        Ok(())
    }

    fn delete_where(&self, table: &str, field: &str, value: &Value) -> Result<usize, RemoteError> {
        self.before_call()?;
        let mut tables = self.write_tables()?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };

        let doomed: Vec<String> = rows
            .values()
            .filter(|row| row.record.field(field).as_ref() == Some(value))
            .map(|row| row.record.id.clone())
            .collect();
        for id in &doomed {
            rows.remove(id);
            self.hub.publish(&RowChange::deleted(table, id.as_str()))?;
        }
        Ok(doomed.len())
    }
}

impl ChangeFeed for InMemoryRemoteStore {
    fn subscribe(&self, filter: FeedFilter) -> Result<FeedSubscription, RemoteError> {
        self.hub.subscribe(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ChangeKind;
    use crate::remote::ErrorCode;
    use chrono::TimeZone;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn insert_assigns_id_and_timestamp() {
        let store = InMemoryRemoteStore::new();
        let a = store
            .insert("tasks", NewRecord::new("alice", payload(json!({ "title": "a" }))))
            .unwrap();
        let b = store
            .insert("tasks", NewRecord::new("alice", payload(json!({ "title": "b" }))))
            .unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.owner_id, "alice");
        assert_eq!(store.len("tasks"), 2);
    }

    #[test]
    fn insert_without_owner_is_rejected() {
        let store = InMemoryRemoteStore::new();
        let err = store
            .insert("tasks", NewRecord::new("  ", Map::new()))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Rejected);
    }

    #[test]
    fn fetch_all_is_owner_scoped_and_newest_first() {
        let store = InMemoryRemoteStore::new();
        let t = |secs: i64| Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        store.seed("tasks", "t-old", "alice", t(1), Map::new()).unwrap();
        store.seed("tasks", "t-new", "alice", t(3), Map::new()).unwrap();
        store.seed("tasks", "t-mid", "alice", t(2), Map::new()).unwrap();
        store.seed("tasks", "t-bob", "bob", t(4), Map::new()).unwrap();

        let ids: Vec<String> = store
            .fetch_all("tasks", "alice")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["t-new", "t-mid", "t-old"]);
    }

    #[test]
    fn same_instant_inserts_keep_insertion_order() {
        let store = InMemoryRemoteStore::new();
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        store.seed("tasks", "first", "alice", at, Map::new()).unwrap();
        store.seed("tasks", "second", "alice", at, Map::new()).unwrap();

        let ids: Vec<String> = store
            .fetch_all("tasks", "alice")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["second", "first"]);
    }

    #[test]
    fn update_merges_patch_and_bumps_version() {
        let store = InMemoryRemoteStore::new();
        let rec = store
            .insert(
                "tasks",
                NewRecord::new("alice", payload(json!({ "title": "a", "completed": false }))),
            )
            .unwrap();

        let updated = store
            .update("tasks", &rec.id, payload(json!({ "completed": true })))
            .unwrap();
        assert_eq!(updated.payload["title"], json!("a"));
        assert_eq!(updated.payload["completed"], json!(true));
        assert_eq!(store.get("tasks", &rec.id).unwrap().unwrap().version, 2);
    }

    #[test]
    fn update_missing_row() {
        let store = InMemoryRemoteStore::new();
        let err = store.update("tasks", "nope", Map::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoRows);
    }

    #[test]
    fn update_reserved_column_is_rejected() {
        let store = InMemoryRemoteStore::new();
        let rec = store
            .insert("tasks", NewRecord::new("alice", Map::new()))
            .unwrap();
        let err = store
            .update("tasks", &rec.id, payload(json!({ "owner_id": "mallory" })))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Rejected);
    }

    #[test]
    fn update_if_checks_version() {
        let store = InMemoryRemoteStore::new();
        let rec = store
            .insert("clients", NewRecord::new("alice", payload(json!({ "points": 1 }))))
            .unwrap();

        let ok = store
            .update_if("clients", &rec.id, payload(json!({ "points": 2 })), 1)
            .unwrap();
        assert_eq!(ok.version, 2);

        let err = store
            .update_if("clients", &rec.id, payload(json!({ "points": 3 })), 1)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::VersionConflict);
        assert_eq!(
            store.get("clients", &rec.id).unwrap().unwrap().data.payload["points"],
            json!(2)
        );
    }

    #[test]
    fn delete_absent_row_succeeds() {
        let store = InMemoryRemoteStore::new();
        assert!(store.delete("tasks", "ghost").is_ok());
    }

    #[test]
    fn delete_where_removes_matching_rows() {
        let store = InMemoryRemoteStore::new();
        for pid in ["p-1", "p-1", "p-2"] {
            store
                .insert(
                    "product_images",
                    NewRecord::new("alice", payload(json!({ "product_id": pid }))),
                )
                .unwrap();
        }
        let removed = store
            .delete_where("product_images", "product_id", &json!("p-1"))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len("product_images"), 1);
    }

    #[test]
    fn find_one_returns_versioned_row() {
        let store = InMemoryRemoteStore::new();
        store
            .insert("clients", NewRecord::new("alice", payload(json!({ "qr_code": "QR1" }))))
            .unwrap();

        let hit = store.find_one("clients", "qr_code", &json!("QR1")).unwrap();
        assert_eq!(hit.unwrap().version, 1);
        let miss = store.find_one("clients", "qr_code", &json!("QR2")).unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn injected_fault_fails_next_call_only() {
        let store = InMemoryRemoteStore::new();
        store.fail_next(RemoteError::transport("connection reset"));

        let err = store.fetch_all("tasks", "alice").unwrap_err();
        assert_eq!(err.code, ErrorCode::Transport);
        assert!(store.fetch_all("tasks", "alice").is_ok());
    }

    #[test]
    fn passed_calls_delay_the_fault() {
        let store = InMemoryRemoteStore::new();
        store.pass_next(2);
        store.fail_next(RemoteError::transport("connection reset"));

        assert!(store.fetch_all("tasks", "alice").is_ok());
        assert!(store.fetch_all("tasks", "alice").is_ok());
        assert!(store.fetch_all("tasks", "alice").is_err());
        assert!(store.fetch_all("tasks", "alice").is_ok());
    }

    #[test]
    fn writes_are_published_to_the_feed() {
        let store = InMemoryRemoteStore::new();
        let sub = store
            .subscribe(FeedFilter::table("tasks").owned_by("alice"))
            .unwrap();

        let rec = store
            .insert("tasks", NewRecord::new("alice", Map::new()))
            .unwrap();
        store
            .update("tasks", &rec.id, payload(json!({ "completed": true })))
            .unwrap();
        store.delete("tasks", &rec.id).unwrap();

        let kinds: Vec<ChangeKind> = std::iter::from_fn(|| sub.try_next())
            .map(|c| c.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
        );
    }

    #[test]
    fn clones_share_rows_and_feed() {
        let store = InMemoryRemoteStore::new();
        let other_tab = store.clone();
        let sub = store.subscribe(FeedFilter::table("tasks")).unwrap();

        other_tab
            .insert("tasks", NewRecord::new("alice", Map::new()))
            .unwrap();
        assert_eq!(store.len("tasks"), 1);
        assert!(sub.try_next().is_some());
    }
}
