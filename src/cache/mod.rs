//! Reconciling Cache - the collection as currently known to this client.
//!
//! The cache is fed from two directions: the initial fetch (`replace_all`)
//! and the change feed (`apply`). Feed events may arrive before the fetch
//! resolves, may repeat, and may reference rows the cache never saw, so:
//!
//! - events applied before the first `replace_all` are buffered and replayed
//!   on top of the fetched snapshot;
//! - an insert for a present id is skipped, an update or delete for an absent
//!   id is a no-op, which makes every event idempotent;
//! - inserts go to the front, matching the newest-first fetch order.
//!
//! Every mutation swaps in a fresh `Arc<Vec<R>>`; a reader holding an older
//! snapshot keeps a consistent list.
//!
//! ```ignore
//! let cache = ReconcilingCache::new();
//! cache.apply(ChangeEvent::Insert(r4))?;       // buffered, not yet ready
//! cache.replace_all(vec![r1, r2, r3])?;        // replays the insert
//! assert_eq!(cache.snapshot().len(), 4);
//! ```

mod collection;

use std::sync::{Arc, Mutex, RwLock};

use event_emitter_rs::EventEmitter;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::feed::{ChangeKind, RowChange};
use crate::record::{Keyed, Record, Row, Table};
use crate::remote::{ErrorCode, RemoteError};

pub use collection::SyncedCollection;

const SNAPSHOT_EVENT: &str = "snapshot";

/// A change to apply to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<R = Record> {
    Insert(R),
    Update(R),
    /// Deletes carry only the id.
    Delete(String),
}

impl<R: Keyed> ChangeEvent<R> {
    pub fn key(&self) -> &str {
        match self {
            ChangeEvent::Insert(r) | ChangeEvent::Update(r) => r.key(),
            ChangeEvent::Delete(id) => id.as_str(),
        }
    }
}

impl ChangeEvent<Record> {
    /// Translate a feed notification. Fails if the notification lacks the
    /// side its kind requires.
    pub fn from_row_change(change: RowChange) -> Result<Self, RemoteError> {
        match (change.kind, change.new, change.old) {
            (ChangeKind::Insert, Some(record), _) => Ok(ChangeEvent::Insert(record)),
            (ChangeKind::Update, Some(record), _) => Ok(ChangeEvent::Update(record)),
            (ChangeKind::Delete, _, Some(key)) => Ok(ChangeEvent::Delete(key.id)),
            (kind, _, _) => Err(RemoteError::new(
                ErrorCode::Malformed,
                format!("{:?} notification on {} without a row", kind, change.table),
            )),
        }
    }

    /// Decode the carried record into a typed row.
    pub fn decode<T: Table>(self) -> Result<ChangeEvent<Row<T>>, RemoteError> {
        Ok(match self {
            ChangeEvent::Insert(record) => ChangeEvent::Insert(Row::decode(&record)?),
            ChangeEvent::Update(record) => ChangeEvent::Update(Row::decode(&record)?),
            ChangeEvent::Delete(id) => ChangeEvent::Delete(id),
        })
    }
}

/// What `apply` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The cache is not populated yet; the event waits for `replace_all`.
    Buffered,
    /// The snapshot changed and observers were notified.
    Changed,
    /// Duplicate insert, unchanged update, or event for an absent id.
    Unchanged,
}

struct CacheState<R> {
    ready: bool,
    records: Arc<Vec<R>>,
    pending: Vec<ChangeEvent<R>>,
    revision: u64,
}

/// Ordered, id-keyed, observable view of a remote collection.
pub struct ReconcilingCache<R> {
    state: RwLock<CacheState<R>>,
    emitter: Mutex<EventEmitter>,
}

impl<R> Default for ReconcilingCache<R>
where
    R: Keyed + Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ReconcilingCache<R>
where
    R: Keyed + Clone + PartialEq + Send + Sync + 'static,
{
    /// Create an empty cache awaiting its first `replace_all`.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState {
                ready: false,
                records: Arc::new(Vec::new()),
                pending: Vec::new(),
                revision: 0,
            }),
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    /// The current ordered contents. Never observed mid-update.
    pub fn snapshot(&self) -> Result<Arc<Vec<R>>, SyncError> {
        let state = self
            .state
            .read()
            .map_err(|_| SyncError::LockPoisoned("cache read"))?;
        Ok(Arc::clone(&state.records))
    }

    /// Incremented on every snapshot change; 0 until the first `replace_all`.
    pub fn revision(&self) -> Result<u64, SyncError> {
        let state = self
            .state
            .read()
            .map_err(|_| SyncError::LockPoisoned("cache read"))?;
        Ok(state.revision)
    }

    /// Whether `replace_all` has run.
    pub fn is_ready(&self) -> Result<bool, SyncError> {
        let state = self
            .state
            .read()
            .map_err(|_| SyncError::LockPoisoned("cache read"))?;
        Ok(state.ready)
    }

    /// Number of events waiting for the first `replace_all`.
    pub fn pending_len(&self) -> Result<usize, SyncError> {
        let state = self
            .state
            .read()
            .map_err(|_| SyncError::LockPoisoned("cache read"))?;
        Ok(state.pending.len())
    }

    /// Replace the contents with a freshly fetched, newest-first list.
    ///
    /// On the first call, events buffered while the fetch was in flight are
    /// replayed on top. Returns the number of replayed events.
    pub fn replace_all(&self, records: Vec<R>) -> Result<usize, SyncError> {
        let (revision, replayed) = {
            let mut state = self
                .state
                .write()
                .map_err(|_| SyncError::LockPoisoned("cache replace"))?;

            let pending = std::mem::take(&mut state.pending);
            let mut current = records;
            for event in &pending {
                if let Some(next) = reconcile(&current, event) {
                    current = next;
                }
            }

            state.records = Arc::new(current);
            state.ready = true;
            state.revision += 1;
            (state.revision, pending.len())
        };

        debug!(revision, replayed, "cache replaced");
        self.notify(revision)?;
        Ok(replayed)
    }

    /// Apply one change event.
    pub fn apply(&self, event: ChangeEvent<R>) -> Result<Applied, SyncError> {
        let revision = {
            let mut state = self
                .state
                .write()
                .map_err(|_| SyncError::LockPoisoned("cache apply"))?;

            if !state.ready {
                debug!(key = event.key(), "cache not ready, buffering event");
                state.pending.push(event);
                return Ok(Applied::Buffered);
            }

            match reconcile(&state.records, &event) {
                Some(next) => {
                    state.records = Arc::new(next);
                    state.revision += 1;
                    state.revision
                }
                None => {
                    debug!(key = event.key(), "cache event skipped");
                    return Ok(Applied::Unchanged);
                }
            }
        };

        self.notify(revision)?;
        Ok(Applied::Changed)
    }

    /// Register an observer, called with the new revision after every
    /// snapshot change. Returns a listener id for `remove_listener`.
    pub fn on_change<F>(&self, listener: F) -> Result<String, SyncError>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| SyncError::LockPoisoned("cache listeners"))?;
        Ok(emitter.on(SNAPSHOT_EVENT, listener))
    }

    /// Unregister an observer. Returns true if it was registered.
    pub fn remove_listener(&self, id: &str) -> Result<bool, SyncError> {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| SyncError::LockPoisoned("cache listeners"))?;
        Ok(emitter.remove_listener(id).is_some())
    }

    /// Deliver `revision` to every observer and wait for them to finish.
    fn notify(&self, revision: u64) -> Result<(), SyncError> {
        let handles = {
            let mut emitter = self
                .emitter
                .lock()
                .map_err(|_| SyncError::LockPoisoned("cache listeners"))?;
            emitter.emit(SNAPSHOT_EVENT, revision)
        };
        for handle in handles {
            if handle.join().is_err() {
                warn!(revision, "cache observer panicked");
            }
        }
        Ok(())
    }
}

/// The list after `event`, or None if the event leaves it unchanged.
fn reconcile<R: Keyed + Clone + PartialEq>(records: &[R], event: &ChangeEvent<R>) -> Option<Vec<R>> {
    match event {
        ChangeEvent::Insert(record) => {
            if records.iter().any(|r| r.key() == record.key()) {
                return None;
            }
            let mut next = Vec::with_capacity(records.len() + 1);
            next.push(record.clone());
            next.extend_from_slice(records);
            Some(next)
        }
        ChangeEvent::Update(record) => {
            let pos = records.iter().position(|r| r.key() == record.key())?;
            if records[pos] == *record {
                return None;
            }
            let mut next = records.to_vec();
            next[pos] = record.clone();
            Some(next)
        }
        ChangeEvent::Delete(id) => {
            if !records.iter().any(|r| r.key() == id.as_str()) {
                return None;
            }
            Some(
                records
                    .iter()
                    .filter(|r| r.key() != id.as_str())
                    .cloned()
                    .collect(),
            )
        }
    }
}
