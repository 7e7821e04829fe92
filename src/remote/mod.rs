//! Remote Collection Store - request/response access to the hosted data API.
//!
//! The store is deliberately thin: select with equality filters and a
//! newest-first sort, insert, update-by-id, conditional update-by-id and
//! delete. It never retries; callers decide.
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ TableRepository<T>   (typed, Row<T>)       │
//! └────────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌────────────────────────────────────────────┐
//! │ RemoteStore          (untyped, Record)     │
//! └────────────────────────────────────────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌─────────────────────┐ ┌────────────────────┐
//! │ InMemoryRemoteStore │ │ TimeoutStore<S>    │
//! │ (+ change feed)     │ │ (deadline wrapper) │
//! └─────────────────────┘ └────────────────────┘
//! ```

mod error;
mod in_memory;
mod table;
mod timeout;

use serde_json::{Map, Value};

use crate::record::{NewRecord, Record, Versioned};

pub use error::{ErrorCode, RemoteError};
pub use in_memory::InMemoryRemoteStore;
pub use table::{TableRepository, TablesExt};
pub use timeout::TimeoutStore;

/// Equality-filtered select, sorted by `created_at` descending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<(String, Value)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows whose `field` equals `value`. `id` and `owner_id` address the row
    /// columns; other names address payload fields.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    /// Whether a record passes every filter.
    pub fn matches(&self, record: &Record) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| record.field(field).as_ref() == Some(value))
    }
}

/// Request/response access to the hosted data store.
pub trait RemoteStore: Send + Sync {
    /// Rows of `table` passing `query`, newest first.
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Record>, RemoteError>;

    /// Get a row by id. Returns None if not found.
    fn get(&self, table: &str, id: &str) -> Result<Option<Versioned<Record>>, RemoteError>;

    /// Insert a row. The server assigns `id` and `created_at`.
    fn insert(&self, table: &str, record: NewRecord) -> Result<Record, RemoteError>;

    /// Merge `patch` into an existing row. Fails with `NoRows` if absent.
    fn update(
        &self,
        table: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Record, RemoteError>;

    /// Merge `patch` only if the row is still at `expected_version`.
    /// Fails with `VersionConflict` otherwise.
    fn update_if(
        &self,
        table: &str,
        id: &str,
        patch: Map<String, Value>,
        expected_version: u64,
    ) -> Result<Versioned<Record>, RemoteError>;

    /// Delete a row by id. Deleting an absent row succeeds.
    fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError>;

    /// Delete every row whose `field` equals `value`. Returns how many went.
    fn delete_where(&self, table: &str, field: &str, value: &Value) -> Result<usize, RemoteError>;

    /// All rows owned by `owner_id`, newest first.
    fn fetch_all(&self, table: &str, owner_id: &str) -> Result<Vec<Record>, RemoteError> {
        self.select(table, &Query::new().eq("owner_id", owner_id))
    }

    /// The first row whose `field` equals `value`, with its version.
    fn find_one(
        &self,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Versioned<Record>>, RemoteError> {
        let query = Query::new().eq(field, value.clone()).limit(1);
        match self.select(table, &query)?.into_iter().next() {
            Some(record) => self.get(table, &record.id),
            None => Ok(None),
        }
    }
}
