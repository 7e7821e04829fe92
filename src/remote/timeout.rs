//! TimeoutStore - puts a deadline on every call of a wrapped store.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::warn;

use super::{Query, RemoteError, RemoteStore};
use crate::config::RemoteConfig;
use crate::feed::{ChangeFeed, FeedFilter, FeedSubscription};
use crate::record::{NewRecord, Record, Versioned};

/// Wraps a cloneable store so no call blocks longer than `timeout`.
///
/// Each call runs on a short-lived worker thread; the caller waits at most
/// `timeout` for the answer and gets `ErrorCode::Timeout` otherwise. A write
/// that times out may still land on the server, exactly as with a dropped
/// HTTP response.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use synced_rust::{InMemoryRemoteStore, RemoteStore, TimeoutStore};
///
/// let store = TimeoutStore::new(InMemoryRemoteStore::new(), Duration::from_secs(5));
/// assert!(store.fetch_all("tasks", "user-1").unwrap().is_empty());
/// ```
#[derive(Clone)]
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutStore<S>
where
    S: RemoteStore + Clone + 'static,
{
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Wrap `inner` with the configured request timeout.
    pub fn from_config(inner: S, config: &RemoteConfig) -> Self {
        Self::new(inner, config.request_timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn call<T, F>(&self, operation: &'static str, f: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T, RemoteError> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let store = self.inner.clone();
        thread::Builder::new()
            .name(format!("remote-{}", operation))
            .spawn(move || {
                // The caller may have given up already.
                let _ = sender.send(f(&store));
            })
            .map_err(|e| RemoteError::transport(format!("spawn {} worker: {}", operation, e)))?;

        match receiver.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(operation, timeout = ?self.timeout, "remote call timed out");
                Err(RemoteError::timeout(operation, self.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(RemoteError::transport(format!(
                "{} worker exited without answering",
                operation
            ))),
        }
    }
}

impl<S> RemoteStore for TimeoutStore<S>
where
    S: RemoteStore + Clone + 'static,
{
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Record>, RemoteError> {
        let (table, query) = (table.to_string(), query.clone());
        self.call("select", move |s| s.select(&table, &query))
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Versioned<Record>>, RemoteError> {
        let (table, id) = (table.to_string(), id.to_string());
        self.call("get", move |s| s.get(&table, &id))
    }

    fn insert(&self, table: &str, record: NewRecord) -> Result<Record, RemoteError> {
        let table = table.to_string();
        self.call("insert", move |s| s.insert(&table, record))
    }

    fn update(
        &self,
        table: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Record, RemoteError> {
        let (table, id) = (table.to_string(), id.to_string());
        self.call("update", move |s| s.update(&table, &id, patch))
    }

    fn update_if(
        &self,
        table: &str,
        id: &str,
        patch: Map<String, Value>,
        expected_version: u64,
    ) -> Result<Versioned<Record>, RemoteError> {
        let (table, id) = (table.to_string(), id.to_string());
        self.call("update_if", move |s| {
            s.update_if(&table, &id, patch, expected_version)
        })
    }

    fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        let (table, id) = (table.to_string(), id.to_string());
        self.call("delete", move |s| s.delete(&table, &id))
    }

    fn delete_where(&self, table: &str, field: &str, value: &Value) -> Result<usize, RemoteError> {
        let (table, field, value) = (table.to_string(), field.to_string(), value.clone());
        self.call("delete_where", move |s| s.delete_where(&table, &field, &value))
    }
}

impl<S> ChangeFeed for TimeoutStore<S>
where
    S: RemoteStore + ChangeFeed + Clone + 'static,
{
    fn subscribe(&self, filter: FeedFilter) -> Result<FeedSubscription, RemoteError> {
        self.inner.subscribe(filter)
    }
}
