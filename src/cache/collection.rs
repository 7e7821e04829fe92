//! SyncedCollection - one owner's rows of a table, kept live from the feed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Applied, ChangeEvent, ReconcilingCache};
use crate::error::SyncError;
use crate::feed::{ChangeFeed, FeedFilter, FeedSubscription, RowChange};
use crate::record::{Row, Table};
use crate::remote::{RemoteStore, TablesExt};
use crate::session::SessionContext;

/// A reconciling cache wired to the remote store and the change feed.
///
/// `open` subscribes before it fetches, so a change that lands while the
/// fetch is in flight is buffered and replayed rather than lost. Feed
/// changes are applied by the consumer calling `pump` or `wait`; nothing is
/// applied behind its back.
///
/// ```ignore
/// let tasks: SyncedCollection<_, Task> = SyncedCollection::open(&ctx)?;
/// tasks.on_change(|revision| println!("tasks now at {}", revision))?;
/// loop {
///     tasks.wait(Duration::from_millis(500))?;
/// }
/// ```
pub struct SyncedCollection<S, T> {
    store: Arc<S>,
    owner_id: String,
    cache: Arc<ReconcilingCache<Row<T>>>,
    subscription: FeedSubscription,
}

impl<S, T> SyncedCollection<S, T>
where
    S: RemoteStore + ChangeFeed,
    T: Table + PartialEq + 'static,
{
    /// Subscribe to the current owner's rows, then fetch them.
    ///
    /// The subscription is handed to the session for teardown. If the fetch
    /// fails the subscription is closed and the error returned.
    pub fn open(ctx: &SessionContext<S>) -> Result<Self, SyncError> {
        let owner_id = ctx.require_owner()?;
        let store = ctx.shared_store();
        let filter = FeedFilter::table(T::TABLE).owned_by(owner_id.clone());
        let subscription = store.subscribe(filter)?;
        ctx.track(subscription.handle())?;
        debug!(table = T::TABLE, owner = %owner_id, "feed subscribed");

        let collection = Self {
            store,
            owner_id,
            cache: Arc::new(ReconcilingCache::new()),
            subscription,
        };

        let rows = match collection.store.table::<T>().list(&collection.owner_id) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table = T::TABLE, error = %e, "initial fetch failed");
                collection.close();
                return Err(e);
            }
        };

        // Anything that arrived during the fetch goes to the cache's buffer.
        let buffered = collection.pump()?;
        let fetched = rows.len();
        let replayed = collection.cache.replace_all(rows)?;
        info!(
            table = T::TABLE,
            owner = %collection.owner_id,
            fetched,
            buffered,
            replayed,
            "collection opened"
        );
        Ok(collection)
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &Arc<ReconcilingCache<Row<T>>> {
        &self.cache
    }

    /// The current rows, newest first.
    pub fn snapshot(&self) -> Result<Arc<Vec<Row<T>>>, SyncError> {
        self.cache.snapshot()
    }

    /// Apply every change already delivered. Returns how many were taken
    /// from the feed; 0 once closed.
    pub fn pump(&self) -> Result<usize, SyncError> {
        let mut taken = 0;
        while let Some(change) = self.subscription.try_next() {
            self.apply_change(change)?;
            taken += 1;
        }
        Ok(taken)
    }

    /// Block up to `timeout` for the next change, then apply it together
    /// with anything else pending. Returns how many were applied.
    pub fn wait(&self, timeout: Duration) -> Result<usize, SyncError> {
        match self.subscription.next_timeout(timeout)? {
            Some(change) => {
                self.apply_change(change)?;
                Ok(1 + self.pump()?)
            }
            None => Ok(0),
        }
    }

    /// Fetch again and replace the contents.
    pub fn refresh(&self) -> Result<usize, SyncError> {
        let rows = self.store.table::<T>().list(&self.owner_id)?;
        let count = rows.len();
        self.cache.replace_all(rows)?;
        debug!(table = T::TABLE, count, "collection refreshed");
        Ok(count)
    }

    /// Splice the acting client's own write in without waiting for its echo.
    pub fn apply_local(&self, event: ChangeEvent<Row<T>>) -> Result<Applied, SyncError> {
        self.cache.apply(event)
    }

    pub fn on_change<F>(&self, listener: F) -> Result<String, SyncError>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.cache.on_change(listener)
    }

    pub fn remove_listener(&self, id: &str) -> Result<bool, SyncError> {
        self.cache.remove_listener(id)
    }

    /// Stop following the feed. Safe to call repeatedly; returns true only
    /// for the call that released the subscription.
    pub fn close(&self) -> bool {
        let released = self.subscription.close();
        if released {
            debug!(table = T::TABLE, owner = %self.owner_id, "feed closed");
        }
        released
    }

    pub fn is_closed(&self) -> bool {
        self.subscription.is_closed()
    }

    fn apply_change(&self, change: RowChange) -> Result<Applied, SyncError> {
        let event = ChangeEvent::from_row_change(change)?.decode::<T>()?;
        self.cache.apply(event)
    }
}
