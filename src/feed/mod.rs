//! Change Feed - push delivery of row-level insert/update/delete notifications.
//!
//! A subscription is established with a `FeedFilter` and yields `RowChange`s
//! until it is closed. Deletes carry only the row id, because the upstream
//! feed emits them after the row is gone; a delete is therefore delivered to
//! every subscriber of the table regardless of the owner filter.
//!
//! ```ignore
//! let mut sub = store.subscribe(FeedFilter::table("tasks").owned_by("user-1"))?;
//! while let Some(change) = sub.try_next() {
//!     cache.apply(ChangeEvent::from_row_change(change)?)?;
//! }
//! sub.close();
//! ```

mod hub;
mod subscription;

use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::remote::RemoteError;

pub use hub::FeedHub;
pub use subscription::{FeedSubscription, SubscriptionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// The identity of a row that no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowKey {
    pub id: String,
}

/// One notification as the upstream feed delivers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub kind: ChangeKind,
    pub table: String,
    /// Present on deletes, and only carries the id.
    pub old: Option<RowKey>,
    /// Present on inserts and updates.
    pub new: Option<Record>,
}

impl RowChange {
    pub fn inserted(table: impl Into<String>, record: Record) -> Self {
        Self {
            kind: ChangeKind::Insert,
            table: table.into(),
            old: None,
            new: Some(record),
        }
    }

    pub fn updated(table: impl Into<String>, record: Record) -> Self {
        Self {
            kind: ChangeKind::Update,
            table: table.into(),
            old: None,
            new: Some(record),
        }
    }

    pub fn deleted(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            table: table.into(),
            old: Some(RowKey { id: id.into() }),
            new: None,
        }
    }

    /// Id of the affected row, whichever side carries it.
    pub fn row_id(&self) -> Option<&str> {
        match (&self.new, &self.old) {
            (Some(record), _) => Some(&record.id),
            (None, Some(key)) => Some(&key.id),
            (None, None) => None,
        }
    }
}

/// Server-side filter of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFilter {
    pub table: String,
    pub owner_id: Option<String>,
}

impl FeedFilter {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            owner_id: None,
        }
    }

    pub fn owned_by(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Inserts and updates must match table and owner; deletes only the table.
    pub fn matches(&self, change: &RowChange) -> bool {
        if change.table != self.table {
            return false;
        }
        match (change.kind, &self.owner_id, &change.new) {
            (ChangeKind::Delete, _, _) => true,
            (_, None, _) => true,
            (_, Some(owner), Some(record)) => &record.owner_id == owner,
            (_, Some(_), None) => false,
        }
    }
}

/// A source of row-level change notifications.
pub trait ChangeFeed: Send + Sync {
    /// Start receiving changes that pass `filter`. Changes are buffered from
    /// this call on, whether or not the subscriber is polling yet.
    fn subscribe(&self, filter: FeedFilter) -> Result<FeedSubscription, RemoteError>;
}
