//! FeedHub - process-local fan-out of row changes to subscribers.

use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};

use tracing::debug;

use super::{FeedFilter, FeedSubscription, RowChange};
use crate::remote::RemoteError;

struct Subscriber {
    filter: FeedFilter,
    sender: mpsc::Sender<RowChange>,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

/// Registry of live subscriptions.
///
/// Each subscriber gets its own unbounded channel, so a change published
/// while nobody is polling waits in that subscriber's buffer.
#[derive(Default)]
pub struct FeedHub {
    state: Mutex<HubState>,
}

impl FeedHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a subscriber. Changes published from now on are buffered for it.
    pub fn subscribe(self: &Arc<Self>, filter: FeedFilter) -> Result<FeedSubscription, RemoteError> {
        let (sender, receiver) = mpsc::channel();
        let mut state = self
            .state
            .lock()
            .map_err(|_| RemoteError::transport("feed hub lock poisoned"))?;

        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.insert(
            id,
            Subscriber {
                filter: filter.clone(),
                sender,
            },
        );
        debug!(subscription = id, table = %filter.table, owner = ?filter.owner_id, "feed subscribed");

        Ok(FeedSubscription::new(id, filter, receiver, Arc::clone(self)))
    }

    /// Deliver a change to every matching subscriber. Returns how many got it.
    ///
    /// Subscribers whose receiving side is gone are pruned.
    pub fn publish(&self, change: &RowChange) -> Result<usize, RemoteError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| RemoteError::transport("feed hub lock poisoned"))?;

        let mut delivered = 0;
        let mut gone = Vec::new();
        for (id, subscriber) in state.subscribers.iter() {
            if !subscriber.filter.matches(change) {
                continue;
            }
            if subscriber.sender.send(change.clone()).is_ok() {
                delivered += 1;
            } else {
                gone.push(*id);
            }
        }
        for id in gone {
            state.subscribers.remove(&id);
        }

        Ok(delivered)
    }

    /// Drop a subscriber's channel. Returns true if it was still registered.
    pub(crate) fn release(&self, id: u64) -> bool {
        match self.state.lock() {
            Ok(mut state) => state.subscribers.remove(&id).is_some(),
            Err(poisoned) => poisoned.into_inner().subscribers.remove(&id).is_some(),
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        match self.state.lock() {
            Ok(state) => state.subscribers.len(),
            Err(poisoned) => poisoned.into_inner().subscribers.len(),
        }
    }
}
