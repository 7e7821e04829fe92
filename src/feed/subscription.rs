//! FeedSubscription - a cancellable handle on a live change feed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use tracing::debug;

use super::{FeedFilter, FeedHub, RowChange};
use crate::remote::RemoteError;

struct SubscriptionState {
    id: u64,
    hub: Arc<FeedHub>,
    closed: AtomicBool,
}

impl SubscriptionState {
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.hub.release(self.id);
        debug!(subscription = self.id, "feed subscription closed");
        true
    }
}

/// Cloneable close-capability for a subscription.
///
/// Lets a session tear down subscriptions it does not own.
#[derive(Clone)]
pub struct SubscriptionHandle {
    state: Arc<SubscriptionState>,
}

impl SubscriptionHandle {
    /// Release the subscription. Returns true only for the call that released it.
    pub fn close(&self) -> bool {
        self.state.close()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }
}

/// A live subscription. Buffered changes are yielded in delivery order until
/// the subscription is closed; after that nothing more is yielded.
///
/// Dropping the subscription closes it.
pub struct FeedSubscription {
    state: Arc<SubscriptionState>,
    filter: FeedFilter,
    receiver: mpsc::Receiver<RowChange>,
}

impl FeedSubscription {
    pub(crate) fn new(
        id: u64,
        filter: FeedFilter,
        receiver: mpsc::Receiver<RowChange>,
        hub: Arc<FeedHub>,
    ) -> Self {
        Self {
            state: Arc::new(SubscriptionState {
                id,
                hub,
                closed: AtomicBool::new(false),
            }),
            filter,
            receiver,
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }

    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Next buffered change, without blocking.
    pub fn try_next(&self) -> Option<RowChange> {
        if self.is_closed() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next change. `Ok(None)` on timeout or
    /// once closed.
    pub fn next_timeout(&self, timeout: Duration) -> Result<Option<RowChange>, RemoteError> {
        if self.is_closed() {
            return Ok(None);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(change) if !self.is_closed() => Ok(Some(change)),
            Ok(_) => Ok(None),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                if self.is_closed() {
                    Ok(None)
                } else {
                    Err(RemoteError::transport("change feed disconnected"))
                }
            }
        }
    }

    /// Release the channel. Safe to call any number of times; returns true
    /// only for the call that released it.
    pub fn close(&self) -> bool {
        self.state.close()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.state.close();
    }
}
