//! SessionContext - the value threaded to every component that needs the
//! current owner or remote access.
//!
//! Created once at process start, it carries the store handle, the
//! configuration and the current identity, and it owns the teardown of every
//! change-feed subscription opened on the session's behalf.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use event_emitter_rs::EventEmitter;
use tracing::{info, warn};

use super::Session;
use crate::config::Config;
use crate::error::SyncError;
use crate::feed::SubscriptionHandle;

const IDENTITY_EVENT: &str = "identity";

/// The per-process session context.
///
/// Generic over `S` (the store type) so every component works against
/// whatever store the process was configured with.
///
/// ## Example
///
/// ```ignore
/// let ctx = SessionContext::new(store, Config::default(), Session::signed_in("user-1"));
/// let tasks = TaskList::open(&ctx)?;
/// // ...
/// ctx.teardown(); // closes every feed subscription, safe to repeat
/// ```
pub struct SessionContext<S> {
    store: Arc<S>,
    config: Config,
    session: RwLock<Session>,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
    emitter: Mutex<EventEmitter>,
    torn_down: AtomicBool,
}

impl<S> SessionContext<S> {
    /// Create a context owning `store`.
    pub fn new(store: S, config: Config, session: Session) -> Self {
        Self::with_shared_store(Arc::new(store), config, session)
    }

    /// Create a context over a store shared with other components.
    pub fn with_shared_store(store: Arc<S>, config: Config, session: Session) -> Self {
        Self {
            store,
            config,
            session: RwLock::new(session),
            subscriptions: Mutex::new(Vec::new()),
            emitter: Mutex::new(EventEmitter::new()),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a shared handle to the store.
    pub fn shared_store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A copy of the current session.
    pub fn session(&self) -> Result<Session, SyncError> {
        self.session
            .read()
            .map(|s| s.clone())
            .map_err(|_| SyncError::LockPoisoned("session read"))
    }

    /// The current owner, if anyone is signed in.
    pub fn owner_id(&self) -> Result<Option<String>, SyncError> {
        Ok(self.session()?.owner_id().map(str::to_string))
    }

    /// The current owner. Returns `Unauthenticated` if nobody is signed in.
    pub fn require_owner(&self) -> Result<String, SyncError> {
        self.owner_id()?.ok_or(SyncError::Unauthenticated)
    }

    /// Swap in a new identity. Returns true if the owner changed.
    ///
    /// Subscriptions opened for the previous owner are closed, and identity
    /// observers are notified with the new owner.
    pub fn set_identity(&self, session: Session) -> Result<bool, SyncError> {
        let new_owner = session.owner_id().map(str::to_string);
        let changed = {
            let mut current = self
                .session
                .write()
                .map_err(|_| SyncError::LockPoisoned("session write"))?;
            let changed = current.owner_id() != new_owner.as_deref();
            *current = session;
            changed
        };

        if !changed {
            return Ok(false);
        }

        let released = self.close_tracked();
        info!(owner = ?new_owner, released, "session identity changed");

        let handles = {
            let mut emitter = self
                .emitter
                .lock()
                .map_err(|_| SyncError::LockPoisoned("identity listeners"))?;
            emitter.emit(IDENTITY_EVENT, new_owner)
        };
        for handle in handles {
            if handle.join().is_err() {
                warn!("identity observer panicked");
            }
        }
        Ok(true)
    }

    /// Register an observer called with the new owner after each change.
    pub fn on_identity_change<F>(&self, listener: F) -> Result<String, SyncError>
    where
        F: Fn(Option<String>) + Send + Sync + 'static,
    {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| SyncError::LockPoisoned("identity listeners"))?;
        Ok(emitter.on(IDENTITY_EVENT, listener))
    }

    /// Hand a subscription to the session for teardown. A handle tracked
    /// after teardown is closed right away.
    pub fn track(&self, handle: SubscriptionHandle) -> Result<(), SyncError> {
        if self.is_torn_down() {
            handle.close();
            return Ok(());
        }
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| SyncError::LockPoisoned("session subscriptions"))?;
        subscriptions.retain(|h| !h.is_closed());
        subscriptions.push(handle);
        Ok(())
    }

    /// Number of tracked subscriptions still open.
    pub fn active_subscriptions(&self) -> usize {
        match self.subscriptions.lock() {
            Ok(subscriptions) => subscriptions.iter().filter(|h| !h.is_closed()).count(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .filter(|h| !h.is_closed())
                .count(),
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Close every tracked subscription. Safe to call repeatedly; returns how
    /// many subscriptions this call released.
    pub fn teardown(&self) -> usize {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let released = self.close_tracked();
        info!(released, "session torn down");
        released
    }

    fn close_tracked(&self) -> usize {
        let handles: Vec<SubscriptionHandle> = match self.subscriptions.lock() {
            Ok(mut subscriptions) => subscriptions.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        handles.iter().filter(|h| h.close()).count()
    }
}

impl<S> Drop for SessionContext<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
