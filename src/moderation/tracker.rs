//! Per-actor state tracker
//!
//! Every read-modify-write of an actor's state happens inside an
//! [`ActorSession`], which holds that actor's lock from load until commit.
//! Sessions for different actors never contend. A session that is dropped
//! without [`ActorSession::commit`] writes nothing.

use crate::moderation::{ActorKey, ActorState, ActorStateStore, ModerationResult};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::error;

/// Serializes access to actor states, keyed by `(group, actor)`
pub struct ActorTracker {
    store: Arc<dyn ActorStateStore>,
    locks: DashMap<ActorKey, Arc<Mutex<()>>>,
}

impl ActorTracker {
    #[must_use]
    pub fn new(store: Arc<dyn ActorStateStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ActorStateStore> {
        &self.store
    }

    /// Take exclusive access to one actor and load its state
    ///
    /// # Errors
    /// Returns a store error if the state cannot be loaded; the lock is released.
    pub async fn acquire(&self, key: ActorKey) -> ModerationResult<ActorSession<'_>> {
        let lock = Arc::clone(self.locks.entry(key).or_default().value());
        let guard = lock.lock_owned().await;

        let mut session = ActorSession {
            tracker: self,
            key,
            state: ActorState::new(key),
            cleared: false,
            guard: Some(guard),
        };

        let mut state = self.store.get_or_create(key).await?;
        let fixed = state.sanitize();
        if !fixed.is_empty() {
            let violations: Vec<String> = fixed.iter().map(ToString::to_string).collect();
            error!(
                group_id = %key.group,
                user_id = %key.actor,
                violations = ?violations,
                "Actor state violated its invariants and was clamped"
            );
        }
        session.state = state;
        Ok(session)
    }

    /// Run a synchronous mutation under the actor's lock and persist it
    ///
    /// # Errors
    /// Returns a store error if loading or persisting fails.
    pub async fn with_actor<R>(
        &self,
        key: ActorKey,
        f: impl FnOnce(&mut ActorState) -> R,
    ) -> ModerationResult<R> {
        let mut session = self.acquire(key).await?;
        let result = f(session.state_mut());
        session.commit().await?;
        Ok(result)
    }

    /// Number of actors with a live lock entry
    #[must_use]
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    fn release(&self, key: ActorKey) {
        self.locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Exclusive, uncommitted view of one actor's state
pub struct ActorSession<'t> {
    tracker: &'t ActorTracker,
    key: ActorKey,
    state: ActorState,
    cleared: bool,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ActorSession<'_> {
    #[must_use]
    pub fn key(&self) -> ActorKey {
        self.key
    }

    #[must_use]
    pub fn state(&self) -> &ActorState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ActorState {
        &mut self.state
    }

    /// Reset the actor; the stored state is deleted on commit
    pub fn clear(&mut self) {
        self.cleared = true;
        self.state = ActorState::new(self.key);
    }

    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    /// Persist the session's state exactly once and release the lock
    ///
    /// # Errors
    /// Returns a store error if the write fails.
    pub async fn commit(self) -> ModerationResult<()> {
        let store = &self.tracker.store;
        if self.cleared {
            store.remove(self.key).await?;
        } else {
            store.save(&self.state).await?;
        }
        Ok(())
    }
}

impl Drop for ActorSession<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.tracker.release(self.key);
    }
}
