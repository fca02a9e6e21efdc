//! Shared switch state and opt-in registry.
//!
//! One `RwLock` guards both fields. Both are low-frequency writes (a switch
//! flip, a slash command) so a single lock keeps the model simple. Critical
//! sections never perform IO and never await.

use std::collections::HashSet;
use std::mem;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use switchwatch_types::{SubscriberId, SwitchState};

#[derive(Debug, Default)]
struct RegistryInner {
    state: SwitchState,
    subscribers: HashSet<SubscriberId>,
}

/// Process-wide view of the switch, shared by the monitor and HTTP handlers
/// through an `Arc`.
#[derive(Debug, Default)]
pub struct StateRegistry {
    inner: RwLock<RegistryInner>,
}

impl StateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A writer that panicked mid-update cannot leave either field half-written,
    // so poisoning is ignored rather than propagated.
    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn get(&self) -> SwitchState {
        self.read().state
    }

    /// Store `state`, returning the value it replaced.
    pub fn set(&self, state: SwitchState) -> SwitchState {
        mem::replace(&mut self.write().state, state)
    }

    /// Add `id` to the opt-in set. Returns `false` if it was already present.
    pub fn opt_in(&self, id: SubscriberId) -> bool {
        self.write().subscribers.insert(id)
    }

    #[must_use]
    pub fn is_opted_in(&self, id: &SubscriberId) -> bool {
        self.read().subscribers.contains(id)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.read().subscribers.len()
    }

    /// Sorted snapshot of opted-in subscribers.
    #[must_use]
    pub fn subscribers(&self) -> Vec<SubscriberId> {
        let mut ids: Vec<SubscriberId> = self.read().subscribers.iter().cloned().collect();
        ids.sort();
        ids
    }
}
