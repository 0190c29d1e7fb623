//! Synchronization of server-side test state.
//!
//! The [`StateManager`] keeps the client's belief about what the service
//! currently has configured (cache freshness, mocked time, enabled
//! testpoints) and reconciles it with what the running test wants:
//!
//! ```text
//!   oracles ──► desired State ──┐
//!                               ├── diff ──► ControlUpdate ──► POST control
//!   current State ──────────────┘                 │
//!        ▲                                        ▼
//!        └──── commit / rollback ◄──── StateTransaction
//! ```
//!
//! `diff` and `apply` are pure functions over immutable snapshots; the
//! transaction swaps snapshots around the single network call.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::fixtures::{MockedTimeSource, TestpointControl, TestpointRegistry};
use crate::sync::lock;

mod update;

pub use update::{CacheInvalidation, ControlUpdate, UpdateType};

/// A value the client either knows or has never synchronized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Observed<T> {
    #[default]
    Unknown,
    Known(T),
}

impl<T> Observed<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Observed::Known(value) => Some(value),
            Observed::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Observed::Unknown)
    }
}

/// Snapshot of server-side test state.
///
/// The default snapshot is fully unknown and dirty, so the first
/// reconciliation sends everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub caches_invalidated: bool,
    /// `Known(None)` means mocked time is disabled on the server.
    pub now: Observed<Option<String>>,
    pub testpoints: Observed<BTreeSet<String>>,
}

impl State {
    /// State after the service accepts `update`.
    pub fn apply(&self, update: &ControlUpdate) -> State {
        let mut next = self.clone();

        if update
            .invalidate_caches
            .as_ref()
            .is_some_and(CacheInvalidation::is_complete)
        {
            next.caches_invalidated = true;
        }

        if let Some(now) = &update.mock_now {
            next.now = Observed::Known(now.clone());
        }

        if let Some(testpoints) = &update.testpoints {
            next.testpoints = Observed::Known(testpoints.iter().cloned().collect());
        }

        next
    }

    /// Minimal update moving the service from `self` to `desired`.
    pub fn diff(&self, desired: &State, cache_blocklist: &[String]) -> ControlUpdate {
        let mut update = ControlUpdate::new();

        if self.caches_invalidated != desired.caches_invalidated {
            update.invalidate_caches =
                Some(CacheInvalidation::full_except(cache_blocklist.to_vec()));
        }

        if self.testpoints != desired.testpoints {
            if let Observed::Known(testpoints) = &desired.testpoints {
                update.testpoints = Some(testpoints.iter().cloned().collect());
            }
        }

        if self.now != desired.now {
            if let Observed::Known(now) = &desired.now {
                update.mock_now = Some(now.clone());
            }
        }

        update
    }
}

/// Format a mocked timestamp the way the service parses it.
pub fn timestring(stamp: DateTime<Utc>) -> String {
    stamp.format("%Y-%m-%dT%H:%M:%S%.6f%z").to_string()
}

/// Owner of the client's [`State`].
pub struct StateManager {
    state: Mutex<State>,
    mocked_time: Arc<dyn MockedTimeSource>,
    testpoints: Arc<dyn TestpointRegistry>,
    testpoint_control: Arc<dyn TestpointControl>,
    cache_blocklist: Vec<String>,
}

impl StateManager {
    pub fn new(
        mocked_time: Arc<dyn MockedTimeSource>,
        testpoints: Arc<dyn TestpointRegistry>,
        testpoint_control: Arc<dyn TestpointControl>,
        cache_blocklist: Vec<String>,
    ) -> Self {
        Self {
            state: Mutex::new(State::default()),
            mocked_time,
            testpoints,
            testpoint_control,
            cache_blocklist,
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> State {
        lock(&self.state, "state manager").clone()
    }

    pub fn cache_blocklist(&self) -> &[String] {
        &self.cache_blocklist
    }

    /// What the running test wants the service to look like.
    pub fn desired_state(&self) -> State {
        let now = if self.mocked_time.is_enabled() {
            Some(timestring(self.mocked_time.now()))
        } else {
            None
        };
        State {
            caches_invalidated: true,
            now: Observed::Known(now),
            testpoints: Observed::Known(self.testpoints.keys().into_iter().collect()),
        }
    }

    /// Update to send before the next request; empty when in sync.
    pub fn get_pending_update(&self) -> ControlUpdate {
        let desired = self.desired_state();
        self.state().diff(&desired, &self.cache_blocklist)
    }

    /// Install the state `update` leads to and return a transaction that
    /// restores the previous state unless committed.
    ///
    /// At most one transaction may be open per manager.
    #[must_use = "dropping the transaction rolls the state back immediately"]
    pub fn updating_state(&self, update: &ControlUpdate) -> StateTransaction<'_> {
        let saved = {
            let mut state = lock(&self.state, "state manager");
            let next = state.apply(update);
            std::mem::replace(&mut *state, next)
        };
        self.apply_new_state();
        StateTransaction {
            manager: self,
            saved: Some(saved),
        }
    }

    fn restore(&self, saved: State) {
        *lock(&self.state, "state manager") = saved;
        self.apply_new_state();
    }

    /// Push the current state into dependent collaborators.
    fn apply_new_state(&self) {
        let testpoints = self.state().testpoints;
        self.testpoint_control.set_enabled_testpoints(&testpoints);
    }
}

/// Open state transition; see [`StateManager::updating_state`].
///
/// Dropped without [`commit`](Self::commit) (error, panic or cancelled
/// future) it reinstalls the saved snapshot.
pub struct StateTransaction<'a> {
    manager: &'a StateManager,
    saved: Option<State>,
}

impl StateTransaction<'_> {
    /// Keep the new state.
    pub fn commit(mut self) {
        self.saved = None;
        debug!("Testsuite state committed");
    }
}

impl Drop for StateTransaction<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            warn!("Testsuite state update failed, rolling back local state");
            self.manager.restore(saved);
        }
    }
}
