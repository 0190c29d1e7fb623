//! Periodic-task suspension bookkeeping.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Shared handle to [`PeriodicTasksState`], owned by the test session.
pub type SharedPeriodicTasks = Arc<Mutex<PeriodicTasksState>>;

/// Which periodic tasks should be suspended and which the service has
/// confirmed as suspended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodicTasksState {
    pub suspended_tasks: BTreeSet<String>,
    pub tasks_to_suspend: BTreeSet<String>,
}

impl PeriodicTasksState {
    pub fn new() -> Self {
        Self::default()
    }

    /// New shared handle for a test session.
    pub fn shared() -> SharedPeriodicTasks {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn suspend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tasks_to_suspend
            .extend(names.into_iter().map(Into::into));
    }

    pub fn resume<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.tasks_to_suspend.remove(name.as_ref());
        }
    }

    pub fn resume_all(&mut self) {
        self.tasks_to_suspend.clear();
    }

    /// True when the service already has the desired set suspended.
    pub fn is_synced(&self) -> bool {
        self.tasks_to_suspend == self.suspended_tasks
    }

    /// Sorted desired set when the service must be told about it.
    pub fn pending_suspension(&self) -> Option<Vec<String>> {
        if self.is_synced() {
            None
        } else {
            Some(self.tasks_to_suspend.iter().cloned().collect())
        }
    }

    /// Record that the service now has exactly `names` suspended.
    pub fn mark_synced(&mut self, names: &[String]) {
        self.suspended_tasks = names.iter().cloned().collect();
    }
}
