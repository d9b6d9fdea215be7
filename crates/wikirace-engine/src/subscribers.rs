//! Snapshot subscribers
//!
//! Callbacks are invoked synchronously, one at a time. A panicking callback is
//! logged and skipped; the remaining subscribers still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;
use wikirace_core::TaskSnapshot;

type Callback = Box<dyn Fn(&TaskSnapshot) + Send + Sync>;

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct SubscriberList {
    next_id: u64,
    entries: Vec<(SubscriptionId, Callback)>,
}

impl SubscriberList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&TaskSnapshot) + Send + Sync + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Notify every subscriber. Returns how many panicked.
    pub fn notify(&self, snapshot: &TaskSnapshot) -> usize {
        let mut failed = 0;
        for (id, callback) in &self.entries {
            if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
                error!("Subscriber {:?} panicked during notification", id);
                failed += 1;
            }
        }
        failed
    }
}

impl std::fmt::Debug for SubscriberList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberList")
            .field("subscribers", &self.entries.len())
            .finish()
    }
}
