//! In-process change notification for resource families.
//!
//! # Responsibility
//! - Keep the set of observers interested in family changes.
//! - Deliver one event per successful write, best effort.
//!
//! # Invariants
//! - Notifying with no observers is a no-op.
//! - Observer failures never reach the writer that triggered them.
//! - The registry lock is not held while observers run.

use crate::contract::{Resource, ResourceUri};
use log::{debug, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Handle returned by `register`, used to unregister.
pub type ObserverId = u64;

/// "This family changed", plus the uri the write went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub resource: Resource,
    pub uri: ResourceUri,
}

/// Families an observer wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverScope {
    Family(Resource),
    All,
}

impl ObserverScope {
    fn covers(self, resource: Resource) -> bool {
        match self {
            Self::Family(family) => family == resource,
            Self::All => true,
        }
    }
}

pub trait ChangeObserver: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

impl<F> ChangeObserver for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) {
        self(event)
    }
}

struct Registration {
    id: ObserverId,
    scope: ObserverScope,
    observer: Arc<dyn ChangeObserver>,
}

/// Observer registry shared by a provider and its callers.
#[derive(Default)]
pub struct ChangeNotifier {
    next_id: AtomicU64,
    observers: Mutex<Vec<Registration>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, scope: ObserverScope, observer: Arc<dyn ChangeObserver>) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Registration {
            id,
            scope,
            observer,
        });
        id
    }

    /// Returns whether `id` was registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|registration| registration.id != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.lock().len()
    }

    /// Delivers `event` to every matching observer; returns how many ran cleanly.
    pub fn notify(&self, event: &ChangeEvent) -> usize {
        let targets = self
            .lock()
            .iter()
            .filter(|registration| registration.scope.covers(event.resource))
            .map(|registration| (registration.id, Arc::clone(&registration.observer)))
            .collect::<Vec<_>>();

        let mut delivered = 0;
        for (id, observer) in &targets {
            match catch_unwind(AssertUnwindSafe(|| observer.on_change(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(
                    "event=change_notify module=notify status=error observer_id={id} uri={}",
                    event.uri
                ),
            }
        }
        debug!(
            "event=change_notify module=notify status=ok uri={} observers={} delivered={delivered}",
            event.uri,
            targets.len()
        );
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Registration>> {
        // Observers run outside this lock; a poisoned list is still consistent.
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
