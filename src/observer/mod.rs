//! Fan-out of mirror transitions to interested parties.
//!
//! Two delivery paths exist:
//! - registered [`Observer`] callbacks, awaited one after another by the
//!   updater before it moves on to the next delta
//! - a broadcast channel ([`ObserverRegistry::subscribe`]) for consumers that
//!   prefer to pull events at their own pace; slow receivers lag instead of
//!   blocking the updater

use crate::delta::{ChangeKind, EntityKind};
use crate::state::ChangeEvent;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Handle returned by [`ObserverRegistry::add`], used to unregister.
pub type ObserverId = Uuid;

/// Callback invoked for every matching transition.
///
/// Observers run inline in the updater loop: the next delta is not applied
/// until every matching observer has returned. An observer that never
/// returns stalls synchronization.
#[async_trait]
pub trait Observer: Send + Sync {
    async fn on_change(&self, event: &ChangeEvent);
}

#[async_trait]
impl<F> Observer for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    async fn on_change(&self, event: &ChangeEvent) {
        (self)(event)
    }
}

/// Restricts which events reach an observer. Unset fields match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObserverFilter {
    pub kind: Option<EntityKind>,
    pub change: Option<ChangeKind>,
    pub id: Option<String>,
}

impl ObserverFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn change(mut self, change: ChangeKind) -> Self {
        self.change = Some(change);
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.kind.map_or(true, |k| k == event.kind)
            && self.change.map_or(true, |c| c == event.change)
            && self.id.as_deref().map_or(true, |id| id == event.id)
    }
}

struct Registration {
    id: ObserverId,
    filter: ObserverFilter,
    observer: Arc<dyn Observer>,
}

/// Registry of observers plus the broadcast channel for change events
pub struct ObserverRegistry {
    registrations: RwLock<Vec<Registration>>,
    events_tx: broadcast::Sender<ChangeEvent>,
}

impl ObserverRegistry {
    pub fn new(channel_capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            registrations: RwLock::new(Vec::new()),
            events_tx,
        }
    }

    /// Register an observer; it only sees events matching `filter`.
    pub fn add<O>(&self, filter: ObserverFilter, observer: O) -> ObserverId
    where
        O: Observer + 'static,
    {
        let id = Uuid::new_v4();
        self.registrations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Registration {
                id,
                filter,
                observer: Arc::new(observer),
            });
        id
    }

    /// Unregister an observer. Returns false if the id was unknown.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut registrations = self.registrations.write().unwrap_or_else(|e| e.into_inner());
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    pub fn len(&self) -> usize {
        self.registrations.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to every change event
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events_tx.subscribe()
    }

    /// Invoke matching observers in registration order, then broadcast.
    pub async fn notify(&self, event: ChangeEvent) {
        // Collect first so the lock is not held across an await
        let matching: Vec<Arc<dyn Observer>> = self
            .registrations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.filter.matches(&event))
            .map(|r| Arc::clone(&r.observer))
            .collect();

        for observer in matching {
            observer.on_change(&event).await;
        }

        // No receivers is fine
        let _ = self.events_tx.send(event);
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new(1000)
    }
}
