use super::*;
use crate::state::Entity;
use serde_json::Map;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn event(kind: EntityKind, change: ChangeKind, id: &str) -> ChangeEvent {
    let entity = Entity::new(kind, id, Map::new());
    let new = (change != ChangeKind::Remove).then(|| entity.clone());
    let old = (change != ChangeKind::Add).then_some(entity);
    ChangeEvent::new(kind, change, id, old, new)
}

#[test]
fn test_filter_matches_unset_fields() {
    let any = ObserverFilter::any();
    assert!(any.matches(&event(EntityKind::Unit, ChangeKind::Add, "a/0")));

    let units = ObserverFilter::any().kind(EntityKind::Unit);
    assert!(units.matches(&event(EntityKind::Unit, ChangeKind::Remove, "a/0")));
    assert!(!units.matches(&event(EntityKind::Machine, ChangeKind::Remove, "0")));

    let specific = ObserverFilter::any()
        .kind(EntityKind::Unit)
        .change(ChangeKind::Change)
        .id("a/0");
    assert!(specific.matches(&event(EntityKind::Unit, ChangeKind::Change, "a/0")));
    assert!(!specific.matches(&event(EntityKind::Unit, ChangeKind::Change, "a/1")));
    assert!(!specific.matches(&event(EntityKind::Unit, ChangeKind::Add, "a/0")));
}

#[tokio::test]
async fn test_notify_invokes_matching_observers_only() {
    let registry = ObserverRegistry::new(16);
    let units = Arc::new(AtomicUsize::new(0));
    let everything = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&units);
    registry.add(ObserverFilter::any().kind(EntityKind::Unit), move |_: &ChangeEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&everything);
    registry.add(ObserverFilter::any(), move |_: &ChangeEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    registry.notify(event(EntityKind::Unit, ChangeKind::Add, "a/0")).await;
    registry.notify(event(EntityKind::Machine, ChangeKind::Add, "0")).await;

    assert_eq!(units.load(Ordering::SeqCst), 1);
    assert_eq!(everything.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_observers_run_in_registration_order() {
    let registry = ObserverRegistry::new(16);
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        registry.add(ObserverFilter::any(), move |_: &ChangeEvent| {
            order.lock().unwrap().push(name);
        });
    }

    registry.notify(event(EntityKind::Application, ChangeKind::Add, "a")).await;
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_removed_observer_is_not_called() {
    let registry = ObserverRegistry::new(16);
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let id = registry.add(ObserverFilter::any(), move |_: &ChangeEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(registry.len(), 1);

    assert!(registry.remove(id));
    assert!(!registry.remove(id));
    assert!(registry.is_empty());

    registry.notify(event(EntityKind::Unit, ChangeKind::Add, "a/0")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_async_observer_is_awaited() {
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Observer for Recorder {
        async fn on_change(&self, event: &ChangeEvent) {
            tokio::task::yield_now().await;
            self.seen.lock().unwrap().push(event.id.clone());
        }
    }

    let registry = ObserverRegistry::new(16);
    let recorder = Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
    });

    struct Shared(Arc<Recorder>);

    #[async_trait]
    impl Observer for Shared {
        async fn on_change(&self, event: &ChangeEvent) {
            self.0.on_change(event).await
        }
    }

    registry.add(ObserverFilter::any(), Shared(Arc::clone(&recorder)));
    registry.notify(event(EntityKind::Unit, ChangeKind::Add, "a/0")).await;

    // notify only returns once the observer finished
    assert_eq!(*recorder.seen.lock().unwrap(), vec!["a/0".to_string()]);
}

#[tokio::test]
async fn test_subscribers_receive_broadcast() {
    let registry = ObserverRegistry::new(16);
    let mut rx = registry.subscribe();

    registry.notify(event(EntityKind::Relation, ChangeKind::Remove, "3")).await;

    let received = rx.try_recv().unwrap();
    assert_eq!(received.kind, EntityKind::Relation);
    assert_eq!(received.change, ChangeKind::Remove);
    assert_eq!(received.id, "3");
    assert!(received.is_removal());
}

#[tokio::test]
async fn test_notify_without_subscribers_does_not_fail() {
    let registry = ObserverRegistry::default();
    registry.notify(event(EntityKind::Model, ChangeKind::Change, "uuid")).await;
}
