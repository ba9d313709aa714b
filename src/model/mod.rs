//! The model session: mirror, observers and the updater that feeds them.

use crate::config::{StrategyChoice, SyncConfig};
use crate::connection::Connection;
use crate::delta::EntityKind;
use crate::error::SyncError;
use crate::observer::{Observer, ObserverFilter, ObserverId, ObserverRegistry};
use crate::state::{ChangeEvent, Entity, StateMirror};
use crate::status::StateDiffer;
use crate::updater::{Strategy, Updater, UpdaterState};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{info, warn};


/// What the updater needs from the session that owns it.
#[async_trait]
pub trait Session: Send + Sync {
    fn connection(&self) -> Arc<dyn Connection>;

    fn model_uuid(&self) -> &str;

    /// Undecodable deltas are fatal when true
    fn strict_mode(&self) -> bool;

    fn set_mode(&self, mode: &str);

    fn mirror(&self) -> &StateMirror;

    /// Hand one transition to the observers. Awaited before the next delta.
    async fn notify_observers(&self, event: ChangeEvent);

    /// Called after every applied batch
    fn mark_data_received(&self);
}

/// Local view of one remote model.
///
/// Wrap in an `Arc` to start syncing. The updater only holds a weak
/// reference back, so dropping the last `Arc` also ends synchronization.
pub struct Model {
    connection: Arc<dyn Connection>,
    uuid: String,
    config: SyncConfig,
    mirror: StateMirror,
    observers: ObserverRegistry,
    mode: RwLock<Option<String>>,
    data_received: watch::Sender<bool>,
    updater: Mutex<Option<Updater>>,
    /// Polling snapshot shared by every updater this model starts
    differ: Arc<Mutex<StateDiffer>>,
}

impl Model {
    pub fn new(connection: Arc<dyn Connection>, uuid: impl Into<String>, config: SyncConfig) -> Self {
        let (data_received, _) = watch::channel(false);
        Self {
            connection,
            uuid: uuid.into(),
            observers: ObserverRegistry::new(config.observer_channel_capacity),
            config,
            mirror: StateMirror::new(),
            mode: RwLock::new(None),
            data_received,
            updater: Mutex::new(None),
            differ: Arc::new(Mutex::new(StateDiffer::new())),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Strategy a new updater would use: the configured one, or the one
    /// picked from the server version.
    pub fn strategy(&self) -> Strategy {
        match self.config.strategy {
            StrategyChoice::Auto => {
                Strategy::for_server_version(self.connection.server_version().as_deref())
            }
            StrategyChoice::EventStream => Strategy::EventStream,
            StrategyChoice::Polling => Strategy::Polling,
        }
    }

    /// Start synchronizing, replacing any updater already running.
    ///
    /// An error from the replaced updater is logged, not returned. Polling
    /// resumes from the last snapshot seen by this model, so entities that
    /// changed or vanished while sync was stopped are reported as such and
    /// unchanged ones are not announced again.
    pub async fn start_sync(self: &Arc<Self>) -> Result<Strategy, SyncError> {
        let mut slot = self.updater.lock().await;

        if let Some(mut previous) = slot.take() {
            if let Err(e) = previous.stop().await {
                warn!(model = %self.uuid, error = %e, "Previous updater ended with error");
            }
        }

        let strategy = self.strategy();
        let session: Arc<dyn Session> = Arc::clone(self) as Arc<dyn Session>;
        let mut updater =
            Updater::new(&session, strategy, &self.config).with_differ(Arc::clone(&self.differ));
        updater.start()?;
        *slot = Some(updater);

        info!(model = %self.uuid, strategy = %strategy, "Sync started");
        Ok(strategy)
    }

    /// Stop synchronizing. Returns the error that ended the updater, if any.
    pub async fn stop_sync(&self) -> Result<(), SyncError> {
        let updater = self.updater.lock().await.take();
        match updater {
            Some(mut updater) => updater.stop().await,
            None => Ok(()),
        }
    }

    pub async fn sync_state(&self) -> UpdaterState {
        self.updater
            .lock()
            .await
            .as_ref()
            .map_or(UpdaterState::Idle, Updater::state)
    }

    /// Wait until the first batch has been applied.
    pub async fn wait_for_data(&self) {
        let mut rx = self.data_received.subscribe();
        let _ = rx.wait_for(|received| *received).await;
    }

    pub fn has_data(&self) -> bool {
        *self.data_received.borrow()
    }

    pub fn applications(&self) -> Vec<Entity> {
        self.mirror.entities(EntityKind::Application)
    }

    pub fn units(&self) -> Vec<Entity> {
        self.mirror.entities(EntityKind::Unit)
    }

    pub fn machines(&self) -> Vec<Entity> {
        self.mirror.entities(EntityKind::Machine)
    }

    pub fn relations(&self) -> Vec<Entity> {
        self.mirror.entities(EntityKind::Relation)
    }

    /// The model record itself, once received
    pub fn model_info(&self) -> Option<Entity> {
        self.mirror.get(EntityKind::Model, &self.uuid)
    }

    pub fn mode(&self) -> Option<String> {
        self.mode.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn add_observer<O>(&self, filter: ObserverFilter, observer: O) -> ObserverId
    where
        O: Observer + 'static,
    {
        self.observers.add(filter, observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Subscribe to every change event
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.observers.subscribe()
    }
}

#[async_trait]
impl Session for Model {
    fn connection(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.connection)
    }

    fn model_uuid(&self) -> &str {
        &self.uuid
    }

    fn strict_mode(&self) -> bool {
        self.config.strict_mode
    }

    fn set_mode(&self, mode: &str) {
        let mut current = self.mode.write().unwrap_or_else(|e| e.into_inner());
        if current.as_deref() != Some(mode) {
            info!(model = %self.uuid, mode = %mode, "Model mode set");
            *current = Some(mode.to_string());
        }
    }

    fn mirror(&self) -> &StateMirror {
        &self.mirror
    }

    async fn notify_observers(&self, event: ChangeEvent) {
        self.observers.notify(event).await
    }

    fn mark_data_received(&self) {
        self.data_received.send_replace(true);
    }
}
