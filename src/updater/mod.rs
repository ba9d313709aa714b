//! Background synchronization task.
//!
//! An [`Updater`] owns one tokio task running either the event-stream loop
//! or the polling loop. Both loops feed decoded deltas through the same
//! apply-and-notify path, so consumers cannot tell them apart.

mod event_stream;
mod polling;

use crate::config::SyncConfig;
use crate::connection::{Connection, ConnectionStatus};
use crate::delta::{self, EntityKind, RawDelta};
use crate::error::SyncError;
use crate::model::Session;
use crate::state::{ChangeEvent, Entity};
use crate::status::StateDiffer;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};


/// How change records are obtained from the control plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Pushed batches from `AllWatcher.Next`
    EventStream,
    /// Successive `FullStatus` snapshots, diffed locally
    Polling,
}

impl Strategy {
    /// Control planes from major version 4 on only offer full snapshots.
    /// Missing or unparseable versions select the event stream.
    pub fn for_server_version(version: Option<&str>) -> Self {
        let major = version
            .and_then(|v| v.trim_start_matches('v').split('.').next())
            .and_then(|major| major.parse::<u32>().ok());

        match major {
            Some(major) if major >= 4 => Strategy::Polling,
            _ => Strategy::EventStream,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::EventStream => f.write_str("event-stream"),
            Strategy::Polling => f.write_str("polling"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdaterState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// How the background loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stop requested or the connection was closed on purpose
    Clean,
    Failed(SyncError),
    Cancelled,
}

/// Keeps the local mirror in sync with the control plane.
///
/// The updater and its task only hold a weak reference to the session; the
/// task upgrades it for the length of one batch. Dropping the updater asks
/// the loop to stop at its next fetch or sleep.
pub struct Updater {
    session: Weak<dyn Session>,
    model_uuid: String,
    strategy: Strategy,
    poll_interval: Duration,
    error_backoff: Duration,
    state: UpdaterState,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<RunOutcome>>,
    /// Previous polling snapshot. Survives stop/start, and is shared with
    /// later updaters through [`Updater::with_differ`].
    differ: Arc<Mutex<StateDiffer>>,
}

impl Updater {
    pub fn new(session: &Arc<dyn Session>, strategy: Strategy, config: &SyncConfig) -> Self {
        Self {
            session: Arc::downgrade(session),
            model_uuid: session.model_uuid().to_string(),
            strategy,
            poll_interval: config.poll_interval(),
            error_backoff: config.error_backoff(),
            state: UpdaterState::Idle,
            stop_tx: None,
            task: None,
            differ: Arc::new(Mutex::new(StateDiffer::new())),
        }
    }

    /// Diff against `differ` instead of a fresh snapshot, so a replacement
    /// updater only reports what changed since the last poll.
    pub fn with_differ(mut self, differ: Arc<Mutex<StateDiffer>>) -> Self {
        self.differ = differ;
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn state(&self) -> UpdaterState {
        self.state
    }

    /// Handle of the background task, if one was started
    pub fn task(&self) -> Option<&JoinHandle<RunOutcome>> {
        self.task.as_ref()
    }

    /// True once the background task has exited on its own or was stopped.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Spawn the background loop.
    pub fn start(&mut self) -> Result<(), SyncError> {
        if matches!(self.state, UpdaterState::Running | UpdaterState::Stopping) {
            return Err(SyncError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let session = Weak::clone(&self.session);

        let task = match self.strategy {
            Strategy::EventStream => tokio::spawn(event_stream::run(session, stop_rx)),
            Strategy::Polling => tokio::spawn(polling::run(
                session,
                Arc::clone(&self.differ),
                polling::Intervals {
                    poll: self.poll_interval,
                    backoff: self.error_backoff,
                },
                stop_rx,
            )),
        };

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
        self.state = UpdaterState::Running;

        info!(
            model = %self.model_uuid,
            strategy = %self.strategy,
            "Updater started"
        );
        Ok(())
    }

    /// Signal the loop to stop and wait for it.
    ///
    /// Returns the error that ended the loop, if any. Calling this on an
    /// updater that is not running does nothing.
    pub async fn stop(&mut self) -> Result<(), SyncError> {
        if matches!(self.state, UpdaterState::Idle | UpdaterState::Stopped) {
            return Ok(());
        }

        self.state = UpdaterState::Stopping;
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }

        let outcome = match self.task.take() {
            Some(task) => match task.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => RunOutcome::Cancelled,
                Err(e) => RunOutcome::Failed(SyncError::TaskPanicked(e.to_string())),
            },
            None => RunOutcome::Cancelled,
        };

        self.state = UpdaterState::Stopped;
        info!(model = %self.model_uuid, outcome = ?outcome, "Updater stopped");

        match outcome {
            RunOutcome::Clean | RunOutcome::Cancelled => Ok(()),
            RunOutcome::Failed(e) => Err(e),
        }
    }
}

impl Drop for Updater {
    fn drop(&mut self) {
        // A batch being applied still completes before the loop exits
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
    }
}

/// Decode, apply and announce one batch of change records.
///
/// Undecodable deltas are fatal in strict mode and skipped otherwise.
/// Data-received is signalled once the whole batch went through.
async fn apply_batch(session: &dyn Session, deltas: Vec<RawDelta>) -> Result<(), SyncError> {
    let total = deltas.len();
    let mut applied = 0;

    for raw in deltas {
        let decoded = match delta::decode(&raw) {
            Ok(decoded) => decoded,
            Err(e) if session.strict_mode() => {
                error!(error = %e, kind = %raw.entity, "Undecodable delta in strict mode");
                return Err(SyncError::Decode(e));
            }
            Err(e) => {
                debug!(error = %e, kind = %raw.entity, "Dropping undecodable delta");
                continue;
            }
        };

        let (old, new) = session.mirror().apply(&decoded);

        if let Some(entity) = new.as_ref().filter(|e| e.kind == EntityKind::Model) {
            if let Some(mode) = mode_from_model(entity) {
                session.set_mode(mode);
            }
        }

        session
            .notify_observers(ChangeEvent::new(
                decoded.kind(),
                decoded.change,
                decoded.id(),
                old,
                new,
            ))
            .await;
        applied += 1;
    }

    debug!(total, applied, "Applied delta batch");
    session.mark_data_received();
    Ok(())
}

fn mode_from_model(entity: &Entity) -> Option<&str> {
    entity.get("config")?.get("mode")?.as_str()
}

/// What the loop should do after the connection went away.
#[derive(Debug, PartialEq, Eq)]
enum Recovery {
    Resume,
    Exit,
}

/// Reconnect once if the connection broke; exit if it was closed on purpose.
async fn recover_connection(conn: &dyn Connection) -> Result<Recovery, SyncError> {
    let status = conn.status();
    if status != ConnectionStatus::Error {
        info!(status = %status, "Connection closed, ending sync");
        return Ok(Recovery::Exit);
    }

    warn!("Connection lost, attempting reconnect");
    match conn.reconnect().await {
        Ok(()) if conn.status() == ConnectionStatus::Connected => {
            info!("Reconnected, resuming sync");
            Ok(Recovery::Resume)
        }
        Ok(()) => {
            let status = conn.status();
            error!(status = %status, "Reconnect did not restore the connection");
            Err(SyncError::ReconnectFailed(format!(
                "connection is {} after reconnect",
                status
            )))
        }
        Err(e) => {
            error!(error = %e, "Reconnect failed");
            Err(SyncError::ReconnectFailed(e.to_string()))
        }
    }
}

fn stop_requested(stop_rx: &watch::Receiver<bool>) -> bool {
    *stop_rx.borrow()
}

/// Resolves once a stop is requested or the updater went away.
async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

/// Sleep for `duration`; returns false if interrupted by a stop request.
async fn sleep_unless_stopped(duration: Duration, stop_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = stopped(stop_rx) => false,
    }
}

fn model_mode(config: &serde_json::Map<String, Value>) -> Option<&str> {
    config.get("mode")?.get("value")?.as_str()
}
