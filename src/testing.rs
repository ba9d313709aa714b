//! Scripted in-memory connection for tests.
//!
//! [`MockConnection`] implements [`Connection`] and hands out facades that
//! replay queued steps. Clones share state, so a test keeps one handle for
//! scripting and inspection while the model owns another.

use crate::connection::{AllWatcher, Connection, ConnectionStatus, StatusClient};
use crate::delta::RawDelta;
use crate::error::RpcError;
use crate::status::FullStatus;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// One scripted response of the event stream.
#[derive(Clone, Debug)]
pub enum WatchStep {
    Deltas(Vec<RawDelta>),
    Fail(RpcError),
    /// Drop the connection: set its status and fail with `ConnectionClosed`.
    Disconnect(ConnectionStatus),
}

/// One scripted response of the snapshot facade.
#[derive(Clone, Debug)]
pub enum StatusStep {
    Status(FullStatus),
    Fail(RpcError),
    Disconnect(ConnectionStatus),
}

/// Call counters, read through [`MockConnection::counters`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MockCounters {
    /// Watch ids created by `next()` on a watcher without one
    pub watches_started: usize,
    pub watcher_stops: usize,
    pub watch_discards: usize,
    pub batches_served: usize,
    pub reconnects: usize,
    pub status_clients: usize,
    pub full_status_calls: usize,
    pub model_config_calls: usize,
}

#[derive(Debug)]
struct MockState {
    status: ConnectionStatus,
    server_version: Option<String>,
    watch_queue: VecDeque<WatchStep>,
    status_queue: VecDeque<StatusStep>,
    last_status: FullStatus,
    model_config: Result<Map<String, Value>, RpcError>,
    fail_next_reconnect: Option<RpcError>,
    reconnect_status: ConnectionStatus,
    next_watch_id: u64,
    counters: MockCounters,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Connected,
            server_version: None,
            watch_queue: VecDeque::new(),
            status_queue: VecDeque::new(),
            last_status: FullStatus::default(),
            model_config: Ok(Map::new()),
            fail_next_reconnect: None,
            reconnect_status: ConnectionStatus::Connected,
            next_watch_id: 1,
            counters: MockCounters::default(),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MockState>,
    watch_ready: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Mock control-plane connection.
#[derive(Clone, Debug, Default)]
pub struct MockConnection {
    shared: Arc<Shared>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server_version(self, version: &str) -> Self {
        self.shared.lock().server_version = Some(version.to_string());
        self
    }

    /// Queue a batch for the event stream.
    pub fn queue_deltas(&self, deltas: Vec<RawDelta>) {
        self.queue_watch_step(WatchStep::Deltas(deltas));
    }

    pub fn queue_watch_step(&self, step: WatchStep) {
        self.shared.lock().watch_queue.push_back(step);
        self.shared.watch_ready.notify_one();
    }

    /// Queue a snapshot. Once the queue runs dry, `full_status()` keeps
    /// returning the last snapshot served.
    pub fn queue_status(&self, status: FullStatus) {
        self.queue_status_step(StatusStep::Status(status));
    }

    pub fn queue_status_step(&self, step: StatusStep) {
        self.shared.lock().status_queue.push_back(step);
    }

    pub fn set_model_config(&self, config: Result<Map<String, Value>, RpcError>) {
        self.shared.lock().model_config = config;
    }

    /// Cause the next reconnect() to fail with the given error.
    pub fn fail_next_reconnect(&self, error: RpcError) {
        self.shared.lock().fail_next_reconnect = Some(error);
    }

    /// Status a successful reconnect leaves behind (default `Connected`).
    pub fn set_reconnect_status(&self, status: ConnectionStatus) {
        self.shared.lock().reconnect_status = status;
    }

    pub fn counters(&self) -> MockCounters {
        self.shared.lock().counters.clone()
    }

    /// Steps not yet consumed by a watcher
    pub fn pending_watch_steps(&self) -> usize {
        self.shared.lock().watch_queue.len()
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn status(&self) -> ConnectionStatus {
        self.shared.lock().status
    }

    async fn reconnect(&self) -> Result<(), RpcError> {
        let mut state = self.shared.lock();
        state.counters.reconnects += 1;

        if let Some(error) = state.fail_next_reconnect.take() {
            return Err(error);
        }

        state.status = state.reconnect_status;
        Ok(())
    }

    fn server_version(&self) -> Option<String> {
        self.shared.lock().server_version.clone()
    }

    fn all_watcher(&self) -> Box<dyn AllWatcher> {
        Box::new(MockWatcher {
            shared: Arc::clone(&self.shared),
            watch_id: None,
        })
    }

    fn status_client(&self) -> Box<dyn StatusClient> {
        self.shared.lock().counters.status_clients += 1;
        Box::new(MockStatusClient {
            shared: Arc::clone(&self.shared),
        })
    }

    async fn model_config(&self) -> Result<Map<String, Value>, RpcError> {
        let mut state = self.shared.lock();
        state.counters.model_config_calls += 1;
        state.model_config.clone()
    }
}

/// Watcher replaying [`WatchStep`]s; waits while the queue is empty.
#[derive(Debug)]
pub struct MockWatcher {
    shared: Arc<Shared>,
    watch_id: Option<u64>,
}

#[async_trait]
impl AllWatcher for MockWatcher {
    async fn next(&mut self) -> Result<Vec<RawDelta>, RpcError> {
        loop {
            {
                let mut state = self.shared.lock();

                if state.status != ConnectionStatus::Connected {
                    return Err(RpcError::ConnectionClosed);
                }

                if self.watch_id.is_none() {
                    self.watch_id = Some(state.next_watch_id);
                    state.next_watch_id += 1;
                    state.counters.watches_started += 1;
                }

                if let Some(step) = state.watch_queue.pop_front() {
                    return match step {
                        WatchStep::Deltas(deltas) => {
                            state.counters.batches_served += 1;
                            Ok(deltas)
                        }
                        WatchStep::Fail(error) => Err(error),
                        WatchStep::Disconnect(status) => {
                            state.status = status;
                            Err(RpcError::ConnectionClosed)
                        }
                    };
                }
            }

            self.shared.watch_ready.notified().await;
        }
    }

    async fn stop(&mut self) -> Result<(), RpcError> {
        self.shared.lock().counters.watcher_stops += 1;
        self.watch_id = None;
        Ok(())
    }

    fn discard_watch(&mut self) {
        self.shared.lock().counters.watch_discards += 1;
        self.watch_id = None;
    }
}

/// Status client replaying [`StatusStep`]s.
#[derive(Debug)]
pub struct MockStatusClient {
    shared: Arc<Shared>,
}

#[async_trait]
impl StatusClient for MockStatusClient {
    async fn full_status(&mut self) -> Result<FullStatus, RpcError> {
        let mut state = self.shared.lock();
        state.counters.full_status_calls += 1;

        if state.status != ConnectionStatus::Connected {
            return Err(RpcError::ConnectionClosed);
        }

        match state.status_queue.pop_front() {
            Some(StatusStep::Status(status)) => {
                state.last_status = status.clone();
                Ok(status)
            }
            Some(StatusStep::Fail(error)) => Err(error),
            Some(StatusStep::Disconnect(status)) => {
                state.status = status;
                Err(RpcError::ConnectionClosed)
            }
            None => Ok(state.last_status.clone()),
        }
    }
}
