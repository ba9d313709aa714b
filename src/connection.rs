//! Seams to the control plane.
//!
//! The crate never speaks the wire protocol itself. A [`Connection`] hands
//! out the two facades the updater consumes: an [`AllWatcher`] for pushed
//! change batches and a [`StatusClient`] for full snapshots.

use crate::delta::RawDelta;
use crate::error::RpcError;
use crate::status::FullStatus;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

/// Health of the underlying RPC connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    /// Lost unexpectedly; a reconnect may bring it back.
    Error,
    /// Closed on purpose.
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

#[async_trait]
pub trait Connection: Send + Sync {
    fn status(&self) -> ConnectionStatus;

    /// Re-establish a lost connection. Facades created before the reconnect
    /// may hold server-side handles that are no longer valid.
    async fn reconnect(&self) -> Result<(), RpcError>;

    /// Control plane version, e.g. "3.6.1".
    fn server_version(&self) -> Option<String>;

    fn all_watcher(&self) -> Box<dyn AllWatcher>;

    fn status_client(&self) -> Box<dyn StatusClient>;

    /// Model configuration as reported by the control plane
    async fn model_config(&self) -> Result<Map<String, Value>, RpcError>;
}

/// Event stream facade.
///
/// The watch id is created lazily on the first `next()` and reused after
/// that. [`AllWatcher::discard_watch`] drops it so the next call starts a
/// fresh watch.
#[async_trait]
pub trait AllWatcher: Send {
    /// Block until the next batch of change records is available.
    async fn next(&mut self) -> Result<Vec<RawDelta>, RpcError>;

    /// Release the watch server-side.
    async fn stop(&mut self) -> Result<(), RpcError>;

    fn discard_watch(&mut self);
}

/// Snapshot facade
#[async_trait]
pub trait StatusClient: Send {
    async fn full_status(&mut self) -> Result<FullStatus, RpcError>;
}
