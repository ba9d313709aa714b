//! Error types shared by the decoder, the connection facades and the updater.

use thiserror::Error;

/// Marker the control plane puts in the error message when a watch id has
/// been invalidated server-side.
const WATCHER_STOPPED: &str = "watcher was stopped";

/// Errors returned by the delta decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The delta names an entity kind outside the recognition table.
    #[error("unknown delta type '{0}'")]
    UnrecognizedKind(String),

    /// The payload lacks the identity field for its kind.
    #[error("{kind} delta is missing identity field '{field}'")]
    MissingIdentity { kind: String, field: &'static str },
}

/// Errors surfaced by the connection and its facades.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// Domain-level error reported by the control plane.
    #[error("api error ({code}): {message}")]
    Api { code: String, message: String },

    /// The underlying connection was closed while a call was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl RpcError {
    /// Build an API error from a code and message.
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        RpcError::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// True when the server invalidated the current watch.
    pub fn is_watcher_stopped(&self) -> bool {
        matches!(self, RpcError::Api { message, .. } if message.contains(WATCHER_STOPPED))
    }
}

/// Fatal synchronization errors, handed back to whoever calls `stop()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A delta could not be decoded while running in strict mode.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Unrecoverable error from the control plane.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The connection dropped and the single reconnect attempt failed.
    #[error("automatic reconnect failed: {0}")]
    ReconnectFailed(String),

    /// `start()` was called while the updater task is still alive.
    #[error("updater is already running")]
    AlreadyRunning,

    /// The background task panicked.
    #[error("updater task panicked: {0}")]
    TaskPanicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_stopped_is_detected_from_message() {
        let err = RpcError::api("", "watcher was stopped");
        assert!(err.is_watcher_stopped());

        let err = RpcError::api("not found", "model not found");
        assert!(!err.is_watcher_stopped());
        assert!(!RpcError::ConnectionClosed.is_watcher_stopped());
    }

    #[test]
    fn display_is_human_readable() {
        let err = SyncError::from(DecodeError::UnrecognizedKind("charm".to_string()));
        assert_eq!(err.to_string(), "decode failed: unknown delta type 'charm'");

        let err = SyncError::from(RpcError::ConnectionClosed);
        assert_eq!(err.to_string(), "connection closed");

        let err = DecodeError::MissingIdentity {
            kind: "unit".to_string(),
            field: "name",
        };
        assert_eq!(err.to_string(), "unit delta is missing identity field 'name'");
    }
}
