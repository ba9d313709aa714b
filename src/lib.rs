// Configuration
pub mod config;

// Control plane seams (connection, event and snapshot facades)
pub mod connection;

// Change records and the decoder
pub mod delta;

// Error types
pub mod error;

// Model session
pub mod model;

// Observer callbacks and broadcast fan-out
pub mod observer;

// Local state mirror
pub mod state;

// Full status tree and differencer
pub mod status;

// Logging setup
pub mod telemetry;

// Scripted mock connection
pub mod testing;

// Background synchronization
pub mod updater;

pub use config::{load_config, StrategyChoice, SyncConfig};
pub use connection::{AllWatcher, Connection, ConnectionStatus, StatusClient};
pub use delta::{ChangeKind, EntityDelta, EntityKind, RawDelta};
pub use error::{DecodeError, RpcError, SyncError};
pub use model::{Model, Session};
pub use observer::{Observer, ObserverFilter, ObserverId, ObserverRegistry};
pub use state::{ChangeEvent, Entity, EntityKey, StateMirror};
pub use status::{FullStatus, StateDiffer};
pub use updater::{RunOutcome, Strategy, Updater, UpdaterState};
