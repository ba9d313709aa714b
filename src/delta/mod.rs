// Change records exchanged with the control plane and their decoded form

mod decode;

pub use decode::decode;

use crate::error::DecodeError;
use crate::state::Entity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;


/// Kinds of entity tracked by the mirror.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Model,
    Application,
    Unit,
    Machine,
    Relation,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Model,
        EntityKind::Application,
        EntityKind::Unit,
        EntityKind::Machine,
        EntityKind::Relation,
    ];

    /// Wire name of the kind (e.g. "unit").
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Model => "model",
            EntityKind::Application => "application",
            EntityKind::Unit => "unit",
            EntityKind::Machine => "machine",
            EntityKind::Relation => "relation",
        }
    }

    /// Payload field carrying the natural key of this kind.
    pub fn id_field(&self) -> &'static str {
        match self {
            EntityKind::Model => "model-uuid",
            EntityKind::Application | EntityKind::Unit => "name",
            EntityKind::Machine | EntityKind::Relation => "id",
        }
    }

    /// Minimal payload identifying an entity of this kind.
    pub fn identity_payload(&self, id: &str) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert(self.id_field().to_string(), Value::String(id.to_string()));
        payload
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DecodeError::UnrecognizedKind(s.to_string()))
    }
}

/// What happened to an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Change,
    Remove,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Change => "change",
            ChangeKind::Remove => "remove",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Undecoded change record.
///
/// The entity kind is kept as received so that kinds outside
/// [`EntityKind`] can reach the decoder and be rejected there. On the wire a
/// delta is the array `[kind, change, payload]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireDelta", into = "WireDelta")]
pub struct RawDelta {
    pub entity: String,
    pub change: ChangeKind,
    pub payload: Map<String, Value>,
}

impl RawDelta {
    pub fn new(entity: impl Into<String>, change: ChangeKind, payload: Map<String, Value>) -> Self {
        Self {
            entity: entity.into(),
            change,
            payload,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct WireDelta(String, ChangeKind, Map<String, Value>);

impl From<WireDelta> for RawDelta {
    fn from(WireDelta(entity, change, payload): WireDelta) -> Self {
        RawDelta::new(entity, change, payload)
    }
}

impl From<RawDelta> for WireDelta {
    fn from(delta: RawDelta) -> Self {
        WireDelta(delta.entity, delta.change, delta.payload)
    }
}

/// Decoded delta: a typed entity plus the change applied to it.
#[derive(Clone, Debug)]
pub struct EntityDelta {
    pub change: ChangeKind,
    pub entity: Entity,
}

impl EntityDelta {
    pub fn kind(&self) -> EntityKind {
        self.entity.kind
    }

    pub fn id(&self) -> &str {
        &self.entity.id
    }
}
