use crate::delta::{ChangeKind, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identity of a mirrored entity: its kind plus natural key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Entity reconstructed from a delta payload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,

    /// Natural key (application/unit name, machine/relation id, model uuid)
    pub id: String,

    /// Attributes as of the delta that produced this value
    pub data: Map<String, Value>,

    /// When the delta was decoded
    pub received_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(kind: EntityKind, id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            kind,
            id: id.into(),
            data,
            received_at: Utc::now(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id.clone())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

/// One observed transition, handed to observers and broadcast subscribers.
///
/// `old` is `None` when the entity was not mirrored before; `new` is `None`
/// on removal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: EntityKind,
    pub change: ChangeKind,
    pub id: String,
    pub old: Option<Entity>,
    pub new: Option<Entity>,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        kind: EntityKind,
        change: ChangeKind,
        id: impl Into<String>,
        old: Option<Entity>,
        new: Option<Entity>,
    ) -> Self {
        Self {
            kind,
            change,
            id: id.into(),
            old,
            new,
            timestamp: Utc::now(),
        }
    }

    /// Entity came into existence with this event.
    pub fn is_creation(&self) -> bool {
        self.old.is_none() && self.new.is_some()
    }

    pub fn is_removal(&self) -> bool {
        self.new.is_none()
    }
}
