use super::FullStatus;
use crate::delta::{ChangeKind, EntityKind, RawDelta};
use crate::state::EntityKey;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Flattened status: one payload per entity, keyed by identity.
pub type Snapshot = BTreeMap<EntityKey, Map<String, Value>>;

/// Derives change records from successive full status trees.
///
/// Holds the snapshot observed on the previous call; every call to
/// [`StateDiffer::diff`] replaces it, even when nothing changed.
#[derive(Debug, Default)]
pub struct StateDiffer {
    previous: Snapshot,
}

impl StateDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `status` against the previous snapshot and remember it.
    pub fn diff(&mut self, status: &FullStatus, model_uuid: &str) -> Vec<RawDelta> {
        let current = flatten(status, model_uuid);
        let deltas = diff_snapshots(&current, &self.previous);

        debug!(
            entities = current.len(),
            deltas = deltas.len(),
            "Diffed full status"
        );

        self.previous = current;
        deltas
    }

    pub fn previous(&self) -> &Snapshot {
        &self.previous
    }

    /// Forget the previous snapshot; the next diff reports everything as added.
    pub fn reset(&mut self) {
        self.previous.clear();
    }
}

/// Flatten a status tree into per-entity payloads.
///
/// Each payload gets its natural key injected (`model-uuid`, `name` or
/// `id`) so it decodes without outside context. Application payloads do not
/// include their units; units are separate entries.
pub fn flatten(status: &FullStatus, model_uuid: &str) -> Snapshot {
    let mut flat = Snapshot::new();

    if let Some(model) = &status.model {
        flat.insert(
            EntityKey::new(EntityKind::Model, model_uuid),
            with_identity(model.clone(), EntityKind::Model, model_uuid),
        );
    }

    for (app_name, app) in &status.applications {
        flat.insert(
            EntityKey::new(EntityKind::Application, app_name.as_str()),
            with_identity(app.attributes.clone(), EntityKind::Application, app_name),
        );

        for (unit_name, unit) in &app.units {
            flat.insert(
                EntityKey::new(EntityKind::Unit, unit_name.as_str()),
                with_identity(unit.clone(), EntityKind::Unit, unit_name),
            );
        }
    }

    for (machine_id, machine) in &status.machines {
        flat.insert(
            EntityKey::new(EntityKind::Machine, machine_id.as_str()),
            with_identity(machine.clone(), EntityKind::Machine, machine_id),
        );
    }

    for relation in &status.relations {
        let rel_id = match relation.get("id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => {
                warn!("Relation in full status has no id, skipping");
                continue;
            }
        };
        flat.insert(
            EntityKey::new(EntityKind::Relation, rel_id.as_str()),
            with_identity(relation.clone(), EntityKind::Relation, &rel_id),
        );
    }

    flat
}

/// Compute the deltas that turn `previous` into `current`.
///
/// Adds and changes come first in `current` iteration order, followed by
/// removes. Removes carry only the identity field of their kind.
pub fn diff_snapshots(current: &Snapshot, previous: &Snapshot) -> Vec<RawDelta> {
    let mut deltas = Vec::new();

    for (key, data) in current {
        match previous.get(key) {
            None => deltas.push(RawDelta::new(key.kind.as_str(), ChangeKind::Add, data.clone())),
            Some(old) if old != data => {
                deltas.push(RawDelta::new(key.kind.as_str(), ChangeKind::Change, data.clone()))
            }
            Some(_) => {}
        }
    }

    for key in previous.keys() {
        if !current.contains_key(key) {
            deltas.push(RawDelta::new(
                key.kind.as_str(),
                ChangeKind::Remove,
                key.kind.identity_payload(&key.id),
            ));
        }
    }

    deltas
}

fn with_identity(mut data: Map<String, Value>, kind: EntityKind, id: &str) -> Map<String, Value> {
    data.insert(kind.id_field().to_string(), Value::String(id.to_string()));
    data
}
