use crate::delta::{ChangeKind, EntityDelta, EntityKind};
use crate::state::entity::{Entity, EntityKey};
use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::debug;

/// Local mirror of the remote model.
///
/// Every delta touches a single key and is applied under that key's shard
/// lock, so a concurrent reader sees either the value before or after a
/// delta, never a partial one. The updater task is the only writer.
pub struct StateMirror {
    /// Lock-free concurrent map for fast reads
    entities: DashMap<EntityKey, Entity>,
}

impl StateMirror {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
        }
    }

    /// Apply a decoded delta, returning the values before and after.
    ///
    /// Add and change insert or replace the entity; remove erases it. A
    /// change or remove for an identity never seen before returns
    /// `old = None`.
    pub fn apply(&self, delta: &EntityDelta) -> (Option<Entity>, Option<Entity>) {
        let key = delta.entity.key();

        match delta.change {
            ChangeKind::Remove => {
                let old = self.entities.remove(&key).map(|(_, entity)| entity);
                if old.is_none() {
                    debug!(entity = %key, "Remove for entity not in mirror");
                }
                (old, None)
            }
            ChangeKind::Add | ChangeKind::Change => {
                let new = delta.entity.clone();
                let old = self.entities.insert(key, new.clone());
                (old, Some(new))
            }
        }
    }

    /// Get entity by kind and id
    pub fn get(&self, kind: EntityKind, id: &str) -> Option<Entity> {
        self.entities
            .get(&EntityKey::new(kind, id))
            .map(|e| e.value().clone())
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.entities.contains_key(&EntityKey::new(kind, id))
    }

    /// All entities of one kind, ordered by id
    pub fn entities(&self, kind: EntityKind) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .entities
            .iter()
            .filter(|e| e.key().kind == kind)
            .map(|e| e.value().clone())
            .collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    pub fn ids(&self, kind: EntityKind) -> Vec<String> {
        self.entities(kind).into_iter().map(|e| e.id).collect()
    }

    /// Point-in-time copy of the whole mirror
    pub fn snapshot(&self) -> BTreeMap<EntityKey, Entity> {
        self.entities
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new()
    }
}
