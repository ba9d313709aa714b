// Local state mirror and the entity types it stores

mod entity;
mod mirror;

pub use entity::{ChangeEvent, Entity, EntityKey};
pub use mirror::StateMirror;
