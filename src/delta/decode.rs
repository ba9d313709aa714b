use super::{EntityDelta, EntityKind, RawDelta};
use crate::error::DecodeError;
use crate::state::Entity;
use serde_json::Value;

/// Decodes a raw delta into a typed entity.
///
/// Fails with [`DecodeError::UnrecognizedKind`] for kinds outside
/// [`EntityKind`], and with [`DecodeError::MissingIdentity`] when the payload
/// does not carry the kind's natural key. Numeric keys (relation ids) are
/// rendered as decimal strings.
pub fn decode(raw: &RawDelta) -> Result<EntityDelta, DecodeError> {
    let kind: EntityKind = raw.entity.parse()?;
    let field = kind.id_field();

    let id = match raw.payload.get(field) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(DecodeError::MissingIdentity {
                kind: raw.entity.clone(),
                field,
            })
        }
    };

    Ok(EntityDelta {
        change: raw.change,
        entity: Entity::new(kind, id, raw.payload.clone()),
    })
}
