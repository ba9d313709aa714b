use super::*;
use crate::delta::{decode, ChangeKind, EntityKind};
use crate::state::EntityKey;
use serde_json::json;

const UUID: &str = "deadbeef-0000-4000-8000-000000000001";

fn status(value: serde_json::Value) -> FullStatus {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_full_status_deserializes_nested_units_and_nulls() {
    let s = status(json!({
        "model": {"name": "default", "type": "iaas"},
        "applications": {
            "mysql": {"status": "active", "units": {"mysql/0": {"agent-status": "idle"}}},
            "redis": {"status": "waiting", "units": null}
        },
        "machines": null,
        "relations": [{"id": 1, "key": "mysql:cluster"}]
    }));

    assert_eq!(s.applications.len(), 2);
    assert_eq!(s.applications["mysql"].units.len(), 1);
    assert!(s.applications["redis"].units.is_empty());
    assert_eq!(s.applications["mysql"].attributes.get("status"), Some(&json!("active")));
    assert!(!s.applications["mysql"].attributes.contains_key("units"));
    assert!(s.machines.is_empty());
    assert_eq!(s.relations.len(), 1);
}

#[test]
fn test_flatten_injects_identity_fields() {
    let s = status(json!({
        "model": {"name": "default"},
        "applications": {"a": {"status": "active", "units": {"a/0": {"agent-status": "idle"}}}},
        "machines": {"0": {"series": "jammy"}},
        "relations": [{"id": 7, "key": "a:peer"}]
    }));

    let flat = flatten(&s, UUID);
    assert_eq!(flat.len(), 5);

    let model = &flat[&EntityKey::new(EntityKind::Model, UUID)];
    assert_eq!(model.get("model-uuid"), Some(&json!(UUID)));

    let app = &flat[&EntityKey::new(EntityKind::Application, "a")];
    assert_eq!(app.get("name"), Some(&json!("a")));
    assert!(!app.contains_key("units"));

    let unit = &flat[&EntityKey::new(EntityKind::Unit, "a/0")];
    assert_eq!(unit.get("name"), Some(&json!("a/0")));

    let machine = &flat[&EntityKey::new(EntityKind::Machine, "0")];
    assert_eq!(machine.get("id"), Some(&json!("0")));

    let relation = &flat[&EntityKey::new(EntityKind::Relation, "7")];
    assert_eq!(relation.get("id"), Some(&json!("7")));
}

#[test]
fn test_flatten_skips_relation_without_id() {
    let s = status(json!({"relations": [{"key": "a:peer"}]}));
    assert!(flatten(&s, UUID).is_empty());
}

#[test]
fn test_flattened_payloads_decode() {
    let s = status(json!({
        "model": {"name": "default"},
        "applications": {"a": {"units": {"a/0": {}}}},
        "machines": {"0": {}},
        "relations": [{"id": 2}]
    }));

    let mut differ = StateDiffer::new();
    let deltas = differ.diff(&s, UUID);
    assert_eq!(deltas.len(), 5);
    for raw in &deltas {
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.change, ChangeKind::Add);
    }
}

#[test]
fn test_unit_added_then_removed() {
    let one = status(json!({"applications": {"a": {"status": "active"}}}));
    let two = status(json!({
        "applications": {"a": {"status": "active", "units": {"a/0": {"agent-status": "idle"}}}}
    }));

    let (s1, s2) = (flatten(&one, UUID), flatten(&two, UUID));

    let forward = diff_snapshots(&s2, &s1);
    assert_eq!(forward.len(), 1);
    assert_eq!(forward[0].entity, "unit");
    assert_eq!(forward[0].change, ChangeKind::Add);
    assert_eq!(forward[0].payload.get("name"), Some(&json!("a/0")));

    let backward = diff_snapshots(&s1, &s2);
    assert_eq!(backward.len(), 1);
    assert_eq!(backward[0].entity, "unit");
    assert_eq!(backward[0].change, ChangeKind::Remove);
    assert_eq!(serde_json::Value::Object(backward[0].payload.clone()), json!({"name": "a/0"}));
}

#[test]
fn test_diff_of_identical_snapshots_is_empty() {
    let s = status(json!({
        "model": {"name": "default"},
        "applications": {"a": {"units": {"a/0": {"x": 1}}}},
        "machines": {"0": {}, "1": {}},
        "relations": [{"id": 0}]
    }));
    let flat = flatten(&s, UUID);
    assert!(diff_snapshots(&flat, &flat).is_empty());

    let mut differ = StateDiffer::new();
    assert_eq!(differ.diff(&s, UUID).len(), 6);
    assert!(differ.diff(&s, UUID).is_empty());
    assert!(differ.diff(&s, UUID).is_empty());
}

#[test]
fn test_diff_completeness() {
    let previous = flatten(
        &status(json!({
            "applications": {"keep": {"v": 1}, "edit": {"v": 1}, "drop": {"v": 1}},
            "machines": {"0": {"v": 1}}
        })),
        UUID,
    );
    let current = flatten(
        &status(json!({
            "applications": {"keep": {"v": 1}, "edit": {"v": 2}, "new": {"v": 1}},
            "machines": {"0": {"v": 1}, "1": {"v": 1}}
        })),
        UUID,
    );

    let deltas = diff_snapshots(&current, &previous);
    let summary: Vec<(String, ChangeKind, String)> = deltas
        .iter()
        .map(|d| {
            let kind: EntityKind = d.entity.parse().unwrap();
            let id = d.payload[kind.id_field()].as_str().unwrap().to_string();
            (d.entity.clone(), d.change, id)
        })
        .collect();

    assert_eq!(
        summary,
        vec![
            ("application".to_string(), ChangeKind::Change, "edit".to_string()),
            ("application".to_string(), ChangeKind::Add, "new".to_string()),
            ("machine".to_string(), ChangeKind::Add, "1".to_string()),
            ("application".to_string(), ChangeKind::Remove, "drop".to_string()),
        ]
    );
}

#[test]
fn test_removes_follow_adds_and_changes() {
    let previous = flatten(&status(json!({"machines": {"0": {}}})), UUID);
    let current = flatten(&status(json!({"applications": {"z": {}}})), UUID);

    let deltas = diff_snapshots(&current, &previous);
    assert_eq!(deltas[0].change, ChangeKind::Add);
    assert_eq!(deltas[1].change, ChangeKind::Remove);
    assert_eq!(serde_json::Value::Object(deltas[1].payload.clone()), json!({"id": "0"}));
}

#[test]
fn test_model_remove_carries_uuid_only() {
    let mut differ = StateDiffer::new();
    differ.diff(&status(json!({"model": {"name": "default", "type": "iaas"}})), UUID);

    let deltas = differ.diff(&FullStatus::default(), UUID);
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].change, ChangeKind::Remove);
    assert_eq!(
        serde_json::Value::Object(deltas[0].payload.clone()),
        json!({"model-uuid": UUID})
    );
}

#[test]
fn test_previous_snapshot_replaced_even_without_deltas() {
    let s = status(json!({"machines": {"0": {}}}));
    let mut differ = StateDiffer::new();
    differ.diff(&s, UUID);
    assert_eq!(differ.previous().len(), 1);

    assert!(differ.diff(&s, UUID).is_empty());
    assert_eq!(differ.previous(), &flatten(&s, UUID));

    differ.reset();
    assert!(differ.previous().is_empty());
    assert_eq!(differ.diff(&s, UUID).len(), 1);
}
