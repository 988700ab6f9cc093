//! Planner (§4.10): a pure function diffing desired resources against
//! current state into a deterministic sequence of `PlanAction`s.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::Attributes;
use crate::loader::LoadedResource;
use crate::provider::Schema;
use crate::state::CurrentState;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttrChange {
    pub old: Value,
    pub new: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlanAction {
    Create {
        address: String,
        resource_type: String,
        name: String,
        module_path: Vec<String>,
        attributes: Attributes,
    },
    Update {
        address: String,
        resource_type: String,
        name: String,
        module_path: Vec<String>,
        id: String,
        changes: HashMap<String, AttrChange>,
    },
    Delete {
        address: String,
        resource_type: String,
        name: String,
        module_path: Vec<String>,
        id: String,
    },
    NoOp {
        address: String,
        resource_type: String,
        name: String,
        module_path: Vec<String>,
        id: String,
    },
}

impl PlanAction {
    pub fn address(&self) -> &str {
        match self {
            PlanAction::Create { address, .. }
            | PlanAction::Update { address, .. }
            | PlanAction::Delete { address, .. }
            | PlanAction::NoOp { address, .. } => address,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            PlanAction::Create { .. } => 0,
            PlanAction::Update { .. } => 1,
            PlanAction::Delete { .. } => 2,
            PlanAction::NoOp { .. } => 3,
        }
    }
}

/// Produces CREATE/UPDATE/DELETE/NO_OP actions. A `resolved` map gives the
/// fully-resolved desired attribute set per address (computed by the caller
/// via the resolver) — used only for diffing; the CREATE action itself
/// still carries the raw, unresolved AST attributes, resolved later by the
/// executor just before `provider.create`.
pub fn plan(
    desired: &[LoadedResource],
    resolved: &HashMap<String, Value>,
    state: &CurrentState,
    schemas: &HashMap<String, Schema>,
) -> Vec<PlanAction> {
    let mut actions = Vec::new();
    let mut desired_addresses = std::collections::HashSet::new();

    for r in desired {
        let address = r.address.to_string();
        desired_addresses.insert(address.clone());

        match state.resources.get(&address) {
            None => actions.push(PlanAction::Create {
                address,
                resource_type: r.address.resource_type.clone(),
                name: r.address.name.clone(),
                module_path: r.address.module_path.clone(),
                attributes: r.stmt.attrs.clone(),
            }),
            Some(record) => {
                let new_value = resolved.get(&address).cloned().unwrap_or(Value::Null);
                let changes = diff_attributes(&record.attributes, &new_value);

                if changes.is_empty() {
                    actions.push(PlanAction::NoOp {
                        address,
                        resource_type: r.address.resource_type.clone(),
                        name: r.address.name.clone(),
                        module_path: r.address.module_path.clone(),
                        id: record.id.clone(),
                    });
                    continue;
                }

                let force_new = schemas
                    .get(&r.address.resource_type)
                    .map(|schema| changes.keys().any(|attr| schema.get(attr).map(|s| s.force_new).unwrap_or(false)))
                    .unwrap_or(false);

                if force_new {
                    actions.push(PlanAction::Delete {
                        address: address.clone(),
                        resource_type: r.address.resource_type.clone(),
                        name: r.address.name.clone(),
                        module_path: r.address.module_path.clone(),
                        id: record.id.clone(),
                    });
                    actions.push(PlanAction::Create {
                        address,
                        resource_type: r.address.resource_type.clone(),
                        name: r.address.name.clone(),
                        module_path: r.address.module_path.clone(),
                        attributes: r.stmt.attrs.clone(),
                    });
                } else {
                    actions.push(PlanAction::Update {
                        address,
                        resource_type: r.address.resource_type.clone(),
                        name: r.address.name.clone(),
                        module_path: r.address.module_path.clone(),
                        id: record.id.clone(),
                        changes,
                    });
                }
            }
        }
    }

    for (address, record) in &state.resources {
        if !desired_addresses.contains(address) {
            actions.push(PlanAction::Delete {
                address: address.clone(),
                resource_type: record.resource_type.clone(),
                name: record.name.clone(),
                module_path: record.module_path.clone(),
                id: record.id.clone(),
            });
        }
    }

    actions.sort_by(|a, b| match a.kind_rank().cmp(&b.kind_rank()) {
        Ordering::Equal => a.address().cmp(b.address()),
        other => other,
    });

    actions
}

fn diff_attributes(old: &Value, new: &Value) -> HashMap<String, AttrChange> {
    let mut changes = HashMap::new();
    let old_map = old.as_object().cloned().unwrap_or_default();
    let new_map = new.as_object().cloned().unwrap_or_default();

    let mut keys: std::collections::HashSet<&String> = old_map.keys().collect();
    keys.extend(new_map.keys());

    for key in keys {
        let old_val = old_map.get(key).cloned().unwrap_or(Value::Null);
        let new_val = new_map.get(key).cloned().unwrap_or(Value::Null);
        if old_val != new_val {
            changes.insert(key.clone(), AttrChange { old: old_val, new: new_val });
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::ast::{Expression, ResourceStmt};
    use crate::provider::{AttrSchema, AttrType};
    use crate::state::ResourceRecord;
    use std::collections::HashMap as Map;

    fn resource(resource_type: &str, name: &str, attrs: Map<String, Expression>) -> LoadedResource {
        LoadedResource {
            address: Address::root(resource_type, name),
            stmt: ResourceStmt {
                resource_type: resource_type.to_string(),
                name: name.to_string(),
                attrs,
            },
        }
    }

    #[test]
    fn new_resource_against_empty_state_is_a_create() {
        let mut attrs = Map::new();
        attrs.insert("path".to_string(), Expression::String("/tmp/a".to_string()));
        let r = resource("local_file", "a", attrs);
        let actions = plan(&[r], &HashMap::new(), &CurrentState::default(), &HashMap::new());
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], PlanAction::Create { .. }));
    }

    #[test]
    fn unchanged_resource_is_a_no_op() {
        let attrs: Map<String, Expression> = Map::new();
        let r = resource("local_file", "a", attrs);

        let mut state = CurrentState::default();
        state.resources.insert(
            "local_file.a".to_string(),
            ResourceRecord::new("id-1", "local_file", "a", vec![], serde_json::json!({})),
        );

        let mut resolved = HashMap::new();
        resolved.insert("local_file.a".to_string(), serde_json::json!({}));

        let actions = plan(&[r], &resolved, &state, &HashMap::new());
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], PlanAction::NoOp { .. }));
    }

    #[test]
    fn changed_attribute_is_an_update_with_old_and_new() {
        let mut attrs = Map::new();
        attrs.insert("content".to_string(), Expression::String("ho".to_string()));
        let r = resource("local_file", "a", attrs);

        let mut state = CurrentState::default();
        state.resources.insert(
            "local_file.a".to_string(),
            ResourceRecord::new("id-1", "local_file", "a", vec![], serde_json::json!({"content": "hi"})),
        );

        let mut resolved = HashMap::new();
        resolved.insert("local_file.a".to_string(), serde_json::json!({"content": "ho"}));

        let actions = plan(&[r], &resolved, &state, &HashMap::new());
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            PlanAction::Update { changes, id, .. } => {
                assert_eq!(id, "id-1");
                assert_eq!(changes["content"].old, serde_json::json!("hi"));
                assert_eq!(changes["content"].new, serde_json::json!("ho"));
            }
            other => panic!("expected Update, got {:?}", other),
        }
    }

    #[test]
    fn force_new_attribute_splits_update_into_delete_then_create() {
        let mut attrs = Map::new();
        attrs.insert("path".to_string(), Expression::String("/tmp/b".to_string()));
        let r = resource("local_file", "a", attrs);

        let mut state = CurrentState::default();
        state.resources.insert(
            "local_file.a".to_string(),
            ResourceRecord::new("/tmp/a", "local_file", "a", vec![], serde_json::json!({"path": "/tmp/a"})),
        );

        let mut resolved = HashMap::new();
        resolved.insert("local_file.a".to_string(), serde_json::json!({"path": "/tmp/b"}));

        let mut schemas = HashMap::new();
        let mut schema = Schema::new();
        schema.insert("path".to_string(), AttrSchema { attr_type: AttrType::String, required: true, force_new: true });
        schemas.insert("local_file".to_string(), schema);

        let actions = plan(&[r], &resolved, &state, &schemas);
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], PlanAction::Delete { .. }));
        assert!(matches!(actions[1], PlanAction::Create { .. }));
    }

    #[test]
    fn state_entry_with_no_desired_counterpart_is_a_delete() {
        let mut state = CurrentState::default();
        state.resources.insert(
            "local_file.gone".to_string(),
            ResourceRecord::new("/tmp/gone", "local_file", "gone", vec![], serde_json::json!({})),
        );

        let actions = plan(&[], &HashMap::new(), &state, &HashMap::new());
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], PlanAction::Delete { .. }));
    }

    #[test]
    fn actions_are_ordered_by_kind_then_address() {
        let mut attrs = Map::new();
        attrs.insert("x".to_string(), Expression::String("1".to_string()));
        let create_r = resource("r", "new", attrs);

        let mut state = CurrentState::default();
        state.resources.insert(
            "r.old".to_string(),
            ResourceRecord::new("id-old", "r", "old", vec![], serde_json::json!({})),
        );

        let actions = plan(&[create_r], &HashMap::new(), &state, &HashMap::new());
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], PlanAction::Create { .. }));
        assert!(matches!(actions[1], PlanAction::Delete { .. }));
    }
}
