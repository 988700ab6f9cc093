//! Scope Manager (§4.4): two mappings keyed by scope string, with no
//! inheritance across scopes — a lookup miss in a child scope never climbs
//! to a parent.

use std::collections::HashMap;

use crate::ast::Expression;

/// A variable's raw (unresolved) value together with the module path whose
/// scope its references must be resolved against. This is the "single most
/// subtle invariant" (§9): a child module's input is looked up from the
/// child's scope but evaluated in the parent's.
#[derive(Debug, Clone)]
pub struct BoundValue {
    pub raw: Expression,
    pub def_ctx: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ScopeManager {
    variables: HashMap<String, HashMap<String, BoundValue>>,
    outputs: HashMap<String, HashMap<String, serde_json::Value>>,
}

impl ScopeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_variable(&mut self, scope: &str, name: &str, value: BoundValue) {
        self.variables
            .entry(scope.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Returns `Some` only if `name` was explicitly set in exactly this
    /// scope — never falls back to a parent scope.
    pub fn get_variable(&self, scope: &str, name: &str) -> Option<&BoundValue> {
        self.variables.get(scope).and_then(|m| m.get(name))
    }

    pub fn has_variable(&self, scope: &str, name: &str) -> bool {
        self.get_variable(scope, name).is_some()
    }

    pub fn set_output(&mut self, scope: &str, name: &str, value: serde_json::Value) {
        self.outputs
            .entry(scope.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    pub fn get_output(&self, scope: &str, name: &str) -> Option<&serde_json::Value> {
        self.outputs.get(scope).and_then(|m| m.get(name))
    }

    pub fn all_variables(&self) -> &HashMap<String, HashMap<String, BoundValue>> {
        &self.variables
    }

    pub fn clear(&mut self) {
        self.variables.clear();
        self.outputs.clear();
    }
}
