//! Reference Resolver (§4.6): evaluates a `Reference` or `${…}` interpolation
//! in the context of a resolving module scope and the current state snapshot.
//!
//! Dispatch is on the first segment of the dotted path: `var`, `data`,
//! `module`, or anything else (a same-scope resource reference).

use std::collections::HashMap;

use serde_json::Value;

use crate::address::{scope_string_for, Address};
use crate::ast::{Attributes, Expression};
use crate::error::{MiniformError, Result};
use crate::scope::ScopeManager;
use crate::state::CurrentState;

/// Evaluated data-source attribute maps, keyed by `scope+"."+type+"."+name`
/// (§4.7). Built once per invocation before planning begins.
pub type DataStore = HashMap<String, Value>;

pub fn data_source_key(scope: &str, data_type: &str, name: &str) -> String {
    format!("{}.{}.{}", scope, data_type, name)
}

const MAX_VARIABLE_DEPTH: usize = 64;

/// Everything the resolver needs that doesn't change as it walks into nested
/// scopes (only `module_path` changes, so it's threaded separately).
struct Ctx<'a> {
    scope: &'a ScopeManager,
    state: &'a CurrentState,
    data: &'a DataStore,
}

/// Fully resolve every attribute in `attrs`, in the context of `module_path`,
/// into a JSON object. Used by data source evaluation and by the executor
/// just before a provider call.
pub fn resolve_attrs(
    attrs: &Attributes,
    module_path: &[String],
    scope: &ScopeManager,
    state: &CurrentState,
    data: &DataStore,
) -> Result<Value> {
    let ctx = Ctx { scope, state, data };
    let mut out = serde_json::Map::new();
    for (k, v) in attrs {
        out.insert(k.clone(), resolve_expression(v, module_path, &ctx, 0)?);
    }
    Ok(Value::Object(out))
}

/// Fully resolve a single expression (deep: lists/maps are walked and every
/// leaf resolved, unlike a bare lookup which leaves composites untouched).
pub fn resolve(
    expr: &Expression,
    module_path: &[String],
    scope: &ScopeManager,
    state: &CurrentState,
    data: &DataStore,
) -> Result<Value> {
    let ctx = Ctx { scope, state, data };
    resolve_expression(expr, module_path, &ctx, 0)
}

fn resolve_expression(expr: &Expression, module_path: &[String], ctx: &Ctx, depth: usize) -> Result<Value> {
    match expr {
        Expression::String(s) => Ok(Value::String(interpolate(s, module_path, ctx, depth)?)),
        Expression::Number(n) => Ok(serde_json::json!(n)),
        Expression::Boolean(b) => Ok(Value::Bool(*b)),
        Expression::Reference(parts) => resolve_reference(parts, module_path, ctx, depth),
        Expression::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_expression(item, module_path, ctx, depth)?);
            }
            Ok(Value::Array(out))
        }
        Expression::Map(entries) => {
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), resolve_expression(v, module_path, ctx, depth)?);
            }
            Ok(Value::Object(out))
        }
    }
}

/// Scan `s` for `${…}` spans, resolve each inner dotted path and splice the
/// stringified result back in. Strings with no interpolation are returned
/// unchanged (cloned).
fn interpolate(s: &str, module_path: &[String], ctx: &Ctx, depth: usize) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let close = after_open
            .find('}')
            .ok_or_else(|| MiniformError::resolve(format!("unterminated interpolation in '{}'", s)))?;
        let inner = after_open[..close].trim();
        let parts: Vec<String> = inner.split('.').map(|p| p.to_string()).collect();
        let value = resolve_reference(&parts, module_path, ctx, depth)?;
        out.push_str(&stringify(&value));
        rest = &after_open[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn stringify(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn resolve_reference(parts: &[String], module_path: &[String], ctx: &Ctx, depth: usize) -> Result<Value> {
    if parts.is_empty() {
        return Err(MiniformError::resolve("empty reference"));
    }

    match parts[0].as_str() {
        "var" => resolve_var(parts, module_path, ctx, depth),
        "data" => resolve_data(parts, module_path, ctx),
        "module" if parts.len() == 3 => resolve_module_output(parts, module_path, ctx),
        "module" => resolve_absolute(parts, ctx),
        _ => resolve_same_scope_resource(parts, module_path, ctx),
    }
}

fn resolve_var(parts: &[String], module_path: &[String], ctx: &Ctx, depth: usize) -> Result<Value> {
    if parts.len() != 2 {
        return Err(MiniformError::resolve(format!(
            "malformed variable reference '{}'",
            parts.join(".")
        )));
    }
    if depth >= MAX_VARIABLE_DEPTH {
        return Err(MiniformError::resolve(format!(
            "variable resolution depth exceeded for '{}'",
            parts.join(".")
        )));
    }

    let scope_str = scope_string_for(module_path);
    let name = &parts[1];
    let bound = ctx.scope.get_variable(&scope_str, name).ok_or_else(|| {
        MiniformError::resolve(format!("unknown variable '{}' in scope '{}'", name, scope_str))
    })?;

    // Lexical scoping (§9): a variable's raw value resolves in its defining
    // context, not the scope it was looked up from.
    resolve_expression(&bound.raw.clone(), &bound.def_ctx.clone(), ctx, depth + 1)
}

fn resolve_data(parts: &[String], module_path: &[String], ctx: &Ctx) -> Result<Value> {
    if parts.len() < 4 {
        return Err(MiniformError::resolve(format!(
            "malformed data source reference '{}'",
            parts.join(".")
        )));
    }
    let data_type = &parts[1];
    let name = &parts[2];
    let attr = parts[3..].join(".");

    let scope_str = scope_string_for(module_path);
    let key = data_source_key(&scope_str, data_type, name);
    let attrs = ctx.data.get(&key).ok_or_else(|| {
        MiniformError::resolve(format!("unknown data source '{}.{}' in scope '{}'", data_type, name, scope_str))
    })?;

    attrs
        .get(&attr)
        .cloned()
        .ok_or_else(|| MiniformError::resolve(format!("unknown attribute '{}' on data.{}.{}", attr, data_type, name)))
}

fn resolve_module_output(parts: &[String], module_path: &[String], ctx: &Ctx) -> Result<Value> {
    let module_name = &parts[1];
    let output_name = &parts[2];
    let mut child_path = module_path.to_vec();
    child_path.push(module_name.clone());
    let child_scope = scope_string_for(&child_path);

    ctx.scope.get_output(&child_scope, output_name).cloned().ok_or_else(|| {
        MiniformError::resolve(format!(
            "unknown (or not yet resolved) module output '{}.{}'",
            module_name, output_name
        ))
    })
}

/// `module.…(.module.…)*.type.name.attr` — an absolute, module-qualified
/// resource reference. The address is everything but the trailing attr.
fn resolve_absolute(parts: &[String], ctx: &Ctx) -> Result<Value> {
    if parts.len() < 5 {
        return Err(MiniformError::resolve(format!(
            "malformed module-qualified reference '{}'",
            parts.join(".")
        )));
    }
    let (addr_parts, attr_parts) = parts.split_at(parts.len() - 1);
    let address = Address::parse(&addr_parts.join(".")).map_err(|e| {
        MiniformError::resolve(format!("malformed module-qualified reference '{}': {}", parts.join("."), e))
    })?;
    let attr = attr_parts[0].clone();
    lookup_resource_attr(&address, &attr, ctx)
}

fn resolve_same_scope_resource(parts: &[String], module_path: &[String], ctx: &Ctx) -> Result<Value> {
    if parts.len() != 3 {
        return Err(MiniformError::resolve(format!(
            "malformed resource reference '{}'",
            parts.join(".")
        )));
    }
    let address = Address::new(module_path.to_vec(), parts[0].clone(), parts[1].clone());
    lookup_resource_attr(&address, &parts[2], ctx)
}

fn lookup_resource_attr(address: &Address, attr: &str, ctx: &Ctx) -> Result<Value> {
    let key = address.to_string();
    let record = ctx
        .state
        .resources
        .get(&key)
        .ok_or_else(|| MiniformError::resolve(format!("unknown resource '{}'", key)))?;

    if let Some(value) = record.attributes.get(attr) {
        return Ok(unwrap_once(value));
    }
    if attr == "id" {
        return Ok(Value::String(record.id.clone()));
    }
    Err(MiniformError::resolve(format!("unknown attribute '{}' on resource '{}'", attr, key)))
}

/// A stored attribute may be a `{type, value}` wrapper; unwrap it once.
fn unwrap_once(v: &Value) -> Value {
    if let Value::Object(map) = v {
        if map.len() == 2 && map.contains_key("type") && map.contains_key("value") {
            return map["value"].clone();
        }
    }
    v.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::BoundValue;
    use crate::state::ResourceRecord;

    fn empty_ctx() -> (ScopeManager, CurrentState, DataStore) {
        (ScopeManager::new(), CurrentState::default(), DataStore::new())
    }

    #[test]
    fn resolves_a_variable_default() {
        let (mut scope, state, data) = empty_ctx();
        scope.set_variable(
            "",
            "x",
            BoundValue {
                raw: Expression::String("us".to_string()),
                def_ctx: vec![],
            },
        );
        let v = resolve(&Expression::Reference(vec!["var".into(), "x".into()]), &[], &scope, &state, &data).unwrap();
        assert_eq!(v, Value::String("us".to_string()));
    }

    #[test]
    fn variable_resolves_in_its_defining_context_not_the_caller() {
        let (mut scope, state, data) = empty_ctx();
        // Root defines x = "root-value".
        scope.set_variable("", "x", BoundValue { raw: Expression::String("root-value".into()), def_ctx: vec![] });
        // module.app.env is a caller input bound to `var.x`, with defCtx = root ([]).
        scope.set_variable(
            "module.app",
            "env",
            BoundValue {
                raw: Expression::Reference(vec!["var".into(), "x".into()]),
                def_ctx: vec![],
            },
        );
        let v = resolve(
            &Expression::Reference(vec!["var".into(), "env".into()]),
            &["app".to_string()],
            &scope,
            &state,
            &data,
        )
        .unwrap();
        assert_eq!(v, Value::String("root-value".to_string()));
    }

    #[test]
    fn unknown_variable_is_a_resolve_error() {
        let (scope, state, data) = empty_ctx();
        let err = resolve(&Expression::Reference(vec!["var".into(), "nope".into()]), &[], &scope, &state, &data).unwrap_err();
        assert!(matches!(err, MiniformError::ResolveError(_)));
    }

    #[test]
    fn resolves_a_data_source_attribute_scoped_strictly() {
        let (scope, state, mut data) = empty_ctx();
        data.insert(data_source_key("module.app", "env_file", "cfg"), serde_json::json!({"region": "us-east-1"}));

        let v = resolve(
            &Expression::Reference(vec!["data".into(), "env_file".into(), "cfg".into(), "region".into()]),
            &["app".to_string()],
            &scope,
            &state,
            &data,
        )
        .unwrap();
        assert_eq!(v, Value::String("us-east-1".to_string()));

        // The same data source is invisible from root scope.
        let err = resolve(
            &Expression::Reference(vec!["data".into(), "env_file".into(), "cfg".into(), "region".into()]),
            &[],
            &scope,
            &state,
            &data,
        )
        .unwrap_err();
        assert!(matches!(err, MiniformError::ResolveError(_)));
    }

    #[test]
    fn resolves_a_module_output() {
        let (mut scope, state, data) = empty_ctx();
        scope.set_output("module.app", "ip", serde_json::json!("10.0.0.1"));
        let v = resolve(&Expression::Reference(vec!["module".into(), "app".into(), "ip".into()]), &[], &scope, &state, &data).unwrap();
        assert_eq!(v, Value::String("10.0.0.1".to_string()));
    }

    #[test]
    fn resolves_a_same_scope_resource_attribute_and_falls_back_to_id() {
        let (scope, mut state, data) = empty_ctx();
        state.resources.insert(
            "local_file.a".to_string(),
            ResourceRecord::new("/tmp/a", "local_file", "a", vec![], serde_json::json!({"content": "hi"})),
        );

        let v = resolve(&Expression::Reference(vec!["local_file".into(), "a".into(), "content".into()]), &[], &scope, &state, &data).unwrap();
        assert_eq!(v, Value::String("hi".to_string()));

        let id = resolve(&Expression::Reference(vec!["local_file".into(), "a".into(), "id".into()]), &[], &scope, &state, &data).unwrap();
        assert_eq!(id, Value::String("/tmp/a".to_string()));
    }

    #[test]
    fn resolves_an_absolute_module_qualified_reference() {
        let (scope, mut state, data) = empty_ctx();
        state.resources.insert(
            "module.app.r.s".to_string(),
            ResourceRecord::new("id-1", "r", "s", vec!["app".to_string()], serde_json::json!({"tag": "prod"})),
        );
        let v = resolve(
            &Expression::Reference(vec!["module".into(), "app".into(), "r".into(), "s".into(), "tag".into()]),
            &[],
            &scope,
            &state,
            &data,
        )
        .unwrap();
        assert_eq!(v, Value::String("prod".to_string()));
    }

    #[test]
    fn interpolates_a_string_with_a_reference() {
        let (mut scope, state, data) = empty_ctx();
        scope.set_variable("", "x", BoundValue { raw: Expression::String("us".into()), def_ctx: vec![] });
        let v = resolve(&Expression::String("region-${var.x}".to_string()), &[], &scope, &state, &data).unwrap();
        assert_eq!(v, Value::String("region-us".to_string()));
    }

    #[test]
    fn unwraps_a_type_value_wrapper_once() {
        let (scope, mut state, data) = empty_ctx();
        state.resources.insert(
            "r.s".to_string(),
            ResourceRecord::new("id-1", "r", "s", vec![], serde_json::json!({"tag": {"type": "String", "value": "prod"}})),
        );
        let v = resolve(&Expression::Reference(vec!["r".into(), "s".into(), "tag".into()]), &[], &scope, &state, &data).unwrap();
        assert_eq!(v, Value::String("prod".to_string()));
    }

    #[test]
    fn resolves_deeply_through_lists_and_maps() {
        let (mut scope, state, data) = empty_ctx();
        scope.set_variable("", "x", BoundValue { raw: Expression::String("us".into()), def_ctx: vec![] });
        let list = Expression::List(vec![Expression::Reference(vec!["var".into(), "x".into()]), Expression::Number(2.0)]);
        let v = resolve(&list, &[], &scope, &state, &data).unwrap();
        assert_eq!(v, serde_json::json!(["us", 2.0]));
    }
}
