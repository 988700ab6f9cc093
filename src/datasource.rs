//! Data Source Evaluation (§4.7): invokes `provider.read` for every `data`
//! block, parents-before-children, caching each result in a `DataStore`
//! keyed by scope.
//!
//! Data sources are evaluated against an otherwise-empty state snapshot:
//! only variables and other already-evaluated data sources may feed their
//! inputs, never a resource.

use crate::address::scope_string_for;
use crate::ast::Expression;
use crate::error::{MiniformError, Result};
use crate::loader::LoadedData;
use crate::provider::ProviderRegistry;
use crate::resolver::{data_source_key, resolve_attrs, DataStore};
use crate::scope::ScopeManager;
use crate::state::CurrentState;

/// Walk `attrs` for any bare (non-interpolated) reference whose first
/// segment is neither `var` nor `data` — that would denote a resource, which
/// data sources may not depend on.
fn reject_resource_dependency(attrs: &crate::ast::Attributes) -> Result<()> {
    fn check(expr: &Expression) -> Result<()> {
        match expr {
            Expression::Reference(parts) => {
                let head = parts.first().map(String::as_str);
                if !matches!(head, Some("var") | Some("data")) {
                    return Err(MiniformError::config(format!(
                        "data source cannot depend on resource '{}'",
                        parts.join(".")
                    )));
                }
                Ok(())
            }
            Expression::List(items) => {
                for item in items {
                    check(item)?;
                }
                Ok(())
            }
            Expression::Map(entries) => {
                for v in entries.values() {
                    check(v)?;
                }
                Ok(())
            }
            Expression::String(s) => check_interpolations(s),
            Expression::Number(_) | Expression::Boolean(_) => Ok(()),
        }
    }
    fn check_interpolations(s: &str) -> Result<()> {
        let mut rest = s;
        while let Some(open) = rest.find("${") {
            let after_open = &rest[open + 2..];
            let Some(close) = after_open.find('}') else {
                break;
            };
            let inner = after_open[..close].trim();
            let head = inner.split('.').next();
            if !matches!(head, Some("var") | Some("data")) {
                return Err(MiniformError::config(format!(
                    "data source cannot depend on resource '{}'",
                    inner
                )));
            }
            rest = &after_open[close + 1..];
        }
        Ok(())
    }

    for v in attrs.values() {
        check(v)?;
    }
    Ok(())
}

/// Evaluate every loaded data source in source order (the order `loader`
/// encountered them, which is parents-before-children because the loader
/// recurses depth-first after registering the parent's own blocks first).
pub async fn evaluate_all(
    data_sources: &[LoadedData],
    scope: &ScopeManager,
    providers: &ProviderRegistry,
) -> Result<DataStore> {
    let mut store = DataStore::new();
    let empty_state = CurrentState::default();

    for loaded in data_sources {
        reject_resource_dependency(&loaded.stmt.attrs)?;

        let module_path = &loaded.address.module_path;
        let inputs = resolve_attrs(&loaded.stmt.attrs, module_path, scope, &empty_state, &store)?;

        let provider = providers.get(&loaded.stmt.data_type)?;
        provider.validate(&loaded.stmt.data_type, &inputs).await?;
        let attrs = provider.read(&loaded.stmt.data_type, &inputs).await?;

        let scope_str = scope_string_for(module_path);
        let key = data_source_key(&scope_str, &loaded.stmt.data_type, &loaded.stmt.name);
        store.insert(key, attrs);
    }

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::ast::DataStmt;
    use std::collections::HashMap;

    fn loaded(module_path: Vec<String>, data_type: &str, name: &str, attrs: HashMap<String, Expression>) -> LoadedData {
        LoadedData {
            address: Address::new(module_path, data_type, name),
            stmt: DataStmt {
                data_type: data_type.to_string(),
                name: name.to_string(),
                attrs,
            },
        }
    }

    #[tokio::test]
    async fn evaluates_a_data_source_and_caches_under_scope() {
        let mut attrs = HashMap::new();
        attrs.insert("path".to_string(), Expression::String("/tmp/does-not-matter".to_string()));
        let data = vec![loaded(vec![], "null_resource", "n", attrs)];

        let scope = ScopeManager::new();
        let providers = ProviderRegistry::with_reference_providers();
        let store = evaluate_all(&data, &scope, &providers).await.unwrap();

        assert!(store.contains_key(&data_source_key("", "null_resource", "n")));
    }

    #[tokio::test]
    async fn rejects_a_data_source_that_depends_on_a_resource() {
        let mut attrs = HashMap::new();
        attrs.insert(
            "path".to_string(),
            Expression::Reference(vec!["local_file".into(), "a".into(), "id".into()]),
        );
        let data = vec![loaded(vec![], "null_resource", "n", attrs)];

        let scope = ScopeManager::new();
        let providers = ProviderRegistry::with_reference_providers();
        let err = evaluate_all(&data, &scope, &providers).await.unwrap_err();
        assert!(matches!(err, MiniformError::ConfigError(_)));
    }
}
