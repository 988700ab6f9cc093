//! Module Loader (§4.5): recursively loads and parses sub-module files,
//! flattening the module tree into a single address space and binding
//! variable inputs into the Scope Manager.
//!
//! The loader is purely filesystem-deterministic — it never calls a provider.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::address::{scope_string_for, Address};
use crate::ast::{DataStmt, Expression, Program, ResourceStmt, Statement};
use crate::error::{MiniformError, Result};
use crate::lexer::lex;
use crate::parser::parse;
use crate::scope::{BoundValue, ScopeManager};

#[derive(Debug, Clone)]
pub struct LoadedResource {
    pub address: Address,
    pub stmt: ResourceStmt,
}

#[derive(Debug, Clone)]
pub struct LoadedData {
    pub address: Address,
    pub stmt: DataStmt,
}

#[derive(Debug, Clone)]
pub struct LoadedOutput {
    pub scope: String,
    pub name: String,
    pub value: Expression,
}

#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub module_path: Vec<String>,
    pub statements: Program,
}

#[derive(Debug, Default)]
pub struct LoadResult {
    pub resources: Vec<LoadedResource>,
    pub data_sources: Vec<LoadedData>,
    pub outputs: Vec<LoadedOutput>,
    pub modules: Vec<LoadedModule>,
    pub scope: ScopeManager,
}

const ROOT_FILE: &str = "main.mini";
const MODULE_FILE: &str = "main.mf";

/// Load the root configuration at `root_dir` (containing `main.mini`) and
/// recursively every sub-module it references.
pub fn load_root(root_dir: &Path) -> Result<LoadResult> {
    let mut result = LoadResult::default();
    let mut seen_addresses: HashSet<String> = HashSet::new();
    load_module(root_dir, Vec::new(), ROOT_FILE, &mut result, &mut seen_addresses)?;
    Ok(result)
}

fn load_module(
    dir: &Path,
    module_path: Vec<String>,
    file_name: &str,
    result: &mut LoadResult,
    seen_addresses: &mut HashSet<String>,
) -> Result<()> {
    let file_path = dir.join(file_name);
    let source = fs::read_to_string(&file_path).map_err(|e| {
        MiniformError::config(format!("failed to read '{}': {}", file_path.display(), e))
    })?;

    let tokens = lex(&source)?;
    let program = parse(&tokens)?;
    let scope_str = scope_string_for(&module_path);

    result.modules.push(LoadedModule {
        module_path: module_path.clone(),
        statements: program.clone(),
    });

    for stmt in &program {
        match stmt {
            Statement::Variable(v) => {
                // Caller-supplied inputs (set by the parent before recursing,
                // step 4 below) win over the module's own declared default.
                if !result.scope.has_variable(&scope_str, &v.name) {
                    if let Some(default) = v.default_value() {
                        result.scope.set_variable(
                            &scope_str,
                            &v.name,
                            BoundValue {
                                raw: default.clone(),
                                def_ctx: module_path.clone(),
                            },
                        );
                    }
                }
            }
            Statement::Resource(r) => {
                let addr = Address::new(module_path.clone(), r.resource_type.clone(), r.name.clone());
                let key = addr.to_string();
                if !seen_addresses.insert(key.clone()) {
                    return Err(MiniformError::config(format!(
                        "duplicate resource address '{}'",
                        key
                    )));
                }
                result.resources.push(LoadedResource {
                    address: addr,
                    stmt: r.clone(),
                });
            }
            Statement::Data(d) => {
                let addr = Address::new(module_path.clone(), d.data_type.clone(), d.name.clone());
                result.data_sources.push(LoadedData {
                    address: addr,
                    stmt: d.clone(),
                });
            }
            Statement::Output(o) => {
                result.outputs.push(LoadedOutput {
                    scope: scope_str.clone(),
                    name: o.name.clone(),
                    value: o.value.clone(),
                });
            }
            Statement::Module(m) => {
                let source = m.source().ok_or_else(|| {
                    MiniformError::config(format!("module '{}' has no 'source' attribute", m.name))
                })?;

                let mut child_path = module_path.clone();
                child_path.push(m.name.clone());
                let child_scope = scope_string_for(&child_path);

                // Step 4: bind every non-source attribute as a caller input
                // in the child's scope, keeping the raw AST value and
                // recording the PARENT's module path as defCtx so the value
                // is resolved in the caller's scope, not the callee's.
                for (key, value) in m.inputs() {
                    result.scope.set_variable(
                        &child_scope,
                        key,
                        BoundValue {
                            raw: value.clone(),
                            def_ctx: module_path.clone(),
                        },
                    );
                }

                let child_dir: PathBuf = dir.join(source);
                load_module(&child_dir, child_path, MODULE_FILE, result, seen_addresses)?;
            }
        }
    }

    Ok(())
}
