//! Canonical identifier for any addressable entity (§4.3).

use std::fmt;

use crate::error::{MiniformError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub module_path: Vec<String>,
    pub resource_type: String,
    pub name: String,
}

impl Address {
    pub fn new(module_path: Vec<String>, resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module_path,
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    pub fn root(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Vec::new(), resource_type, name)
    }

    /// Prepend `module_name` to this address's module path, for the
    /// recursive descent the module loader performs.
    pub fn with_parent(&self, module_name: &str) -> Self {
        let mut module_path = vec![module_name.to_string()];
        module_path.extend(self.module_path.clone());
        Self {
            module_path,
            resource_type: self.resource_type.clone(),
            name: self.name.clone(),
        }
    }

    /// The module prefix alone, e.g. `module.a.module.b`, or empty at root.
    pub fn scope_string(&self) -> String {
        scope_string_for(&self.module_path)
    }

    /// Parse `(module.X.)*type.name` into an `Address`.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() < 2 {
            return Err(MiniformError::config(format!(
                "malformed address '{}': expected at least type.name",
                s
            )));
        }

        let mut module_path = Vec::new();
        let mut i = 0;
        while i + 1 < parts.len() && parts[i] == "module" {
            module_path.push(parts[i + 1].to_string());
            i += 2;
        }

        let remaining = &parts[i..];
        if remaining.len() != 2 {
            return Err(MiniformError::config(format!(
                "malformed address '{}': expected type.name after module prefix",
                s
            )));
        }

        Ok(Address::new(module_path, remaining[0], remaining[1]))
    }
}

/// Render a module path as a scope string, shared with callers that only
/// have a `Vec<String>` (e.g. the scope manager, the loader).
pub fn scope_string_for(module_path: &[String]) -> String {
    if module_path.is_empty() {
        return String::new();
    }
    module_path
        .iter()
        .map(|m| format!("module.{}", m))
        .collect::<Vec<_>>()
        .join(".")
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module_path.is_empty() {
            write!(f, "{}.{}", self.resource_type, self.name)
        } else {
            write!(
                f,
                "{}.{}.{}",
                scope_string_for(&self.module_path),
                self.resource_type,
                self.name
            )
        }
    }
}
