//! Reference provider: manages a single file's content on disk.
//!
//! `id = path` (absolute path used as the stable identifier); `path` is
//! `forceNew` since renaming a file is semantically a replace, not an
//! in-place update.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{MiniformError, Result};
use crate::provider::{AttrSchema, AttrType, Provider, Schema};

#[derive(Default)]
pub struct LocalFileProvider;

const RESOURCE_TYPE: &str = "local_file";

fn schema() -> Schema {
    let mut s = HashMap::new();
    s.insert(
        "path".to_string(),
        AttrSchema {
            attr_type: AttrType::String,
            required: true,
            force_new: true,
        },
    );
    s.insert(
        "content".to_string(),
        AttrSchema {
            attr_type: AttrType::String,
            required: true,
            force_new: false,
        },
    );
    s
}

fn extract_path(inputs: &serde_json::Value) -> Result<String> {
    inputs
        .get("path")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| MiniformError::provider("local_file requires a 'path' attribute"))
}

fn extract_content(inputs: &serde_json::Value) -> Result<String> {
    inputs
        .get("content")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| MiniformError::provider("local_file requires a 'content' attribute"))
}

#[async_trait]
impl Provider for LocalFileProvider {
    fn resources(&self) -> Vec<String> {
        vec![RESOURCE_TYPE.to_string()]
    }

    fn get_schema(&self, resource_type: &str) -> Option<Schema> {
        (resource_type == RESOURCE_TYPE).then(schema)
    }

    async fn validate(&self, resource_type: &str, inputs: &serde_json::Value) -> Result<()> {
        if resource_type != RESOURCE_TYPE {
            return Err(MiniformError::provider(format!(
                "local_file provider cannot validate type '{}'",
                resource_type
            )));
        }
        extract_path(inputs)?;
        extract_content(inputs)?;
        Ok(())
    }

    async fn create(&self, _resource_type: &str, inputs: &serde_json::Value) -> Result<String> {
        let path = extract_path(inputs)?;
        let content = extract_content(inputs)?;
        std::fs::write(&path, &content)
            .map_err(|e| MiniformError::provider(format!("failed to write '{}': {}", path, e)))?;
        Ok(path)
    }

    async fn update(&self, id: &str, _resource_type: &str, inputs: &serde_json::Value) -> Result<()> {
        let content = extract_content(inputs)?;
        std::fs::write(id, &content)
            .map_err(|e| MiniformError::provider(format!("failed to rewrite '{}': {}", id, e)))?;
        Ok(())
    }

    async fn delete(&self, id: &str, _resource_type: &str) -> Result<()> {
        match std::fs::remove_file(id) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MiniformError::provider(format!(
                "failed to remove '{}': {}",
                id, e
            ))),
        }
    }

    async fn read(&self, _resource_type: &str, inputs: &serde_json::Value) -> Result<serde_json::Value> {
        let path = extract_path(inputs)?;
        let content = std::fs::read_to_string(&path)
            .map_err(|e| MiniformError::provider(format!("failed to read '{}': {}", path, e)))?;
        Ok(serde_json::json!({ "path": path, "content": content }))
    }
}
