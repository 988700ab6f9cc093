//! Provider contract (§6): routes resource-type → provider implementation.
//!
//! This module also ships two small reference providers (`local_file`,
//! `null_resource`) used by the default CLI and the integration tests — they
//! exist only to make the engine runnable end-to-end, the same role the
//! teacher's own test fixtures play.

pub mod local_file;
pub mod null_resource;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MiniformError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    String,
    Number,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttrSchema {
    #[serde(rename = "type")]
    pub attr_type: AttrType,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "forceNew", default)]
    pub force_new: bool,
}

pub type Schema = HashMap<String, AttrSchema>;

/// A resource provider: the engine's only I/O boundary with the outside
/// world. Implementations are dyn-dispatched through `Arc<dyn Provider>` via
/// `async_trait`, mirroring the teacher's `StateBackend` trait-object idiom.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The finite set of resource type names this provider serves.
    fn resources(&self) -> Vec<String>;

    /// Schema for a resource type, or `None` if unsupported by this provider.
    fn get_schema(&self, resource_type: &str) -> Option<Schema>;

    async fn validate(&self, resource_type: &str, inputs: &serde_json::Value) -> Result<()>;

    async fn create(&self, resource_type: &str, inputs: &serde_json::Value) -> Result<String>;

    async fn update(&self, id: &str, resource_type: &str, inputs: &serde_json::Value) -> Result<()>;

    async fn delete(&self, id: &str, resource_type: &str) -> Result<()>;

    /// Used for `data` blocks: produces the attribute map for a read-only lookup.
    async fn read(&self, resource_type: &str, inputs: &serde_json::Value) -> Result<serde_json::Value>;
}

/// Routes resource/data-source types to the provider that serves them.
#[derive(Default)]
pub struct ProviderRegistry {
    by_type: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        for resource_type in provider.resources() {
            self.by_type.insert(resource_type, provider.clone());
        }
    }

    pub fn get(&self, resource_type: &str) -> Result<Arc<dyn Provider>> {
        self.by_type.get(resource_type).cloned().ok_or_else(|| {
            MiniformError::provider(format!("no provider registered for type '{}'", resource_type))
        })
    }

    /// The default registry shipped with the CLI: `local_file` + `null_resource`.
    pub fn with_reference_providers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(local_file::LocalFileProvider::default()));
        registry.register(Arc::new(null_resource::NullResourceProvider::default()));
        registry
    }
}
