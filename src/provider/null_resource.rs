//! Reference provider with no external effect, used to test dependency
//! ordering without touching the filesystem or network. `id` is a random
//! UUID minted on create and stable across updates.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::provider::{AttrSchema, AttrType, Provider, Schema};

#[derive(Default)]
pub struct NullResourceProvider;

const RESOURCE_TYPE: &str = "null_resource";

fn schema() -> Schema {
    let mut s = HashMap::new();
    s.insert(
        "triggers".to_string(),
        AttrSchema {
            attr_type: AttrType::String,
            required: false,
            force_new: false,
        },
    );
    s
}

#[async_trait]
impl Provider for NullResourceProvider {
    fn resources(&self) -> Vec<String> {
        vec![RESOURCE_TYPE.to_string()]
    }

    fn get_schema(&self, resource_type: &str) -> Option<Schema> {
        (resource_type == RESOURCE_TYPE).then(schema)
    }

    async fn validate(&self, _resource_type: &str, _inputs: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn create(&self, _resource_type: &str, _inputs: &serde_json::Value) -> Result<String> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn update(&self, _id: &str, _resource_type: &str, _inputs: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _id: &str, _resource_type: &str) -> Result<()> {
        Ok(())
    }

    async fn read(&self, _resource_type: &str, inputs: &serde_json::Value) -> Result<serde_json::Value> {
        Ok(inputs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_returns_a_uuid() {
        let provider = NullResourceProvider::default();
        let id = provider.create(RESOURCE_TYPE, &serde_json::json!({})).await.unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }
}
