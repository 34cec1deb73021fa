//! Resource group provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::providers::ResourceGroupProvider;

use super::client::ArmClient;

const RESOURCES_API_VERSION: &str = "2021-04-01";

/// [`ResourceGroupProvider`] backed by Azure Resource Manager.
#[derive(Debug, Clone)]
pub struct AzureResourceGroups {
    client: Arc<ArmClient>,
}

impl AzureResourceGroups {
    /// Creates a resource group provider over the shared client.
    #[must_use]
    pub fn new(client: Arc<ArmClient>) -> Self {
        Self { client }
    }

    fn group_path(&self, name: &str) -> String {
        self.client
            .subscription_path(&format!("/resourcegroups/{name}"))
    }
}

#[async_trait]
impl ResourceGroupProvider for AzureResourceGroups {
    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.group_path(name);
        Ok(self
            .client
            .get_optional(&path, RESOURCES_API_VERSION)
            .await?
            .is_some())
    }

    async fn ensure(&self, name: &str, location: &str) -> Result<()> {
        let body = json!({ "location": location });
        let path = self.group_path(name);
        self.client
            .put_resource(&path, RESOURCES_API_VERSION, &body, "create resource group")
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.group_path(name);
        self.client
            .delete_resource(&path, RESOURCES_API_VERSION, "delete resource group")
            .await
    }
}
