//! Compute-plane provider: the VM, its disk, and the script extension.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::{CloudError, Result};
use crate::providers::types::{ExtensionSpec, VmDescriptor, VmSpec};
use crate::providers::ComputeProvider;

use super::client::ArmClient;

const COMPUTE_API_VERSION: &str = "2024-03-01";

/// Name under which the bootstrap extension is installed on the VM.
const EXTENSION_NAME: &str = "bootstrap";

/// [`ComputeProvider`] backed by the Azure Compute resource provider.
#[derive(Debug, Clone)]
pub struct AzureCompute {
    client: Arc<ArmClient>,
}

impl AzureCompute {
    /// Creates a compute provider over the shared management client.
    #[must_use]
    pub fn new(client: Arc<ArmClient>) -> Self {
        Self { client }
    }

    fn vm_path(&self, resource_group: &str, name: &str) -> String {
        self.client.subscription_path(&format!(
            "/resourceGroups/{resource_group}/providers/Microsoft.Compute/virtualMachines/{name}"
        ))
    }

    fn disk_path(&self, resource_group: &str, name: &str) -> String {
        self.client.subscription_path(&format!(
            "/resourceGroups/{resource_group}/providers/Microsoft.Compute/disks/{name}"
        ))
    }
}

#[async_trait]
impl ComputeProvider for AzureCompute {
    async fn create_vm(&self, resource_group: &str, spec: &VmSpec) -> Result<VmDescriptor> {
        let body = json!({
            "location": spec.location,
            "properties": {
                "hardwareProfile": { "vmSize": spec.size },
                "storageProfile": {
                    "imageReference": {
                        "publisher": spec.image.publisher,
                        "offer": spec.image.offer,
                        "sku": spec.image.sku,
                        "version": spec.image.version,
                    },
                    "osDisk": {
                        "name": spec.os_disk_name,
                        "createOption": "FromImage",
                        "diskSizeGB": spec.os_disk_gb,
                        "managedDisk": { "storageAccountType": "Standard_LRS" },
                    },
                },
                "osProfile": {
                    "computerName": spec.name,
                    "adminUsername": spec.admin_username,
                    "adminPassword": spec.admin_password,
                    // The bootstrap extension logs in with the password.
                    "linuxConfiguration": { "disablePasswordAuthentication": false },
                },
                "networkProfile": {
                    "networkInterfaces": [{ "id": spec.nic_id, "properties": { "primary": true } }],
                },
            },
        });

        let path = self.vm_path(resource_group, &spec.name);
        let value = self
            .client
            .put_resource(&path, COMPUTE_API_VERSION, &body, "create virtual machine")
            .await?;

        let id = value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CloudError::invalid_response("VM response without id"))?;
        debug!("VM '{}' provisioned ({id})", spec.name);

        Ok(VmDescriptor {
            id: id.to_string(),
            name: spec.name.clone(),
            os_disk_name: spec.os_disk_name.clone(),
        })
    }

    async fn delete_vm(&self, resource_group: &str, name: &str) -> Result<()> {
        let path = self.vm_path(resource_group, name);
        self.client
            .delete_resource(&path, COMPUTE_API_VERSION, "delete virtual machine")
            .await
    }

    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()> {
        let path = self.disk_path(resource_group, name);
        self.client
            .delete_resource(&path, COMPUTE_API_VERSION, "delete disk")
            .await
    }

    async fn run_extension(
        &self,
        resource_group: &str,
        vm_name: &str,
        spec: &ExtensionSpec,
    ) -> Result<()> {
        let body = json!({
            "location": spec.location,
            "properties": {
                "publisher": "Microsoft.Azure.Extensions",
                "type": "CustomScript",
                "typeHandlerVersion": "2.1",
                "autoUpgradeMinorVersion": true,
                // The signed URL and command stay out of the visible
                // settings block.
                "protectedSettings": {
                    "fileUris": [spec.artifact_url],
                    "commandToExecute": spec.command,
                },
            },
        });

        let path = format!(
            "{}/extensions/{EXTENSION_NAME}",
            self.vm_path(resource_group, vm_name)
        );
        self.client
            .put_resource_bounded(
                &path,
                COMPUTE_API_VERSION,
                &body,
                "run bootstrap extension",
                spec.timeout,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AzureCredentials;
    use crate::providers::types::ImageReference;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn compute(server: &MockServer) -> AzureCompute {
        let credentials = AzureCredentials {
            tenant_id: String::from("tenant"),
            client_id: String::from("client"),
            client_secret: String::from("secret"),
            subscription_id: String::from("sub-1"),
        };
        let client = ArmClient::with_endpoints(credentials, &server.uri(), &server.uri())
            .unwrap()
            .with_poll_interval(Duration::from_millis(1));
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "expires_in": 3600,
            })))
            .mount(server)
            .await;
        AzureCompute::new(Arc::new(client))
    }

    fn vm_spec() -> VmSpec {
        VmSpec {
            name: String::from("smtp"),
            location: String::from("uksouth"),
            size: String::from("Standard_B2s"),
            os_disk_name: String::from("smtp-os-disk"),
            os_disk_gb: 128,
            admin_username: String::from("azureuser"),
            admin_password: String::from("password1234!"),
            nic_id: String::from("/nic-id"),
            image: ImageReference::ubuntu_24_04(),
        }
    }

    #[tokio::test]
    async fn test_create_vm_sends_image_and_disk_profile() {
        let server = MockServer::start().await;
        let compute = compute(&server).await;

        Mock::given(method("PUT"))
            .and(path(
                "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/smtp",
            ))
            .and(body_partial_json(json!({
                "properties": {
                    "storageProfile": {
                        "imageReference": { "offer": "ubuntu-24_04-lts", "sku": "server" },
                        "osDisk": { "createOption": "FromImage", "diskSizeGB": 128 },
                    },
                    "osProfile": {
                        "linuxConfiguration": { "disablePasswordAuthentication": false },
                    },
                },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "/vm-id",
                "properties": { "provisioningState": "Succeeded" },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let vm = compute.create_vm("rg", &vm_spec()).await.unwrap();
        assert_eq!(vm.id, "/vm-id");
        assert_eq!(vm.os_disk_name, "smtp-os-disk");
    }

    #[tokio::test]
    async fn test_extension_url_stays_in_protected_settings() {
        let server = MockServer::start().await;
        let compute = compute(&server).await;

        Mock::given(method("PUT"))
            .and(path(
                "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/smtp/extensions/bootstrap",
            ))
            .and(body_partial_json(json!({
                "properties": {
                    "type": "CustomScript",
                    "protectedSettings": { "commandToExecute": "bash smtp-setup.sh" },
                },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "/ext-id",
                "properties": { "provisioningState": "Succeeded" },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let spec = ExtensionSpec {
            location: String::from("uksouth"),
            artifact_url: String::from("https://example.blob/x?sig=y"),
            command: String::from("bash smtp-setup.sh"),
            timeout: Duration::from_secs(600),
        };
        compute.run_extension("rg", "smtp", &spec).await.unwrap();
    }
}
