//! Network-plane provider: VNet, public IP, security group, NIC.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{CloudError, Result};
use crate::providers::types::{
    NicDescriptor, NicSpec, PublicIpDescriptor, RuleDirection, SecurityGroup, SecurityGroupSpec,
    SecurityRule, VnetDescriptor, VnetSpec,
};
use crate::providers::NetworkProvider;

use super::client::ArmClient;

const NETWORK_API_VERSION: &str = "2023-09-01";

/// [`NetworkProvider`] backed by the Azure Network resource provider.
#[derive(Debug, Clone)]
pub struct AzureNetwork {
    client: Arc<ArmClient>,
}

impl AzureNetwork {
    /// Creates a network provider over the shared management client.
    #[must_use]
    pub fn new(client: Arc<ArmClient>) -> Self {
        Self { client }
    }

    fn resource_path(&self, resource_group: &str, kind: &str, name: &str) -> String {
        self.client.subscription_path(&format!(
            "/resourceGroups/{resource_group}/providers/Microsoft.Network/{kind}/{name}"
        ))
    }

    fn required_id(value: &Value, what: &str) -> Result<String> {
        value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CloudError::invalid_response(format!("{what} response without id")).into())
    }

    fn parse_rules(value: &Value) -> Vec<SecurityRule> {
        let Some(rules) = value
            .get("properties")
            .and_then(|p| p.get("securityRules"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        rules
            .iter()
            .filter_map(|rule| {
                let name = rule.get("name").and_then(Value::as_str)?;
                let props = rule.get("properties")?;
                let priority = u32::try_from(props.get("priority").and_then(Value::as_u64)?).ok()?;
                let direction = match props.get("direction").and_then(Value::as_str)? {
                    "Inbound" => RuleDirection::Inbound,
                    "Outbound" => RuleDirection::Outbound,
                    _ => return None,
                };
                let destination_port = props
                    .get("destinationPortRange")
                    .and_then(Value::as_str)?
                    .parse()
                    .ok()?;
                Some(SecurityRule {
                    name: name.to_string(),
                    direction,
                    priority,
                    destination_port,
                })
            })
            .collect()
    }

    fn rule_to_json(rule: &SecurityRule) -> Value {
        json!({
            "name": rule.name,
            "properties": {
                "protocol": "*",
                "sourcePortRange": "*",
                "destinationPortRange": rule.destination_port.to_string(),
                "sourceAddressPrefix": "*",
                "destinationAddressPrefix": "*",
                "access": "Allow",
                "priority": rule.priority,
                "direction": rule.direction.as_str(),
            },
        })
    }
}

#[async_trait]
impl NetworkProvider for AzureNetwork {
    async fn create_vnet(&self, resource_group: &str, spec: &VnetSpec) -> Result<VnetDescriptor> {
        let body = json!({
            "location": spec.location,
            "properties": {
                "addressSpace": { "addressPrefixes": [spec.address_prefix] },
                "subnets": [{
                    "name": spec.subnet_name,
                    "properties": { "addressPrefix": spec.subnet_prefix },
                }],
            },
        });

        let path = self.resource_path(resource_group, "virtualNetworks", &spec.name);
        let value = self
            .client
            .put_resource(&path, NETWORK_API_VERSION, &body, "create virtual network")
            .await?;

        let subnet_id = value
            .get("properties")
            .and_then(|p| p.get("subnets"))
            .and_then(Value::as_array)
            .and_then(|subnets| subnets.first())
            .and_then(|s| s.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| CloudError::invalid_response("VNet response without subnet id"))?
            .to_string();

        Ok(VnetDescriptor {
            id: Self::required_id(&value, "VNet")?,
            subnet_id,
        })
    }

    async fn delete_vnet(&self, resource_group: &str, name: &str) -> Result<()> {
        let path = self.resource_path(resource_group, "virtualNetworks", name);
        self.client
            .delete_resource(&path, NETWORK_API_VERSION, "delete virtual network")
            .await
    }

    async fn create_public_ip(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<PublicIpDescriptor> {
        let body = json!({
            "location": location,
            "properties": { "publicIPAllocationMethod": "Dynamic" },
        });

        let path = self.resource_path(resource_group, "publicIPAddresses", name);
        let value = self
            .client
            .put_resource(&path, NETWORK_API_VERSION, &body, "create public IP")
            .await?;

        Ok(PublicIpDescriptor {
            id: Self::required_id(&value, "public IP")?,
            ip_address: extract_ip_address(&value),
        })
    }

    async fn get_public_ip(&self, resource_group: &str, name: &str) -> Result<PublicIpDescriptor> {
        let path = self.resource_path(resource_group, "publicIPAddresses", name);
        let value = self.client.get_json(&path, NETWORK_API_VERSION).await?;
        Ok(PublicIpDescriptor {
            id: Self::required_id(&value, "public IP")?,
            ip_address: extract_ip_address(&value),
        })
    }

    async fn delete_public_ip(&self, resource_group: &str, name: &str) -> Result<()> {
        let path = self.resource_path(resource_group, "publicIPAddresses", name);
        self.client
            .delete_resource(&path, NETWORK_API_VERSION, "delete public IP")
            .await
    }

    async fn get_security_group(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<SecurityGroup>> {
        let path = self.resource_path(resource_group, "networkSecurityGroups", name);
        let Some(value) = self.client.get_optional(&path, NETWORK_API_VERSION).await? else {
            return Ok(None);
        };
        debug!("Security group '{name}' exists");
        Ok(Some(SecurityGroup {
            id: Self::required_id(&value, "security group")?,
            name: name.to_string(),
            rules: Self::parse_rules(&value),
        }))
    }

    async fn upsert_security_group(
        &self,
        resource_group: &str,
        spec: &SecurityGroupSpec,
    ) -> Result<SecurityGroup> {
        let body = json!({
            "location": spec.location,
            "properties": {
                "securityRules": spec.rules.iter().map(Self::rule_to_json).collect::<Vec<_>>(),
            },
        });

        let path = self.resource_path(resource_group, "networkSecurityGroups", &spec.name);
        let value = self
            .client
            .put_resource(&path, NETWORK_API_VERSION, &body, "upsert security group")
            .await?;

        Ok(SecurityGroup {
            id: Self::required_id(&value, "security group")?,
            name: spec.name.clone(),
            rules: Self::parse_rules(&value),
        })
    }

    async fn delete_security_group(&self, resource_group: &str, name: &str) -> Result<()> {
        let path = self.resource_path(resource_group, "networkSecurityGroups", name);
        self.client
            .delete_resource(&path, NETWORK_API_VERSION, "delete security group")
            .await
    }

    async fn create_nic(&self, resource_group: &str, spec: &NicSpec) -> Result<NicDescriptor> {
        let body = json!({
            "location": spec.location,
            "properties": {
                "ipConfigurations": [{
                    "name": spec.ip_config_name,
                    "properties": {
                        "subnet": { "id": spec.subnet_id },
                        "publicIPAddress": { "id": spec.public_ip_id },
                    },
                }],
                "networkSecurityGroup": { "id": spec.nsg_id },
            },
        });

        let path = self.resource_path(resource_group, "networkInterfaces", &spec.name);
        let value = self
            .client
            .put_resource(&path, NETWORK_API_VERSION, &body, "create network interface")
            .await?;

        Ok(NicDescriptor {
            id: Self::required_id(&value, "NIC")?,
            public_ip_name: extract_public_ip_name(&value),
        })
    }

    async fn get_nic(&self, resource_group: &str, name: &str) -> Result<NicDescriptor> {
        let path = self.resource_path(resource_group, "networkInterfaces", name);
        let value = self.client.get_json(&path, NETWORK_API_VERSION).await?;
        Ok(NicDescriptor {
            id: Self::required_id(&value, "NIC")?,
            public_ip_name: extract_public_ip_name(&value),
        })
    }

    async fn delete_nic(&self, resource_group: &str, name: &str) -> Result<()> {
        let path = self.resource_path(resource_group, "networkInterfaces", name);
        self.client
            .delete_resource(&path, NETWORK_API_VERSION, "delete network interface")
            .await
    }
}

fn extract_ip_address(value: &Value) -> Option<String> {
    value
        .get("properties")
        .and_then(|p| p.get("ipAddress"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// The public IP name is the last id segment of the bound address.
fn extract_public_ip_name(value: &Value) -> Option<String> {
    value
        .get("properties")
        .and_then(|p| p.get("ipConfigurations"))
        .and_then(Value::as_array)
        .and_then(|configs| configs.first())
        .and_then(|c| c.get("properties"))
        .and_then(|p| p.get("publicIPAddress"))
        .and_then(|ip| ip.get("id"))
        .and_then(Value::as_str)
        .and_then(|id| id.rsplit('/').next())
        .map(str::to_string)
}
