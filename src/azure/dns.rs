//! Managed DNS provider: zones and record sets.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{CloudError, Result};
use crate::plan::RecordType;
use crate::providers::types::{DnsZone, RecordData};
use crate::providers::DnsProvider;

use super::client::ArmClient;

const DNS_API_VERSION: &str = "2018-05-01";

/// [`DnsProvider`] backed by Azure DNS.
#[derive(Debug, Clone)]
pub struct AzureDns {
    client: Arc<ArmClient>,
}

impl AzureDns {
    /// Creates a DNS provider over the shared management client.
    #[must_use]
    pub fn new(client: Arc<ArmClient>) -> Self {
        Self { client }
    }

    fn zone_path(&self, resource_group: &str, zone: &str) -> String {
        self.client.subscription_path(&format!(
            "/resourceGroups/{resource_group}/providers/Microsoft.Network/dnsZones/{zone}"
        ))
    }

    fn record_path(
        &self,
        resource_group: &str,
        zone: &str,
        relative_name: &str,
        record_type: RecordType,
    ) -> String {
        format!(
            "{}/{}/{relative_name}",
            self.zone_path(resource_group, zone),
            record_type.as_str()
        )
    }

    fn parse_zone(value: &Value, zone: &str) -> DnsZone {
        let name_servers = value
            .get("properties")
            .and_then(|p| p.get("nameServers"))
            .and_then(Value::as_array)
            .map(|servers| {
                servers
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        DnsZone {
            name: zone.to_string(),
            name_servers,
        }
    }

    fn record_properties(data: &RecordData) -> Value {
        match data {
            RecordData::A { address } => json!({
                "ARecords": [{ "ipv4Address": address }],
            }),
            RecordData::Cname { target } => json!({
                "CNAMERecord": { "cname": target },
            }),
            RecordData::Txt { values } => json!({
                "TXTRecords": [{ "value": values }],
            }),
            RecordData::Mx {
                preference,
                exchange,
            } => json!({
                "MXRecords": [{ "preference": preference, "exchange": exchange }],
            }),
        }
    }
}

#[async_trait]
impl DnsProvider for AzureDns {
    async fn get_zone(&self, resource_group: &str, domain: &str) -> Result<Option<DnsZone>> {
        let path = self.zone_path(resource_group, domain);
        let Some(value) = self.client.get_optional(&path, DNS_API_VERSION).await? else {
            return Ok(None);
        };
        debug!("DNS zone '{domain}' exists");
        Ok(Some(Self::parse_zone(&value, domain)))
    }

    async fn create_zone(&self, resource_group: &str, domain: &str) -> Result<DnsZone> {
        // Zones are global; location is fixed by the API.
        let body = json!({ "location": "global" });
        let path = self.zone_path(resource_group, domain);
        let value = self
            .client
            .put_resource(&path, DNS_API_VERSION, &body, "create DNS zone")
            .await?;
        let zone = Self::parse_zone(&value, domain);
        if zone.name_servers.is_empty() {
            return Err(
                CloudError::invalid_response("zone response without nameServers").into(),
            );
        }
        Ok(zone)
    }

    async fn upsert_record_set(
        &self,
        resource_group: &str,
        zone: &str,
        relative_name: &str,
        ttl: u32,
        data: &RecordData,
    ) -> Result<()> {
        let mut properties = Self::record_properties(data);
        properties["TTL"] = json!(ttl);
        let body = json!({ "properties": properties });

        let path = self.record_path(resource_group, zone, relative_name, data.record_type());
        self.client
            .put_resource(&path, DNS_API_VERSION, &body, "upsert record set")
            .await?;
        Ok(())
    }

    async fn delete_record_set(
        &self,
        resource_group: &str,
        zone: &str,
        relative_name: &str,
        record_type: RecordType,
    ) -> Result<()> {
        let path = self.record_path(resource_group, zone, relative_name, record_type);
        self.client
            .delete_resource(&path, DNS_API_VERSION, "delete record set")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AzureCredentials, DNS_RECORD_TTL};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn dns(server: &MockServer) -> AzureDns {
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
        AzureDns::new(Arc::new(client))
    }

    #[tokio::test]
    async fn test_create_zone_returns_assigned_nameservers() {
        let server = MockServer::start().await;
        let dns = dns(&server).await;

        Mock::given(method("PUT"))
            .and(path(
                "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Network/dnsZones/example.com",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "/zone-id",
                "properties": {
                    "provisioningState": "Succeeded",
                    "nameServers": ["ns1-01.azure-dns.com.", "ns2-01.azure-dns.net."],
                },
            })))
            .mount(&server)
            .await;

        let zone = dns.create_zone("rg", "example.com").await.unwrap();
        assert_eq!(zone.name_servers.len(), 2);
    }

    #[tokio::test]
    async fn test_txt_record_set_body_shape() {
        let server = MockServer::start().await;
        let dns = dns(&server).await;

        Mock::given(method("PUT"))
            .and(path(
                "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Network/dnsZones/example.com/TXT/_dmarc",
            ))
            .and(body_partial_json(json!({
                "properties": {
                    "TTL": DNS_RECORD_TTL,
                    "TXTRecords": [{ "value": ["v=DMARC1; p=quarantine"] }],
                },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "/rs-id" })))
            .expect(1)
            .mount(&server)
            .await;

        let data = RecordData::Txt {
            values: vec![String::from("v=DMARC1; p=quarantine")],
        };
        dns.upsert_record_set("rg", "example.com", "_dmarc", DNS_RECORD_TTL, &data)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_targets_type_specific_path() {
        let server = MockServer::start().await;
        let dns = dns(&server).await;

        Mock::given(method("DELETE"))
            .and(path(
                "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Network/dnsZones/example.com/MX/@",
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        dns.delete_record_set("rg", "example.com", "@", RecordType::Mx)
            .await
            .unwrap();
    }
}
