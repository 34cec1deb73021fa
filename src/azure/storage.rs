//! Storage providers: the management plane for accounts and the blob data
//! plane for the staged bootstrap script.
//!
//! The data plane does not go through Resource Manager; requests are
//! signed directly with the account key (Shared Key), and the read URL
//! handed to the VM is a service SAS computed from the same key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::{header, Client, Method, StatusCode};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::debug;

use crate::error::{CloudError, Result};
use crate::providers::types::{BlobAccess, StorageKeys};
use crate::providers::{BlobStore, StorageProvider};

use super::client::ArmClient;

const STORAGE_MGMT_API_VERSION: &str = "2023-01-01";

/// Data-plane protocol version sent and signed on every request.
const STORAGE_DATA_API_VERSION: &str = "2021-08-06";

/// [`StorageProvider`] backed by the Azure Storage resource provider.
#[derive(Debug, Clone)]
pub struct AzureStorage {
    client: Arc<ArmClient>,
}

impl AzureStorage {
    /// Creates a storage management provider over the shared client.
    #[must_use]
    pub fn new(client: Arc<ArmClient>) -> Self {
        Self { client }
    }

    fn account_path(&self, resource_group: &str, name: &str) -> String {
        self.client.subscription_path(&format!(
            "/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{name}"
        ))
    }
}

#[async_trait]
impl StorageProvider for AzureStorage {
    async fn account_exists(&self, resource_group: &str, name: &str) -> Result<bool> {
        let path = self.account_path(resource_group, name);
        Ok(self
            .client
            .get_optional(&path, STORAGE_MGMT_API_VERSION)
            .await?
            .is_some())
    }

    async fn create_account(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<()> {
        let body = json!({
            "location": location,
            "sku": { "name": "Standard_LRS" },
            "kind": "StorageV2",
        });
        let path = self.account_path(resource_group, name);
        self.client
            .put_resource(&path, STORAGE_MGMT_API_VERSION, &body, "create storage account")
            .await?;
        Ok(())
    }

    async fn list_keys(&self, resource_group: &str, name: &str) -> Result<StorageKeys> {
        let path = format!("{}/listKeys", self.account_path(resource_group, name));
        let value = self
            .client
            .post_json(&path, STORAGE_MGMT_API_VERSION, &json!({}))
            .await?;

        let primary = value
            .get("keys")
            .and_then(Value::as_array)
            .and_then(|keys| keys.first())
            .and_then(|k| k.get("value"))
            .and_then(Value::as_str)
            .ok_or_else(|| CloudError::invalid_response("listKeys response without keys"))?
            .to_string();

        Ok(StorageKeys { primary })
    }

    async fn delete_account(&self, resource_group: &str, name: &str) -> Result<()> {
        let path = self.account_path(resource_group, name);
        self.client
            .delete_resource(&path, STORAGE_MGMT_API_VERSION, "delete storage account")
            .await
    }
}

/// [`BlobStore`] talking straight to the blob endpoint with Shared Key
/// request signing.
#[derive(Debug, Clone)]
pub struct AzureBlobStore {
    http: Client,
    endpoint_override: Option<String>,
}

impl AzureBlobStore {
    /// Creates a blob store against the public blob endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CloudError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint_override: None,
        })
    }

    /// Points every account at a fixed endpoint instead of
    /// `https://{account}.blob.core.windows.net`. Test hook.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint_override = Some(endpoint.trim_end_matches('/').to_string());
        self
    }

    fn endpoint(&self, account: &str) -> String {
        self.endpoint_override
            .clone()
            .unwrap_or_else(|| format!("https://{account}.blob.core.windows.net"))
    }

    /// Sends one signed data-plane request.
    ///
    /// `resource` is `container` or `container/blob`; `params` are the
    /// query parameters, which also enter the signature.
    async fn request(
        &self,
        access: &BlobAccess,
        method: Method,
        resource: &str,
        params: &[(&str, &str)],
        body: Option<String>,
        extra_headers: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let content_length = body.as_ref().map_or(0, String::len);

        let mut ms_headers: Vec<(String, String)> = vec![
            (String::from("x-ms-date"), date.clone()),
            (
                String::from("x-ms-version"),
                String::from(STORAGE_DATA_API_VERSION),
            ),
        ];
        for (name, value) in extra_headers {
            ms_headers.push(((*name).to_string(), (*value).to_string()));
        }
        ms_headers.sort();

        let canonicalized_headers: String = ms_headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();

        let mut sorted_params: Vec<(&str, &str)> = params.to_vec();
        sorted_params.sort_unstable();
        let canonicalized_resource: String = std::iter::once(format!(
            "/{}/{resource}",
            access.account
        ))
        .chain(
            sorted_params
                .iter()
                .map(|(name, value)| format!("\n{name}:{value}")),
        )
        .collect();

        // Shared Key string-to-sign, 2015-02-21 and later: a zero
        // Content-Length is signed as the empty string.
        let length_field = if content_length == 0 {
            String::new()
        } else {
            content_length.to_string()
        };
        let string_to_sign = format!(
            "{verb}\n\n\n{length_field}\n\n\n\n\n\n\n\n\n{canonicalized_headers}{canonicalized_resource}",
            verb = method.as_str(),
        );
        let signature = sign_hmac_sha256(&access.key, &string_to_sign)?;

        let mut url = format!("{}/{resource}", self.endpoint(&access.account));
        if !params.is_empty() {
            let query: Vec<String> = params
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            url = format!("{url}?{}", query.join("&"));
        }

        let mut request = self.http.request(method, &url).header(
            header::AUTHORIZATION,
            format!("SharedKey {}:{signature}", access.account),
        );
        for (name, value) in &ms_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        request
            .send()
            .await
            .map_err(|e| CloudError::network(format!("Blob request failed: {e}")).into())
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn ensure_container(&self, access: &BlobAccess, container: &str) -> Result<()> {
        let response = self
            .request(
                access,
                Method::PUT,
                container,
                &[("restype", "container")],
                None,
                &[],
            )
            .await?;

        match response.status() {
            StatusCode::CREATED => Ok(()),
            StatusCode::CONFLICT => {
                debug!("Container '{container}' already exists");
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(CloudError::api_error(status.as_u16(), body).into())
            }
        }
    }

    async fn upload(
        &self,
        access: &BlobAccess,
        container: &str,
        blob: &str,
        content: &str,
    ) -> Result<()> {
        let resource = format!("{container}/{blob}");
        let response = self
            .request(
                access,
                Method::PUT,
                &resource,
                &[],
                Some(content.to_string()),
                &[("x-ms-blob-type", "BlockBlob")],
            )
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(CloudError::api_error(status.as_u16(), body).into())
        }
    }

    async fn signed_read_url(
        &self,
        access: &BlobAccess,
        container: &str,
        blob: &str,
        ttl: Duration,
    ) -> Result<String> {
        let now = Utc::now();
        let expiry = now
            + chrono::TimeDelta::from_std(ttl)
                .map_err(|e| CloudError::invalid_response(format!("SAS TTL out of range: {e}")))?;
        let url = self.sas_url(access, container, blob, now, expiry)?;
        Ok(url)
    }

    async fn delete_blob(&self, access: &BlobAccess, container: &str, blob: &str) -> Result<()> {
        let resource = format!("{container}/{blob}");
        let response = self
            .request(access, Method::DELETE, &resource, &[], None, &[])
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(CloudError::not_found(resource).into()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(CloudError::api_error(status.as_u16(), body).into())
            }
        }
    }

    async fn delete_container(&self, access: &BlobAccess, container: &str) -> Result<()> {
        let response = self
            .request(
                access,
                Method::DELETE,
                container,
                &[("restype", "container")],
                None,
                &[],
            )
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(CloudError::not_found(container).into()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(CloudError::api_error(status.as_u16(), body).into())
            }
        }
    }
}

impl AzureBlobStore {
    /// Computes a read-only service SAS URL for one blob.
    fn sas_url(
        &self,
        access: &BlobAccess,
        container: &str,
        blob: &str,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<String> {
        let permissions = "r";
        let start = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let expiry = expiry.to_rfc3339_opts(SecondsFormat::Secs, true);
        let canonicalized_resource = format!("/blob/{}/{container}/{blob}", access.account);

        // Service SAS string-to-sign for version 2020-12-06 and later.
        let string_to_sign = format!(
            "{permissions}\n{start}\n{expiry}\n{canonicalized_resource}\n\n\n\n{version}\nb\n\n\n\n\n\n\n",
            version = STORAGE_DATA_API_VERSION,
        );
        let signature = sign_hmac_sha256(&access.key, &string_to_sign)?;

        Ok(format!(
            "{endpoint}/{container}/{blob}?sp={permissions}&st={st}&se={se}&sv={version}&sr=b&sig={sig}",
            endpoint = self.endpoint(&access.account),
            st = percent_encode(&start),
            se = percent_encode(&expiry),
            version = STORAGE_DATA_API_VERSION,
            sig = percent_encode(&signature),
        ))
    }
}

/// HMAC-SHA256 over the string-to-sign with the base64 account key.
fn sign_hmac_sha256(key_base64: &str, string_to_sign: &str) -> Result<String> {
    let key = BASE64
        .decode(key_base64)
        .map_err(|e| CloudError::invalid_response(format!("Account key is not base64: {e}")))?;
    let mut mac = Hmac::<Sha256>::new_from_slice(&key)
        .map_err(|e| CloudError::invalid_response(format!("Account key rejected: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Percent-encodes the characters that appear in base64 signatures and
/// RFC 3339 timestamps.
fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '+' => out.push_str("%2B"),
            '/' => out.push_str("%2F"),
            '=' => out.push_str("%3D"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    out
}
