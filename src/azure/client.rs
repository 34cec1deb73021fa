//! Azure Resource Manager HTTP client.
//!
//! This module provides the authenticated HTTP client the management-plane
//! providers share: OAuth2 client-credentials token acquisition, request
//! helpers, and polling for long-running operations. Azure accepts most
//! mutations asynchronously and reports the terminal state through an
//! operation URL; nothing here returns before that terminal state is known.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::config::AzureCredentials;
use crate::error::{CloudError, Result};

/// Default Azure management endpoint.
const MANAGEMENT_URL: &str = "https://management.azure.com";

/// Default Azure AD login endpoint.
const LOGIN_URL: &str = "https://login.microsoftonline.com";

/// Per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Tokens are refreshed this long before their reported expiry.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Default interval between long-running operation polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on a long-running operation.
const DEFAULT_LRO_TIMEOUT: Duration = Duration::from_secs(900);

/// Authenticated client for the Azure Resource Manager API.
#[derive(Debug)]
pub struct ArmClient {
    http: Client,
    credentials: AzureCredentials,
    management_url: String,
    login_url: String,
    poll_interval: Duration,
    lro_timeout: Duration,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: Option<String>,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    message: Option<String>,
}

impl ArmClient {
    /// Creates a client against the public Azure endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(credentials: AzureCredentials) -> Result<Self> {
        Self::with_endpoints(credentials, MANAGEMENT_URL, LOGIN_URL)
    }

    /// Creates a client against custom endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_endpoints(
        credentials: AzureCredentials,
        management_url: &str,
        login_url: &str,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| CloudError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            credentials,
            management_url: management_url.trim_end_matches('/').to_string(),
            login_url: login_url.trim_end_matches('/').to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            lro_timeout: DEFAULT_LRO_TIMEOUT,
            token: RwLock::new(None),
        })
    }

    /// Overrides the long-running operation poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Path prefix for subscription-scoped resources.
    #[must_use]
    pub fn subscription_path(&self, suffix: &str) -> String {
        format!(
            "/subscriptions/{}{suffix}",
            self.credentials.subscription_id
        )
    }

    /// Returns a valid bearer token, fetching or refreshing as needed.
    async fn bearer_token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                let margin = chrono::TimeDelta::seconds(TOKEN_REFRESH_MARGIN_SECS);
                if token.expires_at - margin > Utc::now() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut cached = self.token.write().await;
        let token = self.fetch_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Performs the OAuth2 client-credentials exchange.
    async fn fetch_token(&self) -> Result<CachedToken> {
        debug!("Requesting management token");
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_url, self.credentials.tenant_id
        );
        let scope = format!("{}/.default", self.management_url);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| CloudError::network(format!("Token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::AuthenticationFailed {
                message: format!("{status}: {body}"),
            }
            .into());
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CloudError::invalid_response(format!("Malformed token response: {e}")))?;

        Ok(CachedToken {
            expires_at: Utc::now() + chrono::TimeDelta::seconds(token.expires_in),
            access_token: token.access_token,
        })
    }

    /// Sends one management request.
    async fn send(
        &self,
        method: Method,
        path: &str,
        api_version: &str,
        body: Option<&Value>,
    ) -> Result<Response> {
        let token = self.bearer_token().await?;
        let url = format!("{}{path}", self.management_url);
        trace!("{method} {url}");

        let mut request = self
            .http
            .request(method, &url)
            .query(&[("api-version", api_version)])
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CloudError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::AuthenticationFailed {
                message: format!("{status}: {body}"),
            }
            .into());
        }

        Ok(response)
    }

    /// GET returning the parsed body; 404 is an error.
    pub(crate) async fn get_json(&self, path: &str, api_version: &str) -> Result<Value> {
        let response = self.send(Method::GET, path, api_version, None).await?;
        Self::expect_success(response, path).await
    }

    /// GET returning `None` on 404.
    pub(crate) async fn get_optional(&self, path: &str, api_version: &str) -> Result<Option<Value>> {
        let response = self.send(Method::GET, path, api_version, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::expect_success(response, path).await.map(Some)
    }

    /// POST returning the parsed body.
    pub(crate) async fn post_json(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> Result<Value> {
        let response = self.send(Method::POST, path, api_version, Some(body)).await?;
        Self::expect_success(response, path).await
    }

    /// PUT that creates or updates a resource, waiting for the terminal
    /// state if Azure answers asynchronously.
    pub(crate) async fn put_resource(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
        operation: &str,
    ) -> Result<Value> {
        self.put_resource_bounded(path, api_version, body, operation, self.lro_timeout)
            .await
    }

    /// [`Self::put_resource`] with a caller-chosen operation bound.
    pub(crate) async fn put_resource_bounded(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
        operation: &str,
        timeout: Duration,
    ) -> Result<Value> {
        let response = self.send(Method::PUT, path, api_version, Some(body)).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::api_error(status.as_u16(), body).into());
        }

        let poll_url = Self::operation_url(&response);
        let value = Self::parse_body(response, path).await?;

        match poll_url {
            Some(url) => {
                self.poll_operation(&url, operation, timeout).await?;
                // Re-read so the caller sees the terminal resource, not
                // the acceptance snapshot.
                self.get_json(path, api_version).await
            }
            None => {
                // Some PUTs complete synchronously but report an in-flight
                // provisioning state in the body.
                if Self::provisioning_state(&value).is_some_and(|s| s != "Succeeded") {
                    self.poll_provisioning_state(path, api_version, operation, timeout)
                        .await
                } else {
                    Ok(value)
                }
            }
        }
    }

    /// DELETE that waits for the terminal state; 404 is success.
    pub(crate) async fn delete_resource(
        &self,
        path: &str,
        api_version: &str,
        operation: &str,
    ) -> Result<()> {
        let response = self.send(Method::DELETE, path, api_version, None).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("{operation}: already absent");
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::api_error(status.as_u16(), body).into());
        }

        if let Some(url) = Self::operation_url(&response) {
            self.poll_operation(&url, operation, self.lro_timeout).await?;
        }
        Ok(())
    }

    /// Polls an operation URL until it reaches a terminal state.
    async fn poll_operation(&self, url: &str, operation: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            tokio::time::sleep(self.poll_interval).await;
            if tokio::time::Instant::now() >= deadline {
                return Err(CloudError::OperationTimeout {
                    operation: operation.to_string(),
                    timeout_secs: timeout.as_secs(),
                }
                .into());
            }

            let token = self.bearer_token().await?;
            let response = self
                .http
                .get(url)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .send()
                .await
                .map_err(|e| CloudError::network(format!("Operation poll failed: {e}")))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(CloudError::api_error(status.as_u16(), body).into());
            }

            let state: OperationStatus = response.json().await.map_err(|e| {
                CloudError::invalid_response(format!("Malformed operation status: {e}"))
            })?;

            match state.status.as_deref() {
                Some("Succeeded") => {
                    debug!("{operation}: succeeded");
                    return Ok(());
                }
                Some("Failed" | "Canceled") => {
                    let message = state
                        .error
                        .and_then(|e| e.message)
                        .unwrap_or_else(|| String::from("no detail reported"));
                    return Err(CloudError::OperationFailed {
                        operation: operation.to_string(),
                        message,
                    }
                    .into());
                }
                other => trace!("{operation}: {}", other.unwrap_or("in progress")),
            }
        }
    }

    /// Polls the resource itself until `properties.provisioningState`
    /// leaves the in-flight states.
    async fn poll_provisioning_state(
        &self,
        path: &str,
        api_version: &str,
        operation: &str,
        timeout: Duration,
    ) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            tokio::time::sleep(self.poll_interval).await;
            if tokio::time::Instant::now() >= deadline {
                return Err(CloudError::OperationTimeout {
                    operation: operation.to_string(),
                    timeout_secs: timeout.as_secs(),
                }
                .into());
            }

            let value = self.get_json(path, api_version).await?;
            match Self::provisioning_state(&value) {
                Some("Succeeded") | None => return Ok(value),
                Some("Failed" | "Canceled") => {
                    return Err(CloudError::OperationFailed {
                        operation: operation.to_string(),
                        message: String::from("resource reached a failed provisioning state"),
                    }
                    .into());
                }
                Some(state) => trace!("{operation}: {state}"),
            }
        }
    }

    fn provisioning_state(value: &Value) -> Option<&str> {
        value
            .get("properties")
            .and_then(|p| p.get("provisioningState"))
            .and_then(Value::as_str)
    }

    /// Extracts the async-operation URL Azure hands back on acceptance.
    fn operation_url(response: &Response) -> Option<String> {
        if response.status() != StatusCode::ACCEPTED
            && response.status() != StatusCode::CREATED
        {
            return None;
        }
        for name in ["azure-asyncoperation", "location"] {
            if let Some(url) = response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
            {
                return Some(url.to_string());
            }
        }
        if response.status() == StatusCode::ACCEPTED {
            warn!("Accepted response without an operation URL");
        }
        None
    }

    async fn expect_success(response: Response, path: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::api_error(status.as_u16(), body).into());
        }
        Self::parse_body(response, path).await
    }

    async fn parse_body(response: Response, path: &str) -> Result<Value> {
        let text = response
            .text()
            .await
            .map_err(|e| CloudError::network(format!("Failed to read response body: {e}")))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| CloudError::invalid_response(format!("Malformed body from {path}: {e}")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MailforgeError;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> AzureCredentials {
        AzureCredentials {
            tenant_id: String::from("tenant"),
            client_id: String::from("client"),
            client_secret: String::from("secret"),
            subscription_id: String::from("sub-1"),
        }
    }

    async fn client(server: &MockServer) -> ArmClient {
        ArmClient::with_endpoints(credentials(), &server.uri(), &server.uri())
            .unwrap()
            .with_poll_interval(Duration::from_millis(1))
    }

    async fn stub_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "expires_in": 3600,
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_token_is_fetched_once_and_reused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server).await;
        client.get_json("/thing", "2021-01-01").await.unwrap();
        client.get_json("/thing", "2021-01-01").await.unwrap();
    }

    #[tokio::test]
    async fn test_get_optional_maps_404_to_none() {
        let server = MockServer::start().await;
        stub_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let value = client.get_optional("/missing", "2021-01-01").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_put_polls_async_operation_to_success() {
        let server = MockServer::start().await;
        stub_token(&server).await;

        let op_url = format!("{}/operations/1", server.uri());
        Mock::given(method("PUT"))
            .and(path("/res"))
            .and(query_param("api-version", "2021-01-01"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("azure-asyncoperation", op_url.as_str())
                    .set_body_json(json!({"properties": {"provisioningState": "Creating"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/res"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "res-id",
                "properties": {"provisioningState": "Succeeded"},
            })))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let value = client
            .put_resource("/res", "2021-01-01", &json!({}), "create res")
            .await
            .unwrap();
        assert_eq!(value["id"], "res-id");
    }

    #[tokio::test]
    async fn test_failed_operation_surfaces_provider_message() {
        let server = MockServer::start().await;
        stub_token(&server).await;

        let op_url = format!("{}/operations/2", server.uri());
        Mock::given(method("PUT"))
            .and(path("/res"))
            .respond_with(
                ResponseTemplate::new(202).insert_header("azure-asyncoperation", op_url.as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Failed",
                "error": {"message": "quota exceeded"},
            })))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let err = client
            .put_resource("/res", "2021-01-01", &json!({}), "create res")
            .await
            .unwrap_err();
        match err {
            MailforgeError::Cloud(CloudError::OperationFailed { message, .. }) => {
                assert!(message.contains("quota exceeded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_bounded_operation_times_out() {
        let server = MockServer::start().await;
        stub_token(&server).await;

        let op_url = format!("{}/operations/3", server.uri());
        Mock::given(method("PUT"))
            .and(path("/res"))
            .respond_with(
                ResponseTemplate::new(202).insert_header("azure-asyncoperation", op_url.as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let err = client
            .put_resource_bounded(
                "/res",
                "2021-01-01",
                &json!({}),
                "slow op",
                Duration::from_millis(10),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MailforgeError::Cloud(CloudError::OperationTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_treats_404_as_success() {
        let server = MockServer::start().await;
        stub_token(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server).await;
        client
            .delete_resource("/gone", "2021-01-01", "delete gone")
            .await
            .unwrap();
    }
}
