//! Azure service-principal credentials.
//!
//! Credentials are sourced from the environment only; they are collected
//! once at startup and passed explicitly into every component that needs
//! them. Nothing in the crate reads credential environment variables after
//! this point.

use crate::error::{ConfigError, Result};

/// Environment variable holding the AAD tenant id.
pub const ENV_TENANT_ID: &str = "AZURE_APP_TENANT_ID";
/// Environment variable holding the service principal client id.
pub const ENV_CLIENT_ID: &str = "AZURE_APP_CLIENT_ID";
/// Environment variable holding the service principal client secret.
pub const ENV_CLIENT_SECRET: &str = "AZURE_APP_CLIENT_SECRET";
/// Environment variable holding the target subscription id.
pub const ENV_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";

/// Service-principal credentials and subscription context.
#[derive(Debug, Clone)]
pub struct AzureCredentials {
    /// AAD tenant id.
    pub tenant_id: String,
    /// Application (client) id.
    pub client_id: String,
    /// Application client secret.
    pub client_secret: String,
    /// Subscription all resources are created under.
    pub subscription_id: String,
}

impl AzureCredentials {
    /// Loads credentials from the environment.
    ///
    /// A `.env` file in the working directory is honored if present
    /// (loaded by the caller via [`super::load_dotenv`]).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] naming the first missing
    /// variable. No cloud resource has been touched at this point.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            tenant_id: require_env(ENV_TENANT_ID)?,
            client_id: require_env(ENV_CLIENT_ID)?,
            client_secret: require_env(ENV_CLIENT_SECRET)?,
            subscription_id: require_env(ENV_SUBSCRIPTION_ID)?,
        })
    }
}

/// Reads a required environment variable.
fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            ConfigError::MissingEnvVar {
                name: name.to_string(),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_env_reports_missing_variable() {
        let err = require_env("MAILFORGE_TEST_UNSET_VARIABLE").unwrap_err();
        assert!(err.to_string().contains("MAILFORGE_TEST_UNSET_VARIABLE"));
    }
}
