//! Error types for the mailforge provisioning system.
//!
//! This module provides the error hierarchy for the whole provisioning
//! lifecycle: configuration, cloud collaborator calls, and post-deployment
//! verification.

use thiserror::Error;

/// The main error type for mailforge operations.
#[derive(Debug, Error)]
pub enum MailforgeError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors from cloud collaborator calls.
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// Post-deployment verification errors.
    #[error("Verification error: {0}")]
    Verify(#[from] VerifyError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
///
/// All of these are fatal before any cloud resource is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Validation of the provisioning settings failed.
    #[error("Settings validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A derived resource name is not acceptable to the provider.
    #[error("Invalid {resource_type} name '{name}': {reason}")]
    InvalidName {
        /// Type of resource (storage account, vm, ...).
        resource_type: String,
        /// The rejected name.
        name: String,
        /// Why the name was rejected.
        reason: String,
    },
}

/// Errors from a single cloud collaborator call.
///
/// During the forward pass any of these aborts the run and triggers
/// rollback. During rollback they are logged, recorded on the handle,
/// and skipped.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Authentication against the provider failed.
    #[error("Azure authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// An API request returned a non-success status.
    #[error("Azure API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// The requested resource does not exist.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Identifier of the missing resource.
        resource: String,
    },

    /// A long-running operation did not reach a terminal state in time.
    #[error("Operation '{operation}' timed out after {timeout_secs}s")]
    OperationTimeout {
        /// Description of the operation.
        operation: String,
        /// The configured bound in seconds.
        timeout_secs: u64,
    },

    /// A long-running operation reached a failed terminal state.
    #[error("Operation '{operation}' failed: {message}")]
    OperationFailed {
        /// Description of the operation.
        operation: String,
        /// Provider-reported failure detail.
        message: String,
    },

    /// Network error talking to the provider.
    #[error("Network error communicating with Azure: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// The provider returned a response we could not interpret.
    #[error("Invalid response from Azure API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Post-deployment verification errors.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// NS delegation never matched within the attempt budget.
    #[error("NS delegation for '{domain}' not confirmed after {attempts} attempts")]
    DelegationTimeout {
        /// Domain under verification.
        domain: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The managed zone reported no nameservers at all.
    #[error("Managed DNS zone '{zone}' reported no nameservers")]
    EmptyZoneNameservers {
        /// Name of the zone.
        zone: String,
    },
}

/// Result type alias for mailforge operations.
pub type Result<T> = std::result::Result<T, MailforgeError>;

impl MailforgeError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl CloudError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Returns true if the error means the resource was already absent.
    ///
    /// Rollback treats deleting an already-gone resource as success.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::ApiRequestFailed { status: 404, .. }
        )
    }
}
