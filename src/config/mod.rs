//! Configuration and credentials for a provisioning run.
//!
//! This module provides:
//!
//! - [`ProvisionSettings`]: the run parameters (domain, VM shape, admin
//!   credentials) with resource-name derivation helpers
//! - [`SettingsValidator`]: up-front validation of those parameters
//! - [`AzureCredentials`]: service-principal credentials from the
//!   environment
//! - [`ports`]: the static port tables for the mail server security group

pub mod credentials;
pub mod ports;
pub mod settings;
pub mod validator;

pub use credentials::AzureCredentials;
pub use settings::{ProvisionSettings, BOOTSTRAP_CONTAINER, DNS_RECORD_TTL};
pub use validator::{SettingsValidator, ValidationResult};

/// Loads a `.env` file from the working directory if one exists.
///
/// Missing files are fine; a present but unreadable file surfaces as a
/// warning via the return value rather than failing startup.
pub fn load_dotenv() -> Option<std::path::PathBuf> {
    dotenvy::dotenv().ok()
}
