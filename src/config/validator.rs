//! Validation of provisioning settings.
//!
//! All values are checked up front so that a bad input can never abort a
//! run after resources have been created.

use tracing::debug;

use crate::error::{ConfigError, MailforgeError, Result};

use super::settings::{ProvisionSettings, STORAGE_NAME_MAX};

/// Validator for provisioning settings.
#[derive(Debug, Default)]
pub struct SettingsValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ConfigError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ConfigError::validation(message, field));
    }
}

impl SettingsValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates provisioning settings.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a [`ConfigError`]; the full
    /// list is available in the returned result when validation passes
    /// with warnings only.
    pub fn validate(&self, settings: &ProvisionSettings) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_domain(settings, &mut result);
        Self::validate_names(settings, &mut result);
        Self::validate_credentials(settings, &mut result);

        if result.is_valid() {
            debug!("Settings validation passed");
            Ok(result)
        } else {
            Err(MailforgeError::Config(result.errors.remove(0)))
        }
    }

    /// Validates the domain and subdomain.
    fn validate_domain(settings: &ProvisionSettings, result: &mut ValidationResult) {
        if !is_valid_domain(&settings.domain) {
            result.error(
                "domain",
                format!(
                    "Domain '{}' is invalid. Must be a dotted name with an alphabetic TLD.",
                    settings.domain
                ),
            );
        }

        let sub = &settings.subdomain;
        if sub.is_empty() {
            result.error("subdomain", "Subdomain cannot be empty");
        } else if !is_valid_label(sub) {
            result.error(
                "subdomain",
                format!("Subdomain '{sub}' is invalid. Must be a single DNS label."),
            );
        }

        if settings.fqdn().len() > 253 {
            result.errors.push(ConfigError::validation_general(format!(
                "Combined host name '{}' exceeds the 253 character DNS limit",
                settings.fqdn()
            )));
        }
    }

    /// Validates resource names derived from the VM name.
    fn validate_names(settings: &ProvisionSettings, result: &mut ValidationResult) {
        if settings.resource_group.is_empty() {
            result.error("resource_group", "Resource group cannot be empty");
        }

        let vm = &settings.vm_name;
        if vm.len() < 3 || vm.len() > STORAGE_NAME_MAX - 4 {
            result.errors.push(ConfigError::InvalidName {
                resource_type: String::from("virtual machine"),
                name: vm.clone(),
                reason: format!(
                    "must be 3-{} characters so the derived storage account name fits",
                    STORAGE_NAME_MAX - 4
                ),
            });
        } else if !vm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            result.errors.push(ConfigError::InvalidName {
                resource_type: String::from("virtual machine"),
                name: vm.clone(),
                reason: String::from("must be lower-case letters and digits only"),
            });
        }

        if settings.location.is_empty() {
            result.error("location", "Region cannot be empty");
        }
        if settings.vm_size.is_empty() {
            result.error("vm_size", "VM size cannot be empty");
        }
        if settings.os_disk_gb < 30 {
            result.error("os_disk_gb", "OS disk must be at least 30 GB");
        }
        if settings.os_disk_gb > 2048 {
            result.warnings.push(format!(
                "OS disk of {} GB is unusually large for a mail server",
                settings.os_disk_gb
            ));
        }
    }

    /// Validates credential material.
    fn validate_credentials(settings: &ProvisionSettings, result: &mut ValidationResult) {
        if settings.vm_username.is_empty() {
            result.error("vm_username", "VM username cannot be empty");
        }
        if settings.vm_password.len() < 12 {
            result.error("vm_password", "VM password must be at least 12 characters");
        }
        if !settings.admin_email.contains('@') || settings.admin_email.starts_with('@') {
            result.error(
                "admin_email",
                format!("Admin email '{}' is not valid", settings.admin_email),
            );
        }
        if settings.admin_password.len() < 8 {
            result.error(
                "admin_password",
                "Admin password must be at least 8 characters",
            );
        }
    }
}

/// Checks that a string is a plausible DNS name with at least two labels.
fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || !labels.iter().all(|l| is_valid_label(l)) {
        return false;
    }
    let tld = labels[labels.len() - 1];
    tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

/// Checks that a string is a valid single DNS label.
fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !label.starts_with('-')
        && !label.ends_with('-')
}
