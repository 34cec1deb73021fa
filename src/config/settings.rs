//! Provisioning settings.
//!
//! One [`ProvisionSettings`] value describes everything a single run needs:
//! the target domain, the VM shape, and the admin credentials baked into the
//! bootstrap script. The struct is built from CLI flags (see [`crate::cli`])
//! and validated (see [`super::SettingsValidator`]) before any cloud call is
//! made.

use serde::{Deserialize, Serialize};

/// Default TTL for every DNS record created by a run.
pub const DNS_RECORD_TTL: u32 = 3600;

/// Container holding the staged bootstrap script.
pub const BOOTSTRAP_CONTAINER: &str = "vm-startup-scripts";

/// Storage account names are limited to 24 lower-case alphanumerics.
pub const STORAGE_NAME_MAX: usize = 24;

/// Settings for one provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionSettings {
    /// Apex domain the DNS zone manages (e.g. `example.com`).
    pub domain: String,

    /// Service subdomain (e.g. `smtp`); the mail host is `<subdomain>.<domain>`.
    pub subdomain: String,

    /// Resource group all resources are created in.
    pub resource_group: String,

    /// VM name; also the naming base for network resources and storage.
    pub vm_name: String,

    /// Azure region (e.g. `uksouth`).
    pub location: String,

    /// VM size (e.g. `Standard_B2s`).
    pub vm_size: String,

    /// OS disk size in GB.
    pub os_disk_gb: u32,

    /// VM admin username.
    pub vm_username: String,

    /// VM admin password.
    pub vm_password: String,

    /// Mailcow admin email.
    pub admin_email: String,

    /// Mailcow admin password.
    pub admin_password: String,
}

impl ProvisionSettings {
    /// The fully qualified mail host name, `<subdomain>.<domain>`.
    #[must_use]
    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.subdomain, self.domain)
    }

    /// Derives the storage account name from the naming base plus a
    /// numeric suffix, keeping it inside the 24-character limit.
    #[must_use]
    pub fn storage_account_name(&self, suffix: u64) -> String {
        let suffix = suffix % 10_000;
        let base: String = self.vm_name.chars().take(STORAGE_NAME_MAX - 4).collect();
        format!("{base}{suffix}")
    }

    /// Name of the virtual network.
    #[must_use]
    pub fn vnet_name(&self) -> String {
        format!("{}-vnet", self.vm_name)
    }

    /// Name of the subnet inside the virtual network.
    #[must_use]
    pub fn subnet_name(&self) -> String {
        format!("{}-subnet", self.vm_name)
    }

    /// Name of the public IP address.
    #[must_use]
    pub fn public_ip_name(&self) -> String {
        format!("{}-public-ip", self.vm_name)
    }

    /// Name of the network security group.
    #[must_use]
    pub fn nsg_name(&self) -> String {
        format!("{}-nsg", self.vm_name)
    }

    /// Name of the network interface.
    #[must_use]
    pub fn nic_name(&self) -> String {
        format!("{}-nic", self.vm_name)
    }

    /// Name of the IP configuration on the network interface.
    #[must_use]
    pub fn ip_config_name(&self) -> String {
        format!("{}-ip-config", self.vm_name)
    }

    /// Name of the VM OS disk.
    #[must_use]
    pub fn os_disk_name(&self) -> String {
        format!("{}-os-disk", self.vm_name)
    }

    /// Name of the staged bootstrap blob.
    #[must_use]
    pub fn bootstrap_blob_name(&self) -> String {
        format!("{}-setup.sh", self.vm_name)
    }
}
