//! Capability interfaces for the cloud collaborators.
//!
//! The orchestrator only ever talks to these traits; the concrete Azure
//! implementations live in [`crate::azure`] and the fixed public resolver
//! in [`crate::resolver`]. Every method awaits the provider's terminal
//! state ("long-running operation" completion), never just request
//! acceptance. None of the implementations retry; transient failures are
//! reported and the orchestrator decides what happens next.

pub mod types;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::plan::RecordType;

pub use types::{
    BlobAccess, DnsZone, ExtensionSpec, ImageReference, NicDescriptor, NicSpec,
    PublicIpDescriptor, RecordData, RuleDirection, SecurityGroup, SecurityGroupSpec, SecurityRule,
    StorageKeys, VmDescriptor, VmSpec, VnetDescriptor, VnetSpec,
};

/// Resource group lifecycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceGroupProvider: Send + Sync {
    /// Returns true if the group already exists.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Creates or updates the group in the given region.
    async fn ensure(&self, name: &str, location: &str) -> Result<()>;

    /// Deletes the group and everything in it.
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Compute plane: the VM, its disk, and the script extension.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Creates the VM and waits for terminal success.
    async fn create_vm(&self, resource_group: &str, spec: &VmSpec) -> Result<VmDescriptor>;

    /// Deletes the VM.
    async fn delete_vm(&self, resource_group: &str, name: &str) -> Result<()>;

    /// Deletes a managed disk.
    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()>;

    /// Runs the custom script extension on the VM, bounded by the supplied
    /// timeout. Exceeding the bound is a failure, not success-with-unknown
    /// state.
    async fn run_extension(
        &self,
        resource_group: &str,
        vm_name: &str,
        spec: &ExtensionSpec,
    ) -> Result<()>;
}

/// Network plane: VNet, public IP, security group, NIC.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// Creates the VNet and its subnet.
    async fn create_vnet(&self, resource_group: &str, spec: &VnetSpec) -> Result<VnetDescriptor>;

    /// Deletes the VNet.
    async fn delete_vnet(&self, resource_group: &str, name: &str) -> Result<()>;

    /// Creates a dynamically allocated public IP.
    async fn create_public_ip(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<PublicIpDescriptor>;

    /// Fetches a public IP, including its allocated address if any.
    async fn get_public_ip(&self, resource_group: &str, name: &str) -> Result<PublicIpDescriptor>;

    /// Deletes a public IP.
    async fn delete_public_ip(&self, resource_group: &str, name: &str) -> Result<()>;

    /// Looks up a security group; `None` if it does not exist.
    async fn get_security_group(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<SecurityGroup>>;

    /// Creates or updates a security group with the full given rule set.
    async fn upsert_security_group(
        &self,
        resource_group: &str,
        spec: &SecurityGroupSpec,
    ) -> Result<SecurityGroup>;

    /// Deletes a security group.
    async fn delete_security_group(&self, resource_group: &str, name: &str) -> Result<()>;

    /// Creates the network interface.
    async fn create_nic(&self, resource_group: &str, spec: &NicSpec) -> Result<NicDescriptor>;

    /// Fetches a NIC, used to resolve the bound public IP after creation.
    async fn get_nic(&self, resource_group: &str, name: &str) -> Result<NicDescriptor>;

    /// Deletes a NIC.
    async fn delete_nic(&self, resource_group: &str, name: &str) -> Result<()>;
}

/// Storage management plane.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Returns true if the account already exists in the group.
    async fn account_exists(&self, resource_group: &str, name: &str) -> Result<bool>;

    /// Creates the storage account and waits for terminal success.
    async fn create_account(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<()>;

    /// Lists the account access keys.
    async fn list_keys(&self, resource_group: &str, name: &str) -> Result<StorageKeys>;

    /// Deletes the account.
    async fn delete_account(&self, resource_group: &str, name: &str) -> Result<()>;
}

/// Blob data plane for the staging artifact.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Creates the container if it does not exist; already-exists is
    /// success.
    async fn ensure_container(&self, access: &BlobAccess, container: &str) -> Result<()>;

    /// Uploads the object, overwriting any prior object of the same name.
    async fn upload(
        &self,
        access: &BlobAccess,
        container: &str,
        blob: &str,
        content: &str,
    ) -> Result<()>;

    /// Mints a read-only URL for the single object, valid for `ttl`.
    async fn signed_read_url(
        &self,
        access: &BlobAccess,
        container: &str,
        blob: &str,
        ttl: Duration,
    ) -> Result<String>;

    /// Deletes the object.
    async fn delete_blob(&self, access: &BlobAccess, container: &str, blob: &str) -> Result<()>;

    /// Deletes the container.
    async fn delete_container(&self, access: &BlobAccess, container: &str) -> Result<()>;
}

/// Managed DNS zone and record sets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Looks up a zone; `None` if it does not exist.
    async fn get_zone(&self, resource_group: &str, domain: &str) -> Result<Option<DnsZone>>;

    /// Creates the zone and returns its assigned nameservers.
    async fn create_zone(&self, resource_group: &str, domain: &str) -> Result<DnsZone>;

    /// Creates or replaces a record set keyed by `(zone, relative, type)`.
    async fn upsert_record_set(
        &self,
        resource_group: &str,
        zone: &str,
        relative_name: &str,
        ttl: u32,
        data: &RecordData,
    ) -> Result<()>;

    /// Deletes the record set with exactly this name and type; other
    /// record types under the same name are untouched.
    async fn delete_record_set(
        &self,
        resource_group: &str,
        zone: &str,
        relative_name: &str,
        record_type: RecordType,
    ) -> Result<()>;
}

/// Non-authoritative NS lookups against a fixed public resolver.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PublicResolver: Send + Sync {
    /// Resolves the NS record set for the domain as the public internet
    /// currently sees it.
    async fn resolve_ns(&self, domain: &str) -> Result<Vec<String>>;
}

/// The full set of collaborators a provisioning run talks to.
#[derive(Clone)]
pub struct Providers {
    /// Resource group lifecycle.
    pub groups: Arc<dyn ResourceGroupProvider>,
    /// Compute plane.
    pub compute: Arc<dyn ComputeProvider>,
    /// Network plane.
    pub network: Arc<dyn NetworkProvider>,
    /// Storage management plane.
    pub storage: Arc<dyn StorageProvider>,
    /// Blob data plane.
    pub blobs: Arc<dyn BlobStore>,
    /// Managed DNS.
    pub dns: Arc<dyn DnsProvider>,
    /// Public resolver for delegation checks.
    pub resolver: Arc<dyn PublicResolver>,
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}
