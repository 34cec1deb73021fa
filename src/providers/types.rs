//! Request and descriptor types exchanged with the cloud collaborators.
//!
//! Requests carry exactly what a creation call needs; descriptors carry the
//! provider-assigned identity (and whatever else later steps depend on)
//! after the call reached its terminal state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::plan::RecordType;

/// Marketplace image the VM boots from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageReference {
    /// Image publisher.
    pub publisher: String,
    /// Image offer.
    pub offer: String,
    /// Image SKU.
    pub sku: String,
    /// Image version.
    pub version: String,
}

impl ImageReference {
    /// Ubuntu 24.04 LTS, the image the bootstrap script targets.
    #[must_use]
    pub fn ubuntu_24_04() -> Self {
        Self {
            publisher: String::from("canonical"),
            offer: String::from("ubuntu-24_04-lts"),
            sku: String::from("server"),
            version: String::from("latest"),
        }
    }
}

/// Specification for creating the mail server VM.
#[derive(Debug, Clone)]
pub struct VmSpec {
    /// VM name.
    pub name: String,
    /// Region.
    pub location: String,
    /// VM size (e.g. `Standard_B2s`).
    pub size: String,
    /// Name for the managed OS disk.
    pub os_disk_name: String,
    /// OS disk size in GB.
    pub os_disk_gb: u32,
    /// Admin username.
    pub admin_username: String,
    /// Admin password (password auth stays enabled for the bootstrap).
    pub admin_password: String,
    /// Id of the network interface to attach.
    pub nic_id: String,
    /// Boot image.
    pub image: ImageReference,
}

/// Terminal descriptor of a created VM.
#[derive(Debug, Clone)]
pub struct VmDescriptor {
    /// Provider-assigned id.
    pub id: String,
    /// VM name.
    pub name: String,
    /// Name of the OS disk that was created with it.
    pub os_disk_name: String,
}

/// Custom script extension request.
#[derive(Debug, Clone)]
pub struct ExtensionSpec {
    /// Region.
    pub location: String,
    /// URL the VM fetches the script from (time-limited signed URL).
    pub artifact_url: String,
    /// Command executed once the artifact is downloaded.
    pub command: String,
    /// Bound on the end-to-end extension run; exceeding it is failure.
    pub timeout: Duration,
}

/// Specification for the virtual network and its single subnet.
#[derive(Debug, Clone)]
pub struct VnetSpec {
    /// VNet name.
    pub name: String,
    /// Region.
    pub location: String,
    /// VNet address space.
    pub address_prefix: String,
    /// Subnet name.
    pub subnet_name: String,
    /// Subnet address prefix.
    pub subnet_prefix: String,
}

impl VnetSpec {
    /// The address plan every run uses.
    #[must_use]
    pub fn with_default_addressing(
        name: impl Into<String>,
        location: impl Into<String>,
        subnet_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            address_prefix: String::from("10.1.0.0/16"),
            subnet_name: subnet_name.into(),
            subnet_prefix: String::from("10.1.0.0/24"),
        }
    }
}

/// Terminal descriptor of a created VNet.
#[derive(Debug, Clone)]
pub struct VnetDescriptor {
    /// Provider-assigned VNet id.
    pub id: String,
    /// Provider-assigned id of the subnet.
    pub subnet_id: String,
}

/// Terminal descriptor of a public IP address.
#[derive(Debug, Clone)]
pub struct PublicIpDescriptor {
    /// Provider-assigned id.
    pub id: String,
    /// The allocated address; `None` until the IP is attached (dynamic
    /// allocation only assigns an address once a NIC binds it).
    pub ip_address: Option<String>,
}

/// Direction of a security rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleDirection {
    /// Traffic into the VM.
    Inbound,
    /// Traffic out of the VM.
    Outbound,
}

impl RuleDirection {
    /// The direction as the network API spells it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "Inbound",
            Self::Outbound => "Outbound",
        }
    }
}

/// One allow-rule on the security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    /// Rule name; deterministic per port and direction.
    pub name: String,
    /// Direction.
    pub direction: RuleDirection,
    /// Priority; unique within the group.
    pub priority: u32,
    /// Destination port the rule allows.
    pub destination_port: u16,
}

/// A security group and its current rule set.
#[derive(Debug, Clone)]
pub struct SecurityGroup {
    /// Provider-assigned id.
    pub id: String,
    /// Group name.
    pub name: String,
    /// Rules currently on the group.
    pub rules: Vec<SecurityRule>,
}

/// Specification for creating or updating a security group.
#[derive(Debug, Clone)]
pub struct SecurityGroupSpec {
    /// Group name.
    pub name: String,
    /// Region.
    pub location: String,
    /// Full rule set the group should hold.
    pub rules: Vec<SecurityRule>,
}

/// Specification for creating the network interface.
#[derive(Debug, Clone)]
pub struct NicSpec {
    /// NIC name.
    pub name: String,
    /// Region.
    pub location: String,
    /// Name of the single IP configuration.
    pub ip_config_name: String,
    /// Subnet the NIC joins.
    pub subnet_id: String,
    /// Public IP bound to the NIC.
    pub public_ip_id: String,
    /// Security group protecting the NIC.
    pub nsg_id: String,
}

/// Terminal descriptor of a network interface.
#[derive(Debug, Clone)]
pub struct NicDescriptor {
    /// Provider-assigned id.
    pub id: String,
    /// Name of the public IP bound to the primary IP configuration.
    pub public_ip_name: Option<String>,
}

/// Access keys of a storage account.
#[derive(Debug, Clone)]
pub struct StorageKeys {
    /// The primary key, used for blob operations and SAS signing.
    pub primary: String,
}

/// Addressing context for blob operations on one storage account.
#[derive(Debug, Clone)]
pub struct BlobAccess {
    /// Storage account name.
    pub account: String,
    /// Account key used for request signing.
    pub key: String,
}

/// A managed DNS zone and its assigned nameservers.
#[derive(Debug, Clone)]
pub struct DnsZone {
    /// Zone name (the apex domain).
    pub name: String,
    /// Authoritative nameservers assigned by the provider.
    pub name_servers: Vec<String>,
}

/// Payload of a DNS record set, one variant per supported type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    /// IPv4 address record.
    A {
        /// The address.
        address: String,
    },
    /// Canonical name record.
    Cname {
        /// The target host name.
        target: String,
    },
    /// Text record; one or more values.
    Txt {
        /// The values.
        values: Vec<String>,
    },
    /// Mail exchanger record.
    Mx {
        /// Preference; lower wins.
        preference: u16,
        /// The exchange host name.
        exchange: String,
    },
}

impl RecordData {
    /// The record type this payload belongs to.
    #[must_use]
    pub const fn record_type(&self) -> RecordType {
        match self {
            Self::A { .. } => RecordType::A,
            Self::Cname { .. } => RecordType::Cname,
            Self::Txt { .. } => RecordType::Txt,
            Self::Mx { .. } => RecordType::Mx,
        }
    }
}
