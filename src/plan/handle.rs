//! Resource handles: one externally created resource each.
//!
//! A handle records what was created, under which name, the identifier the
//! provider assigned, and where the resource is in its lifecycle. Handles
//! are the unit the rollback engine works on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Resource group containing everything else.
    ResourceGroup,
    /// Storage account staging the bootstrap artifact.
    StorageAccount,
    /// The uploaded bootstrap blob.
    BlobArtifact,
    /// Virtual network plus its subnet.
    VirtualNetwork,
    /// Public IP address.
    PublicIp,
    /// Network security group.
    SecurityGroup,
    /// Network interface.
    NetworkInterface,
    /// The mail server VM.
    VirtualMachine,
    /// The managed DNS zone.
    DnsZone,
    /// A single DNS record set.
    DnsRecord,
    /// The VM custom script extension.
    Extension,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResourceGroup => "resource group",
            Self::StorageAccount => "storage account",
            Self::BlobArtifact => "blob artifact",
            Self::VirtualNetwork => "virtual network",
            Self::PublicIp => "public IP",
            Self::SecurityGroup => "security group",
            Self::NetworkInterface => "network interface",
            Self::VirtualMachine => "virtual machine",
            Self::DnsZone => "DNS zone",
            Self::DnsRecord => "DNS record",
            Self::Extension => "extension",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Creation requested, not yet confirmed.
    Pending,
    /// The provider confirmed terminal creation success.
    Created,
    /// Rollback has issued the delete.
    DeletionRequested,
    /// The delete succeeded (or the resource was already gone).
    Deleted,
    /// The delete failed; the resource may still exist.
    DeletionFailed,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Created => "created",
            Self::DeletionRequested => "deletion requested",
            Self::Deleted => "deleted",
            Self::DeletionFailed => "deletion failed",
        };
        f.write_str(name)
    }
}

/// DNS record types this tool manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address record.
    A,
    /// Canonical name record.
    Cname,
    /// Text record.
    Txt,
    /// Mail exchanger record.
    Mx,
}

impl RecordType {
    /// The record type as the DNS API spells it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Cname => "CNAME",
            Self::Txt => "TXT",
            Self::Mx => "MX",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a DNS record set within its zone.
///
/// Several record kinds can share one relative name (`@` typically holds
/// both TXT and MX entries), so deletion must always target the pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordKey {
    /// Name relative to the zone apex (`@` for the apex itself).
    pub relative_name: String,
    /// The record type.
    pub record_type: RecordType,
}

impl RecordKey {
    /// Creates a record key.
    #[must_use]
    pub fn new(relative_name: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            relative_name: relative_name.into(),
            record_type,
        }
    }
}

/// A record of one externally created resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// What kind of resource this is.
    pub kind: ResourceKind,
    /// The name it was created under.
    pub name: String,
    /// Provider-assigned identifier; empty until creation succeeds.
    pub external_id: String,
    /// Lifecycle state.
    pub state: ResourceState,
    /// For `DnsRecord` handles: the `(relative_name, record_type)` pair.
    pub record: Option<RecordKey>,
}

impl ResourceHandle {
    /// Creates a handle in the `Created` state.
    ///
    /// Handles only enter the plan once the collaborator has confirmed
    /// terminal success, so `Created` is the entry state.
    #[must_use]
    pub fn created(
        kind: ResourceKind,
        name: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            external_id: external_id.into(),
            state: ResourceState::Created,
            record: None,
        }
    }

    /// Creates a handle for a DNS record set.
    #[must_use]
    pub fn dns_record(zone: impl Into<String>, key: RecordKey) -> Self {
        let zone = zone.into();
        Self {
            kind: ResourceKind::DnsRecord,
            name: format!("{}/{} {}", zone, key.relative_name, key.record_type),
            external_id: zone,
            state: ResourceState::Created,
            record: Some(key),
        }
    }

    /// Returns true if rollback still has to act on this handle.
    #[must_use]
    pub const fn needs_deletion(&self) -> bool {
        matches!(self.state, ResourceState::Created)
    }
}
