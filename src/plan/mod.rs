//! The provisioning plan: the ordered record of one run.
//!
//! The plan grows monotonically during the forward pass and is consumed in
//! reverse by the rollback engine. It is owned exclusively by the
//! orchestrating flow; nothing else mutates it.

pub mod handle;

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub use handle::{RecordKey, RecordType, ResourceHandle, ResourceKind, ResourceState};

/// Ordered collection of resource handles for one provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningPlan {
    /// Unique identifier for this run.
    pub run_id: String,
    /// Region every regional resource is created in.
    pub region: String,
    /// Time-derived suffix shared by every name that must be unique per run.
    pub suffix: u64,
    /// Handles in the exact order they were successfully created.
    handles: Vec<ResourceHandle>,
}

impl ProvisioningPlan {
    /// Creates an empty plan.
    ///
    /// The run id is the naming base plus a time-derived suffix, so
    /// back-to-back runs do not collide on globally unique names.
    #[must_use]
    pub fn new(naming_base: &str, region: impl Into<String>) -> Self {
        let suffix = Self::time_suffix();
        Self {
            run_id: format!("{naming_base}-{suffix}"),
            region: region.into(),
            suffix,
            handles: Vec::new(),
        }
    }

    /// Numeric suffix derived from the current time.
    #[must_use]
    pub fn time_suffix() -> u64 {
        u64::try_from(Utc::now().timestamp()).unwrap_or_default() % 10_000
    }

    /// Records a successfully created resource.
    ///
    /// Handles must be pushed in creation order; rollback depends on it.
    pub fn record_created(&mut self, handle: ResourceHandle) {
        self.handles.push(handle);
    }

    /// Number of handles in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if nothing was created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Handles in creation order.
    #[must_use]
    pub fn handles(&self) -> &[ResourceHandle] {
        &self.handles
    }

    /// Mutable access in reverse creation order, for rollback.
    pub fn handles_reversed_mut(&mut self) -> impl Iterator<Item = &mut ResourceHandle> {
        self.handles.iter_mut().rev()
    }

    /// Finds the first `Created` handle of the given kind.
    #[must_use]
    pub fn find_created(&self, kind: ResourceKind) -> Option<&ResourceHandle> {
        self.handles
            .iter()
            .find(|h| h.kind == kind && h.state == ResourceState::Created)
    }

    /// The external id of the first `Created` handle of the given kind.
    #[must_use]
    pub fn external_id(&self, kind: ResourceKind) -> Option<&str> {
        self.find_created(kind).map(|h| h.external_id.as_str())
    }

    /// Finds a `Created` DNS record handle by its key.
    #[must_use]
    pub fn find_record(&self, key: &RecordKey) -> Option<&ResourceHandle> {
        self.handles
            .iter()
            .find(|h| h.record.as_ref() == Some(key) && h.state == ResourceState::Created)
    }

    /// Counts handles currently in the given state.
    #[must_use]
    pub fn count_in_state(&self, state: ResourceState) -> usize {
        self.handles.iter().filter(|h| h.state == state).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_keep_creation_order() {
        let mut plan = ProvisioningPlan::new("smtp", "uksouth");
        plan.record_created(ResourceHandle::created(
            ResourceKind::ResourceGroup,
            "smtpgroup",
            "rg-id",
        ));
        plan.record_created(ResourceHandle::created(
            ResourceKind::VirtualNetwork,
            "smtp-vnet",
            "vnet-id",
        ));
        plan.record_created(ResourceHandle::created(
            ResourceKind::PublicIp,
            "smtp-public-ip",
            "ip-id",
        ));

        let kinds: Vec<ResourceKind> = plan.handles().iter().map(|h| h.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::ResourceGroup,
                ResourceKind::VirtualNetwork,
                ResourceKind::PublicIp,
            ]
        );

        let reversed: Vec<ResourceKind> =
            plan.handles_reversed_mut().map(|h| h.kind).collect();
        assert_eq!(
            reversed,
            vec![
                ResourceKind::PublicIp,
                ResourceKind::VirtualNetwork,
                ResourceKind::ResourceGroup,
            ]
        );
    }

    #[test]
    fn test_external_id_reads_created_handle() {
        let mut plan = ProvisioningPlan::new("smtp", "uksouth");
        plan.record_created(ResourceHandle::created(
            ResourceKind::VirtualMachine,
            "smtp",
            "vm-id",
        ));

        assert_eq!(plan.external_id(ResourceKind::VirtualMachine), Some("vm-id"));
        assert_eq!(plan.external_id(ResourceKind::PublicIp), None);
    }

    #[test]
    fn test_run_id_uses_naming_base() {
        let plan = ProvisioningPlan::new("smtp", "uksouth");
        assert!(plan.run_id.starts_with("smtp-"));
    }

    #[test]
    fn test_find_record_matches_name_and_type() {
        let mut plan = ProvisioningPlan::new("smtp", "uksouth");
        plan.record_created(ResourceHandle::dns_record(
            "example.com",
            RecordKey::new("@", RecordType::Txt),
        ));
        plan.record_created(ResourceHandle::dns_record(
            "example.com",
            RecordKey::new("@", RecordType::Mx),
        ));

        let txt = plan.find_record(&RecordKey::new("@", RecordType::Txt));
        assert!(txt.is_some());
        assert_eq!(txt.unwrap().record.as_ref().unwrap().record_type, RecordType::Txt);
    }
}
