//! Rollback and cleanup: the compensating side of provisioning.
//!
//! Given the plan of one run, the engine undoes every `Created` handle in
//! strict reverse creation order. Deletions are best-effort: a failure is
//! recorded on the handle and the engine moves on, so a single stuck
//! resource never blocks cleanup of the rest. There is no two-phase
//! commit underneath; the guarantee is an attempted cleanup of everything
//! this run created, not atomicity.
//!
//! The DNS zone is deliberately never deleted: it may be shared or
//! pre-existing, and registrar delegation points at it. Only its records
//! are removed.

use std::fmt;

use tracing::{debug, info, warn};

use crate::config::ProvisionSettings;
use crate::error::{MailforgeError, Result};
use crate::plan::{ProvisioningPlan, ResourceHandle, ResourceKind, ResourceState};
use crate::providers::types::BlobAccess;
use crate::providers::Providers;

/// Best-effort teardown of the resources recorded in a plan.
#[derive(Debug)]
pub struct RollbackEngine<'a> {
    providers: &'a Providers,
    settings: &'a ProvisionSettings,
}

/// Terminal summary of a rollback or cleanup pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    /// Handles successfully deleted (or already gone).
    pub deleted: usize,
    /// Handles whose deletion failed; the resource may still exist.
    pub failed: usize,
    /// Handles deliberately left in place (the DNS zone).
    pub retained: usize,
}

impl CleanupReport {
    /// Returns true if nothing was left behind unintentionally.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} deleted, {} failed, {} retained",
            self.deleted, self.failed, self.retained
        )
    }
}

impl<'a> RollbackEngine<'a> {
    /// Creates a rollback engine over the same collaborators used for
    /// creation.
    #[must_use]
    pub const fn new(providers: &'a Providers, settings: &'a ProvisionSettings) -> Self {
        Self {
            providers,
            settings,
        }
    }

    /// Undoes every `Created` handle in reverse creation order.
    ///
    /// Individual failures are recorded as `DeletionFailed` and skipped,
    /// never escalated; by the time rollback runs the overall outcome of
    /// the run is already failure.
    pub async fn rollback(&self, plan: &mut ProvisioningPlan) -> CleanupReport {
        warn!("Starting rollback of {} recorded resources", plan.len());
        let report = self.unwind(plan, |_| true).await;
        if report.is_clean() {
            info!("Rollback completed: {report}");
        } else {
            warn!("Rollback left resources behind: {report}");
        }
        report
    }

    /// Success-path cleanup: removes only the transient staging pieces
    /// (bootstrap blob, its container, the storage account), leaving the
    /// durable resources intact.
    pub async fn cleanup_staging(&self, plan: &mut ProvisioningPlan) -> CleanupReport {
        info!("Cleaning up staging artifacts");
        let report = self
            .unwind(plan, |kind| {
                matches!(
                    kind,
                    ResourceKind::BlobArtifact | ResourceKind::StorageAccount
                )
            })
            .await;
        if report.is_clean() {
            info!("Staging cleanup completed: {report}");
        } else {
            warn!("Staging cleanup incomplete: {report}");
        }
        report
    }

    /// Walks the plan in reverse, deleting handles selected by `select`.
    async fn unwind(
        &self,
        plan: &mut ProvisioningPlan,
        select: impl Fn(ResourceKind) -> bool,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();

        // Reverse creation order is the dependency teardown order: the
        // NIC goes before the VNet it joins, the VM before its network.
        let mut targets: Vec<ResourceHandle> = Vec::new();
        for handle in plan.handles_reversed_mut() {
            if handle.needs_deletion() && select(handle.kind) {
                handle.state = ResourceState::DeletionRequested;
                targets.push(handle.clone());
            }
        }

        for target in &targets {
            let outcome = self.delete_handle(target).await;
            let new_state = match outcome {
                Ok(DeleteOutcome::Deleted) => {
                    info!("Deleted {} '{}'", target.kind, target.name);
                    report.deleted += 1;
                    ResourceState::Deleted
                }
                Ok(DeleteOutcome::Retained) => {
                    info!("Retained {} '{}'", target.kind, target.name);
                    report.retained += 1;
                    ResourceState::Created
                }
                Err(e) if is_not_found(&e) => {
                    debug!("{} '{}' was already gone", target.kind, target.name);
                    report.deleted += 1;
                    ResourceState::Deleted
                }
                Err(e) => {
                    warn!("Could not delete {} '{}': {e}", target.kind, target.name);
                    report.failed += 1;
                    ResourceState::DeletionFailed
                }
            };

            if let Some(handle) = plan
                .handles_reversed_mut()
                .find(|h| h.kind == target.kind && h.name == target.name)
            {
                handle.state = new_state;
            }
        }

        report
    }

    /// Issues the compensating delete for one handle.
    async fn delete_handle(&self, handle: &ResourceHandle) -> Result<DeleteOutcome> {
        let rg = &self.settings.resource_group;

        match handle.kind {
            ResourceKind::Extension => {
                // The extension lives on the VM and disappears with it.
                Ok(DeleteOutcome::Deleted)
            }
            ResourceKind::DnsRecord => {
                let key = handle.record.as_ref().ok_or_else(|| {
                    MailforgeError::internal("DNS record handle without record key")
                })?;
                self.providers
                    .dns
                    .delete_record_set(rg, &handle.external_id, &key.relative_name, key.record_type)
                    .await?;
                Ok(DeleteOutcome::Deleted)
            }
            // The zone may be shared or pre-existing and registrar
            // delegation points at it; only its records are cleaned.
            ResourceKind::DnsZone => Ok(DeleteOutcome::Retained),
            ResourceKind::VirtualMachine => {
                self.providers.compute.delete_vm(rg, &handle.name).await?;
                let disk = self.settings.os_disk_name();
                if let Err(e) = self.providers.compute.delete_disk(rg, &disk).await {
                    if !is_not_found(&e) {
                        warn!("Could not delete OS disk '{disk}': {e}");
                    }
                }
                Ok(DeleteOutcome::Deleted)
            }
            ResourceKind::NetworkInterface => {
                self.providers.network.delete_nic(rg, &handle.name).await?;
                Ok(DeleteOutcome::Deleted)
            }
            ResourceKind::SecurityGroup => {
                self.providers
                    .network
                    .delete_security_group(rg, &handle.name)
                    .await?;
                Ok(DeleteOutcome::Deleted)
            }
            ResourceKind::PublicIp => {
                self.providers
                    .network
                    .delete_public_ip(rg, &handle.name)
                    .await?;
                Ok(DeleteOutcome::Deleted)
            }
            ResourceKind::VirtualNetwork => {
                self.providers.network.delete_vnet(rg, &handle.name).await?;
                Ok(DeleteOutcome::Deleted)
            }
            ResourceKind::BlobArtifact => {
                let (account, container, blob) = parse_blob_id(&handle.external_id)?;
                let keys = self.providers.storage.list_keys(rg, account).await?;
                let access = BlobAccess {
                    account: account.to_string(),
                    key: keys.primary,
                };
                self.providers
                    .blobs
                    .delete_blob(&access, container, blob)
                    .await?;
                self.providers
                    .blobs
                    .delete_container(&access, container)
                    .await?;
                Ok(DeleteOutcome::Deleted)
            }
            ResourceKind::StorageAccount => {
                self.providers
                    .storage
                    .delete_account(rg, &handle.name)
                    .await?;
                Ok(DeleteOutcome::Deleted)
            }
            ResourceKind::ResourceGroup => {
                self.providers.groups.delete(&handle.name).await?;
                Ok(DeleteOutcome::Deleted)
            }
        }
    }
}

/// What happened to one handle during unwind.
#[derive(Debug, Clone, Copy)]
enum DeleteOutcome {
    Deleted,
    Retained,
}

/// Returns true if the error means the resource was already absent.
fn is_not_found(error: &MailforgeError) -> bool {
    matches!(error, MailforgeError::Cloud(e) if e.is_not_found())
}

/// Splits a blob handle id back into `(account, container, blob)`.
fn parse_blob_id(id: &str) -> Result<(&str, &str, &str)> {
    let mut parts = id.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(account), Some(container), Some(blob)) => Ok((account, container, blob)),
        _ => Err(MailforgeError::internal(format!(
            "malformed blob artifact id '{id}'"
        ))),
    }
}

/// Builds the blob handle id stored on `BlobArtifact` handles.
#[must_use]
pub fn blob_id(account: &str, container: &str, blob: &str) -> String {
    format!("{account}/{container}/{blob}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use crate::plan::{RecordKey, RecordType};
    use crate::providers::types::StorageKeys;
    use crate::providers::{
        MockBlobStore, MockComputeProvider, MockDnsProvider, MockNetworkProvider,
        MockPublicResolver, MockResourceGroupProvider, MockStorageProvider,
    };
    use mockall::predicate::eq;
    use std::sync::{Arc, Mutex};

    fn settings() -> ProvisionSettings {
        ProvisionSettings {
            domain: String::from("example.com"),
            subdomain: String::from("smtp"),
            resource_group: String::from("smtpgroup"),
            vm_name: String::from("smtp"),
            location: String::from("uksouth"),
            vm_size: String::from("Standard_B2s"),
            os_disk_gb: 128,
            vm_username: String::from("azureuser"),
            vm_password: String::from("azurepassword1234!"),
            admin_email: String::from("admin@example.com"),
            admin_password: String::from("smtppass123!"),
        }
    }

    struct MockSet {
        groups: MockResourceGroupProvider,
        compute: MockComputeProvider,
        network: MockNetworkProvider,
        storage: MockStorageProvider,
        blobs: MockBlobStore,
        dns: MockDnsProvider,
    }

    impl MockSet {
        fn new() -> Self {
            Self {
                groups: MockResourceGroupProvider::new(),
                compute: MockComputeProvider::new(),
                network: MockNetworkProvider::new(),
                storage: MockStorageProvider::new(),
                blobs: MockBlobStore::new(),
                dns: MockDnsProvider::new(),
            }
        }

        fn into_providers(self) -> Providers {
            Providers {
                groups: Arc::new(self.groups),
                compute: Arc::new(self.compute),
                network: Arc::new(self.network),
                storage: Arc::new(self.storage),
                blobs: Arc::new(self.blobs),
                dns: Arc::new(self.dns),
                resolver: Arc::new(MockPublicResolver::new()),
            }
        }
    }

    /// Shared log of deletion calls, to assert ordering across providers.
    type CallLog = Arc<Mutex<Vec<String>>>;

    fn log(calls: &CallLog, entry: impl Into<String>) {
        calls.lock().unwrap().push(entry.into());
    }

    fn pre_vm_plan() -> ProvisioningPlan {
        let mut plan = ProvisioningPlan::new("smtp", "uksouth");
        plan.record_created(ResourceHandle::created(
            ResourceKind::ResourceGroup,
            "smtpgroup",
            "rg-id",
        ));
        plan.record_created(ResourceHandle::created(
            ResourceKind::StorageAccount,
            "smtp1234",
            "sa-id",
        ));
        plan.record_created(ResourceHandle::created(
            ResourceKind::BlobArtifact,
            "smtp-setup.sh",
            blob_id("smtp1234", "vm-startup-scripts", "smtp-setup.sh"),
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
        plan.record_created(ResourceHandle::created(
            ResourceKind::SecurityGroup,
            "smtp-nsg",
            "nsg-id",
        ));
        plan.record_created(ResourceHandle::created(
            ResourceKind::NetworkInterface,
            "smtp-nic",
            "nic-id",
        ));
        plan
    }

    #[tokio::test]
    async fn test_rollback_processes_pre_vm_plan_in_reverse_order() {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let mut mocks = MockSet::new();

        let c = calls.clone();
        mocks.network.expect_delete_nic().returning(move |_, name| {
            log(&c, format!("nic:{name}"));
            Ok(())
        });
        let c = calls.clone();
        mocks
            .network
            .expect_delete_security_group()
            .returning(move |_, name| {
                log(&c, format!("nsg:{name}"));
                Ok(())
            });
        let c = calls.clone();
        mocks
            .network
            .expect_delete_public_ip()
            .returning(move |_, name| {
                log(&c, format!("ip:{name}"));
                Ok(())
            });
        let c = calls.clone();
        mocks.network.expect_delete_vnet().returning(move |_, name| {
            log(&c, format!("vnet:{name}"));
            Ok(())
        });
        mocks.storage.expect_list_keys().returning(|_, _| {
            Ok(StorageKeys {
                primary: String::from("key"),
            })
        });
        let c = calls.clone();
        mocks.blobs.expect_delete_blob().returning(move |_, _, blob| {
            log(&c, format!("blob:{blob}"));
            Ok(())
        });
        let c = calls.clone();
        mocks
            .blobs
            .expect_delete_container()
            .returning(move |_, container| {
                log(&c, format!("container:{container}"));
                Ok(())
            });
        let c = calls.clone();
        mocks
            .storage
            .expect_delete_account()
            .returning(move |_, name| {
                log(&c, format!("account:{name}"));
                Ok(())
            });
        let c = calls.clone();
        mocks.groups.expect_delete().returning(move |name| {
            log(&c, format!("group:{name}"));
            Ok(())
        });

        let providers = mocks.into_providers();
        let settings = settings();
        let engine = RollbackEngine::new(&providers, &settings);

        let mut plan = pre_vm_plan();
        let report = engine.rollback(&mut plan).await;

        assert_eq!(report.deleted, 7);
        assert_eq!(report.failed, 0);

        let recorded = calls.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec![
                "nic:smtp-nic",
                "nsg:smtp-nsg",
                "ip:smtp-public-ip",
                "vnet:smtp-vnet",
                "blob:smtp-setup.sh",
                "container:vm-startup-scripts",
                "account:smtp1234",
                "group:smtpgroup",
            ]
        );

        assert!(plan
            .handles()
            .iter()
            .all(|h| h.state == ResourceState::Deleted));
    }

    #[tokio::test]
    async fn test_single_failure_never_blocks_remaining_deletions() {
        let mut mocks = MockSet::new();

        mocks
            .network
            .expect_delete_nic()
            .returning(|_, _| Err(CloudError::api_error(409, "nic is in use").into()));
        mocks
            .network
            .expect_delete_security_group()
            .returning(|_, _| Ok(()));
        mocks
            .network
            .expect_delete_public_ip()
            .returning(|_, _| Ok(()));
        mocks.network.expect_delete_vnet().returning(|_, _| Ok(()));
        mocks.storage.expect_list_keys().returning(|_, _| {
            Ok(StorageKeys {
                primary: String::from("key"),
            })
        });
        mocks.blobs.expect_delete_blob().returning(|_, _, _| Ok(()));
        mocks
            .blobs
            .expect_delete_container()
            .returning(|_, _| Ok(()));
        mocks.storage.expect_delete_account().returning(|_, _| Ok(()));
        mocks.groups.expect_delete().returning(|_| Ok(()));

        let providers = mocks.into_providers();
        let settings = settings();
        let engine = RollbackEngine::new(&providers, &settings);

        let mut plan = pre_vm_plan();
        let report = engine.rollback(&mut plan).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, 6);
        assert!(!report.is_clean());

        let nic = plan
            .handles()
            .iter()
            .find(|h| h.kind == ResourceKind::NetworkInterface)
            .unwrap();
        assert_eq!(nic.state, ResourceState::DeletionFailed);
    }

    #[tokio::test]
    async fn test_record_deletion_targets_name_and_type() {
        let mut mocks = MockSet::new();

        mocks
            .dns
            .expect_delete_record_set()
            .with(
                eq("smtpgroup"),
                eq("example.com"),
                eq("@"),
                eq(RecordType::Txt),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        mocks
            .dns
            .expect_delete_record_set()
            .with(
                eq("smtpgroup"),
                eq("example.com"),
                eq("@"),
                eq(RecordType::Mx),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let providers = mocks.into_providers();
        let settings = settings();
        let engine = RollbackEngine::new(&providers, &settings);

        let mut plan = ProvisioningPlan::new("smtp", "uksouth");
        plan.record_created(ResourceHandle::dns_record(
            "example.com",
            RecordKey::new("@", RecordType::Txt),
        ));
        plan.record_created(ResourceHandle::dns_record(
            "example.com",
            RecordKey::new("@", RecordType::Mx),
        ));

        let report = engine.rollback(&mut plan).await;
        assert_eq!(report.deleted, 2);
    }

    #[tokio::test]
    async fn test_zone_is_retained_on_rollback() {
        let mocks = MockSet::new();
        // No dns delete expectations: deleting the zone would panic the mock.
        let providers = mocks.into_providers();
        let settings = settings();
        let engine = RollbackEngine::new(&providers, &settings);

        let mut plan = ProvisioningPlan::new("smtp", "uksouth");
        plan.record_created(ResourceHandle::created(
            ResourceKind::DnsZone,
            "example.com",
            "zone-id",
        ));

        let report = engine.rollback(&mut plan).await;
        assert_eq!(report.retained, 1);
        assert_eq!(report.deleted, 0);
        assert_eq!(
            plan.handles()[0].state,
            ResourceState::Created,
            "zone handle must stay live"
        );
    }

    #[tokio::test]
    async fn test_already_gone_resource_counts_as_deleted() {
        let mut mocks = MockSet::new();
        mocks
            .network
            .expect_delete_vnet()
            .returning(|_, _| Err(CloudError::not_found("smtp-vnet").into()));

        let providers = mocks.into_providers();
        let settings = settings();
        let engine = RollbackEngine::new(&providers, &settings);

        let mut plan = ProvisioningPlan::new("smtp", "uksouth");
        plan.record_created(ResourceHandle::created(
            ResourceKind::VirtualNetwork,
            "smtp-vnet",
            "vnet-id",
        ));

        let report = engine.rollback(&mut plan).await;
        assert_eq!(report.deleted, 1);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_staging_cleanup_leaves_durable_resources() {
        let mut mocks = MockSet::new();

        mocks.storage.expect_list_keys().returning(|_, _| {
            Ok(StorageKeys {
                primary: String::from("key"),
            })
        });
        mocks.blobs.expect_delete_blob().times(1).returning(|_, _, _| Ok(()));
        mocks
            .blobs
            .expect_delete_container()
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .storage
            .expect_delete_account()
            .times(1)
            .returning(|_, _| Ok(()));
        // No compute/network deletions expected; the mocks would panic.

        let providers = mocks.into_providers();
        let settings = settings();
        let engine = RollbackEngine::new(&providers, &settings);

        let mut plan = pre_vm_plan();
        plan.record_created(ResourceHandle::created(
            ResourceKind::VirtualMachine,
            "smtp",
            "vm-id",
        ));

        let report = engine.cleanup_staging(&mut plan).await;
        assert_eq!(report.deleted, 2);

        let vm = plan
            .handles()
            .iter()
            .find(|h| h.kind == ResourceKind::VirtualMachine)
            .unwrap();
        assert_eq!(vm.state, ResourceState::Created);
        let vnet = plan
            .handles()
            .iter()
            .find(|h| h.kind == ResourceKind::VirtualNetwork)
            .unwrap();
        assert_eq!(vnet.state, ResourceState::Created);
    }
}
