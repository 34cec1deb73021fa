//! The forward provisioning pass.
//!
//! [`Provisioner::run`] walks the fixed dependency chain for one mail
//! server: resource group, staging storage, networking, the VM, DNS, the
//! delegation gate, the mail records, and finally the bootstrap extension.
//! Every confirmed creation is recorded in the plan before the next step
//! starts, so a failure at any point rolls back exactly what exists.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::bootstrap::BootstrapScript;
use crate::config::ports::{INBOUND_PORTS, OUTBOUND_PORTS};
use crate::config::{ProvisionSettings, BOOTSTRAP_CONTAINER, DNS_RECORD_TTL};
use crate::error::{CloudError, MailforgeError, Result, VerifyError};
use crate::plan::{ProvisioningPlan, RecordKey, ResourceHandle, ResourceKind};
use crate::providers::types::{
    BlobAccess, DnsZone, ExtensionSpec, ImageReference, NicSpec, RecordData, SecurityGroup,
    SecurityGroupSpec, VmSpec, VnetSpec,
};
use crate::providers::Providers;
use crate::provision::delegation::{DelegationVerifier, RetryPolicy};
use crate::provision::records::{post_delegation_records, service_a_record};
use crate::provision::rollback::{blob_id, CleanupReport, RollbackEngine};
use crate::provision::rules::{merged_rules, missing_rules};

/// Validity window of the signed bootstrap script URL.
const ARTIFACT_URL_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Bound on the bootstrap extension run.
const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(600);

/// Orchestrates one provisioning run end to end.
#[derive(Debug)]
pub struct Provisioner {
    providers: Providers,
    settings: ProvisionSettings,
    delegation_policy: RetryPolicy,
}

/// Result of a successful run.
#[derive(Debug)]
pub struct ProvisionOutcome {
    /// The plan, with one handle per resource this run created.
    pub plan: ProvisioningPlan,
    /// Public IPv4 address the mail host answers on.
    pub public_ip: String,
    /// Fully qualified mail host name.
    pub fqdn: String,
    /// Result of the staging cleanup that follows success.
    pub cleanup: CleanupReport,
}

impl Provisioner {
    /// Creates a provisioner with the default delegation retry policy.
    #[must_use]
    pub fn new(providers: Providers, settings: ProvisionSettings) -> Self {
        Self {
            providers,
            settings,
            delegation_policy: RetryPolicy::default(),
        }
    }

    /// Overrides the delegation retry policy.
    #[must_use]
    pub const fn with_delegation_policy(mut self, policy: RetryPolicy) -> Self {
        self.delegation_policy = policy;
        self
    }

    /// Runs the full pipeline.
    ///
    /// On success the transient staging pieces (bootstrap blob, container,
    /// storage account) are removed and everything durable stays. On any
    /// failure every resource this run created is rolled back in reverse
    /// order and the original error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the forward pass: a cloud call
    /// failure, a delegation timeout, or a zone without nameservers.
    pub async fn run(&self) -> Result<ProvisionOutcome> {
        let mut plan = ProvisioningPlan::new(&self.settings.vm_name, self.settings.location.clone());
        info!(run_id = %plan.run_id, "Starting provisioning run");

        let engine = RollbackEngine::new(&self.providers, &self.settings);
        match self.forward(&mut plan).await {
            Ok(public_ip) => {
                let cleanup = engine.cleanup_staging(&mut plan).await;
                let fqdn = self.settings.fqdn();
                info!(%fqdn, %public_ip, "Provisioning completed");
                Ok(ProvisionOutcome {
                    plan,
                    public_ip,
                    fqdn,
                    cleanup,
                })
            }
            Err(e) => {
                error!("Provisioning failed: {e}");
                let report = engine.rollback(&mut plan).await;
                if !report.is_clean() {
                    warn!("Rollback incomplete ({report}); manual cleanup may be needed");
                }
                Err(e)
            }
        }
    }

    /// The forward pass: creates everything, in dependency order.
    async fn forward(&self, plan: &mut ProvisioningPlan) -> Result<String> {
        let s = &self.settings;
        let rg = &s.resource_group;

        // Resource group. Only a group this run created is ours to delete.
        if self.providers.groups.exists(rg).await? {
            debug!("Resource group '{rg}' already exists");
        } else {
            info!("Creating resource group '{rg}' in {}", s.location);
            self.providers.groups.ensure(rg, &s.location).await?;
            plan.record_created(ResourceHandle::created(ResourceKind::ResourceGroup, rg, rg));
        }

        // Staging storage account, suffixed to dodge the global namespace.
        let account = s.storage_account_name(plan.suffix);
        if self.providers.storage.account_exists(rg, &account).await? {
            debug!("Storage account '{account}' already exists");
        } else {
            info!("Creating storage account '{account}'");
            self.providers
                .storage
                .create_account(rg, &account, &s.location)
                .await?;
            plan.record_created(ResourceHandle::created(
                ResourceKind::StorageAccount,
                &account,
                &account,
            ));
        }
        let keys = self.providers.storage.list_keys(rg, &account).await?;
        let access = BlobAccess {
            account: account.clone(),
            key: keys.primary,
        };

        // Stage the bootstrap script and mint its time-limited URL.
        let blob = s.bootstrap_blob_name();
        self.providers
            .blobs
            .ensure_container(&access, BOOTSTRAP_CONTAINER)
            .await?;
        let script = BootstrapScript::new(s.fqdn(), &s.admin_email, &s.admin_password);
        info!("Uploading bootstrap script '{blob}'");
        self.providers
            .blobs
            .upload(&access, BOOTSTRAP_CONTAINER, &blob, &script.render())
            .await?;
        plan.record_created(ResourceHandle::created(
            ResourceKind::BlobArtifact,
            &blob,
            blob_id(&account, BOOTSTRAP_CONTAINER, &blob),
        ));
        let artifact_url = self
            .providers
            .blobs
            .signed_read_url(&access, BOOTSTRAP_CONTAINER, &blob, ARTIFACT_URL_TTL)
            .await?;

        // Network: VNet with one subnet.
        let vnet_name = s.vnet_name();
        info!("Creating virtual network '{vnet_name}'");
        let vnet_spec =
            VnetSpec::with_default_addressing(vnet_name.clone(), s.location.clone(), s.subnet_name());
        let vnet = self.providers.network.create_vnet(rg, &vnet_spec).await?;
        plan.record_created(ResourceHandle::created(
            ResourceKind::VirtualNetwork,
            &vnet_name,
            &vnet.id,
        ));

        // Dynamically allocated public IP; the address only materializes
        // once a NIC binds it.
        let ip_name = s.public_ip_name();
        info!("Creating public IP '{ip_name}'");
        let public_ip = self
            .providers
            .network
            .create_public_ip(rg, &ip_name, &s.location)
            .await?;
        plan.record_created(ResourceHandle::created(
            ResourceKind::PublicIp,
            &ip_name,
            &public_ip.id,
        ));

        let nsg = self.ensure_security_group(plan).await?;

        // NIC joining subnet, public IP and security group.
        let nic_name = s.nic_name();
        info!("Creating network interface '{nic_name}'");
        let nic_spec = NicSpec {
            name: nic_name.clone(),
            location: s.location.clone(),
            ip_config_name: s.ip_config_name(),
            subnet_id: vnet.subnet_id.clone(),
            public_ip_id: public_ip.id.clone(),
            nsg_id: nsg.id.clone(),
        };
        let nic = self.providers.network.create_nic(rg, &nic_spec).await?;
        plan.record_created(ResourceHandle::created(
            ResourceKind::NetworkInterface,
            &nic_name,
            &nic.id,
        ));

        // The VM itself.
        info!("Creating virtual machine '{}'", s.vm_name);
        let vm_spec = VmSpec {
            name: s.vm_name.clone(),
            location: s.location.clone(),
            size: s.vm_size.clone(),
            os_disk_name: s.os_disk_name(),
            os_disk_gb: s.os_disk_gb,
            admin_username: s.vm_username.clone(),
            admin_password: s.vm_password.clone(),
            nic_id: nic.id.clone(),
            image: ImageReference::ubuntu_24_04(),
        };
        let vm = self.providers.compute.create_vm(rg, &vm_spec).await?;
        plan.record_created(ResourceHandle::created(
            ResourceKind::VirtualMachine,
            &s.vm_name,
            &vm.id,
        ));

        // Now that the NIC is live the dynamic address exists. The NIC's
        // ip-configuration names the public IP that received it, so the
        // address is read back through the attachment rather than by
        // assuming the name used at creation.
        let nic_view = self.providers.network.get_nic(rg, &nic_name).await?;
        let attached_ip = nic_view.public_ip_name.ok_or_else(|| {
            CloudError::invalid_response(format!("NIC '{nic_name}' has no public IP attached"))
        })?;
        let allocated = self
            .providers
            .network
            .get_public_ip(rg, &attached_ip)
            .await?;
        let address = allocated.ip_address.ok_or_else(|| {
            CloudError::invalid_response(format!(
                "public IP '{attached_ip}' has no allocated address"
            ))
        })?;
        info!("Public address allocated: {address}");

        // Managed DNS zone, created only when absent.
        let zone = self.ensure_zone(plan).await?;
        if zone.name_servers.is_empty() {
            return Err(VerifyError::EmptyZoneNameservers {
                zone: s.domain.clone(),
            }
            .into());
        }
        info!(
            "Zone '{}' nameservers: {}",
            s.domain,
            zone.name_servers.join(", ")
        );

        // Service host A record goes in before the delegation gate so it
        // is already resolvable the moment delegation lands.
        let (key, data) = service_a_record(s, &address);
        self.upsert_record(plan, key, &data).await?;

        // Delegation gate: mail records are pointless until the registrar
        // actually delegates to the managed zone.
        let verifier = DelegationVerifier::new(
            self.providers.dns.clone(),
            self.providers.resolver.clone(),
            self.delegation_policy,
        );
        let check = verifier.verify(rg, &s.domain).await?;
        info!(
            "Delegation confirmed for '{}' ({} nameservers observed)",
            s.domain,
            check.observed.len()
        );

        for (key, data) in post_delegation_records(s, &address) {
            self.upsert_record(plan, key, &data).await?;
        }

        // Bootstrap extension; exceeding the bound is a hard failure even
        // though the script may still be running on the VM.
        info!("Running bootstrap extension on '{}'", s.vm_name);
        let extension = ExtensionSpec {
            location: s.location.clone(),
            artifact_url,
            command: format!("bash {blob}"),
            timeout: BOOTSTRAP_TIMEOUT,
        };
        self.providers
            .compute
            .run_extension(rg, &s.vm_name, &extension)
            .await?;
        // The extension handle hangs off the VM it ran on; its id comes
        // from the recorded VM handle, not from step-local state.
        let vm_id = plan
            .external_id(ResourceKind::VirtualMachine)
            .ok_or_else(|| MailforgeError::internal("extension ran without a recorded VM"))?
            .to_string();
        plan.record_created(ResourceHandle::created(
            ResourceKind::Extension,
            "bootstrap",
            &vm_id,
        ));

        Ok(address)
    }

    /// Gets or creates the security group and brings its rule set up to
    /// the full port lists without disturbing foreign rules.
    async fn ensure_security_group(&self, plan: &mut ProvisioningPlan) -> Result<SecurityGroup> {
        let s = &self.settings;
        let rg = &s.resource_group;
        let name = s.nsg_name();

        match self.providers.network.get_security_group(rg, &name).await? {
            Some(existing) => {
                let missing = missing_rules(&existing.rules, INBOUND_PORTS, OUTBOUND_PORTS);
                if missing.is_empty() {
                    debug!("Security group '{name}' already holds all rules");
                    return Ok(existing);
                }
                info!("Adding {} rules to security group '{name}'", missing.len());
                let spec = SecurityGroupSpec {
                    name: name.clone(),
                    location: s.location.clone(),
                    rules: merged_rules(&existing.rules, INBOUND_PORTS, OUTBOUND_PORTS),
                };
                // Pre-existing group: updated, but never ours to delete.
                self.providers.network.upsert_security_group(rg, &spec).await
            }
            None => {
                info!("Creating security group '{name}'");
                let spec = SecurityGroupSpec {
                    name: name.clone(),
                    location: s.location.clone(),
                    rules: missing_rules(&[], INBOUND_PORTS, OUTBOUND_PORTS),
                };
                let group = self.providers.network.upsert_security_group(rg, &spec).await?;
                plan.record_created(ResourceHandle::created(
                    ResourceKind::SecurityGroup,
                    &name,
                    &group.id,
                ));
                Ok(group)
            }
        }
    }

    /// Gets or creates the managed zone for the apex domain.
    async fn ensure_zone(&self, plan: &mut ProvisioningPlan) -> Result<DnsZone> {
        let s = &self.settings;
        let rg = &s.resource_group;

        if let Some(zone) = self.providers.dns.get_zone(rg, &s.domain).await? {
            debug!("DNS zone '{}' already exists", s.domain);
            return Ok(zone);
        }
        info!("Creating DNS zone '{}'", s.domain);
        let zone = self.providers.dns.create_zone(rg, &s.domain).await?;
        plan.record_created(ResourceHandle::created(
            ResourceKind::DnsZone,
            &s.domain,
            &s.domain,
        ));
        Ok(zone)
    }

    /// Upserts one record set and records its handle.
    async fn upsert_record(
        &self,
        plan: &mut ProvisioningPlan,
        key: RecordKey,
        data: &RecordData,
    ) -> Result<()> {
        let s = &self.settings;
        info!(
            "Upserting {} record '{}' in zone '{}'",
            key.record_type, key.relative_name, s.domain
        );
        self.providers
            .dns
            .upsert_record_set(
                &s.resource_group,
                &s.domain,
                &key.relative_name,
                DNS_RECORD_TTL,
                data,
            )
            .await?;
        plan.record_created(ResourceHandle::dns_record(&s.domain, key));
        Ok(())
    }
}
