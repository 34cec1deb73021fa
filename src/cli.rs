//! Command-line interface.
//!
//! This module defines the clap surface and the terminal output for the
//! one-shot provisioning run: the confirmation preview, the success
//! banner, and the created-resources table.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ProvisionSettings;
use crate::plan::ProvisioningPlan;
use crate::provision::ProvisionOutcome;

/// Mailforge - one-shot Mailcow mail server provisioning on Azure.
#[derive(Parser, Debug)]
#[command(name = "mailforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision a complete mail server: VM, network, DNS, bootstrap.
    Provision {
        /// Apex domain the DNS zone will manage (e.g. example.com).
        #[arg(long)]
        domain: String,

        /// Service subdomain; the mail host becomes <subdomain>.<domain>.
        #[arg(long, default_value = "smtp")]
        subdomain: String,

        /// Resource group to create the resources in.
        #[arg(long)]
        resource_group: String,

        /// VM name; also the naming base for the other resources.
        #[arg(long)]
        vm_name: String,

        /// Azure region.
        #[arg(long, default_value = "uksouth")]
        location: String,

        /// VM size.
        #[arg(long, default_value = "Standard_B2s")]
        vm_size: String,

        /// OS disk size in GB.
        #[arg(long, default_value = "128")]
        os_disk_gb: u32,

        /// VM admin username.
        #[arg(long, default_value = "azureuser")]
        vm_username: String,

        /// VM admin password.
        #[arg(long, env = "MAILFORGE_VM_PASSWORD", hide_env_values = true)]
        vm_password: String,

        /// Mailcow admin email address.
        #[arg(long)]
        admin_email: String,

        /// Mailcow admin password.
        #[arg(long, env = "MAILFORGE_ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: String,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

impl Commands {
    /// Converts the provision flags into run settings.
    #[must_use]
    pub fn into_settings(self) -> (ProvisionSettings, bool) {
        match self {
            Self::Provision {
                domain,
                subdomain,
                resource_group,
                vm_name,
                location,
                vm_size,
                os_disk_gb,
                vm_username,
                vm_password,
                admin_email,
                admin_password,
                yes,
            } => (
                ProvisionSettings {
                    domain,
                    subdomain,
                    resource_group,
                    vm_name,
                    location,
                    vm_size,
                    os_disk_gb,
                    vm_username,
                    vm_password,
                    admin_email,
                    admin_password,
                },
                yes,
            ),
        }
    }
}

/// Resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
}

/// Formats the pre-run preview shown before confirmation.
#[must_use]
pub fn format_preview(settings: &ProvisionSettings) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{}", "Provisioning plan:".bold());
    let _ = writeln!(output, "  Mail host:      {}", settings.fqdn());
    let _ = writeln!(output, "  Resource group: {}", settings.resource_group);
    let _ = writeln!(output, "  Region:         {}", settings.location);
    let _ = writeln!(
        output,
        "  VM:             {} ({}, {} GB disk)",
        settings.vm_name, settings.vm_size, settings.os_disk_gb
    );
    let _ = writeln!(output, "  DNS zone:       {}", settings.domain);
    output
}

/// Formats the created-resources table.
#[must_use]
pub fn format_resource_table(plan: &ProvisioningPlan) -> String {
    let rows: Vec<ResourceRow> = plan
        .handles()
        .iter()
        .map(|h| ResourceRow {
            kind: h.kind.to_string(),
            name: h.name.clone(),
            state: h.state.to_string(),
        })
        .collect();
    Table::new(rows).to_string()
}

/// Formats the final success banner.
#[must_use]
pub fn format_success(outcome: &ProvisionOutcome, settings: &ProvisionSettings) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "\n{} Mail server provisioned at {}",
        "✓".green().bold(),
        outcome.fqdn.bold()
    );
    let _ = writeln!(output, "  Public IP:  {}", outcome.public_ip);
    let _ = writeln!(
        output,
        "  Admin UI:   https://{}/admin/ (user: admin, password: {})",
        outcome.fqdn, settings.admin_password
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "{}", "Follow-up:".bold());
    let _ = writeln!(
        output,
        "  Mailcow may take a few more minutes to finish starting up."
    );
    let _ = writeln!(
        output,
        "  Generate a DKIM key in the admin UI (Configuration > ARC/DKIM keys)"
    );
    let _ = writeln!(
        output,
        "  and publish it as a TXT record at dkim._domainkey.{}.",
        settings.domain
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "{}", "Created resources:".bold());
    let _ = writeln!(output, "{}", format_resource_table(&outcome.plan));
    output
}

/// Formats the failure notice printed after rollback.
#[must_use]
pub fn format_failure(error: &crate::error::MailforgeError) -> String {
    format!(
        "{} Provisioning failed: {error}\n  All resources created by this run were rolled back.",
        "✗".red().bold()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ResourceHandle, ResourceKind};
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_provision_flags_map_to_settings() {
        let cli = Cli::parse_from([
            "mailforge",
            "provision",
            "--domain",
            "example.com",
            "--resource-group",
            "smtpgroup",
            "--vm-name",
            "smtp",
            "--vm-password",
            "azurepassword1234!",
            "--admin-email",
            "admin@example.com",
            "--admin-password",
            "smtppass123!",
            "--yes",
        ]);

        let (settings, yes) = cli.command.into_settings();
        assert!(yes);
        assert_eq!(settings.fqdn(), "smtp.example.com");
        assert_eq!(settings.location, "uksouth");
        assert_eq!(settings.os_disk_gb, 128);
    }

    #[test]
    fn test_resource_table_lists_handles() {
        let mut plan = ProvisioningPlan::new("smtp", "uksouth");
        plan.record_created(ResourceHandle::created(
            ResourceKind::VirtualMachine,
            "smtp",
            "vm-id",
        ));

        let table = format_resource_table(&plan);
        assert!(table.contains("virtual machine"));
        assert!(table.contains("created"));
    }
}
