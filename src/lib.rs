//! # Mailforge
//!
//! One-shot provisioning of a complete Mailcow mail server on Azure.
//!
//! ## Overview
//!
//! A single `mailforge provision` run creates everything a self-hosted
//! mail server needs, in strict dependency order:
//!
//! - A resource group, staging storage, and the bootstrap script blob
//! - A virtual network, dynamic public IP, mail-port security group, NIC
//! - An Ubuntu 24.04 VM
//! - A managed DNS zone with the service A record, and - once registrar
//!   delegation to the zone is confirmed - the autodiscover/autoconfig,
//!   SPF, DMARC and MX records
//! - A custom script extension that installs and starts Mailcow
//!
//! Every confirmed creation is recorded in a [`plan::ProvisioningPlan`];
//! on any failure the run rolls the recorded resources back in reverse
//! order and exits non-zero. On success only the transient staging
//! pieces are removed.
//!
//! ## Architecture
//!
//! The orchestrator ([`provision::Provisioner`]) only talks to the
//! capability traits in [`providers`]; the Azure REST implementations
//! live in [`azure`] and the pinned public resolver in [`resolver`].

pub mod azure;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod plan;
pub mod providers;
pub mod provision;
pub mod resolver;

pub use error::{MailforgeError, Result};
pub use provision::{ProvisionOutcome, Provisioner};
