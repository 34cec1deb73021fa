//! Azure implementations of the provider traits.
//!
//! Everything management-plane goes through one shared [`ArmClient`];
//! blob operations are signed per-request with the account key.

pub mod client;
pub mod compute;
pub mod dns;
pub mod groups;
pub mod network;
pub mod storage;

use std::sync::Arc;

use crate::config::AzureCredentials;
use crate::error::Result;
use crate::providers::Providers;
use crate::resolver::GoogleResolver;

pub use client::ArmClient;
pub use compute::AzureCompute;
pub use dns::AzureDns;
pub use groups::AzureResourceGroups;
pub use network::AzureNetwork;
pub use storage::{AzureBlobStore, AzureStorage};

/// Builds the full provider set against the public Azure endpoints.
///
/// # Errors
///
/// Returns an error if an HTTP client or the public resolver cannot be
/// constructed.
pub fn build_providers(credentials: AzureCredentials) -> Result<Providers> {
    let client = Arc::new(ArmClient::new(credentials)?);
    Ok(Providers {
        groups: Arc::new(AzureResourceGroups::new(Arc::clone(&client))),
        compute: Arc::new(AzureCompute::new(Arc::clone(&client))),
        network: Arc::new(AzureNetwork::new(Arc::clone(&client))),
        storage: Arc::new(AzureStorage::new(Arc::clone(&client))),
        blobs: Arc::new(AzureBlobStore::new()?),
        dns: Arc::new(AzureDns::new(client)),
        resolver: Arc::new(GoogleResolver::new()?),
    })
}
