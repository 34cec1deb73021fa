//! Public NS resolution against fixed well-known resolvers.
//!
//! Delegation must be observed from the public internet, not from the
//! provider's own resolvers, so lookups are pinned to Google Public DNS.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use tracing::debug;

use crate::error::{CloudError, Result};
use crate::providers::PublicResolver;

/// The resolvers delegation is observed through.
const PUBLIC_DNS_SERVERS: [IpAddr; 2] = [
    IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
    IpAddr::V4(Ipv4Addr::new(8, 8, 4, 4)),
];

/// [`PublicResolver`] pinned to Google Public DNS.
pub struct GoogleResolver {
    resolver: TokioAsyncResolver,
}

impl GoogleResolver {
    /// Creates the resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolver cannot be constructed.
    pub fn new() -> Result<Self> {
        let group = NameServerConfigGroup::from_ips_clear(&PUBLIC_DNS_SERVERS, 53, true);
        let config = ResolverConfig::from_parts(None, Vec::new(), group);
        let resolver = TokioAsyncResolver::tokio(config, ResolverOpts::default());
        Ok(Self { resolver })
    }
}

impl std::fmt::Debug for GoogleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl PublicResolver for GoogleResolver {
    async fn resolve_ns(&self, domain: &str) -> Result<Vec<String>> {
        match self.resolver.ns_lookup(domain).await {
            Ok(lookup) => {
                let servers: Vec<String> = lookup.iter().map(|ns| ns.0.to_utf8()).collect();
                debug!("Public NS for '{domain}': {}", servers.join(", "));
                Ok(servers)
            }
            // An empty delegation is an observation, not a failure.
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                debug!("No public NS records for '{domain}' yet");
                Ok(Vec::new())
            }
            Err(e) => Err(CloudError::network(format!("NS lookup for '{domain}' failed: {e}")).into()),
        }
    }
}
