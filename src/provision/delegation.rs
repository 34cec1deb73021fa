//! NS delegation verification.
//!
//! Confirms that the public internet delegates the domain to the managed
//! zone's nameservers before any dependent record is trusted to resolve.
//! Public DNS is eventually consistent, so the check polls: bounded
//! attempts, fixed delay, comparing normalized nameserver sets. The check
//! never mutates the zone.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Result, VerifyError};
use crate::providers::{DnsProvider, PublicResolver};

/// Retry budget for the delegation poll loop.
///
/// Injected rather than hard-coded so tests can run with a zero delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of poll attempts.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(10),
        }
    }
}

/// Outcome of a single delegation check.
///
/// Produced fresh on every attempt; nothing is cached across attempts
/// because the whole point is to observe propagation over time.
#[derive(Debug, Clone)]
pub struct DelegationCheckResult {
    /// Nameservers the managed zone reports, normalized and sorted.
    pub managed: BTreeSet<String>,
    /// Nameservers a public resolver reports, normalized and sorted.
    pub observed: BTreeSet<String>,
    /// True if the managed set is a subset of the observed set.
    pub matched: bool,
}

impl DelegationCheckResult {
    /// Compares the two nameserver sets after normalization.
    #[must_use]
    pub fn compare(managed: &[String], observed: &[String]) -> Self {
        let managed: BTreeSet<String> = managed.iter().map(|ns| normalize(ns)).collect();
        let observed: BTreeSet<String> = observed.iter().map(|ns| normalize(ns)).collect();
        // An empty public result can never satisfy delegation.
        let matched = !managed.is_empty() && !observed.is_empty() && managed.is_subset(&observed);
        Self {
            managed,
            observed,
            matched,
        }
    }
}

/// Lower-cases a nameserver name and strips the trailing dot.
#[must_use]
pub fn normalize(ns: &str) -> String {
    ns.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Polls public DNS until the domain's delegation matches the managed zone.
pub struct DelegationVerifier {
    dns: Arc<dyn DnsProvider>,
    resolver: Arc<dyn PublicResolver>,
    policy: RetryPolicy,
}

impl DelegationVerifier {
    /// Creates a verifier with the given retry policy.
    #[must_use]
    pub fn new(
        dns: Arc<dyn DnsProvider>,
        resolver: Arc<dyn PublicResolver>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            dns,
            resolver,
            policy,
        }
    }

    /// Runs one delegation check.
    ///
    /// A failure on either side (zone lookup or public resolution) is
    /// reported as a non-match rather than an error; the caller's retry
    /// budget decides when to give up.
    pub async fn check_once(
        &self,
        resource_group: &str,
        domain: &str,
    ) -> Result<DelegationCheckResult> {
        let managed = match self.dns.get_zone(resource_group, domain).await {
            Ok(Some(zone)) => zone.name_servers,
            Ok(None) => {
                warn!("Managed zone '{domain}' not found during delegation check");
                Vec::new()
            }
            Err(e) => {
                warn!("Failed to read managed zone nameservers: {e}");
                Vec::new()
            }
        };

        let observed = match self.resolver.resolve_ns(domain).await {
            Ok(names) => names,
            Err(e) => {
                warn!("Public NS resolution for '{domain}' failed: {e}");
                Vec::new()
            }
        };

        Ok(DelegationCheckResult::compare(&managed, &observed))
    }

    /// Polls until delegation matches or the attempt budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::DelegationTimeout`] after the final failed
    /// attempt; this aborts the run and triggers rollback.
    pub async fn verify(&self, resource_group: &str, domain: &str) -> Result<DelegationCheckResult> {
        for attempt in 1..=self.policy.max_attempts {
            let result = self.check_once(resource_group, domain).await?;

            if result.matched {
                info!(
                    "NS delegation for '{domain}' confirmed on attempt {attempt}/{}",
                    self.policy.max_attempts
                );
                return Ok(result);
            }

            warn!(
                "NS delegation for '{domain}' not yet visible \
                 (managed: {:?}, observed: {:?})",
                result.managed, result.observed
            );

            if attempt < self.policy.max_attempts {
                warn!(
                    "Retrying NS delegation check in {:?} (attempt {attempt}/{})",
                    self.policy.delay, self.policy.max_attempts
                );
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        Err(VerifyError::DelegationTimeout {
            domain: domain.to_string(),
            attempts: self.policy.max_attempts,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MailforgeError;
    use crate::providers::types::DnsZone;
    use crate::providers::{MockDnsProvider, MockPublicResolver};

    fn zone(name_servers: &[&str]) -> DnsZone {
        DnsZone {
            name: String::from("example.com"),
            name_servers: name_servers.iter().map(ToString::to_string).collect(),
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_subset_with_trailing_dots_matches() {
        let result = DelegationCheckResult::compare(
            &strings(&["ns1.example.", "NS2.example."]),
            &strings(&["ns1.example", "ns2.example", "ns3.example"]),
        );
        assert!(result.matched);
    }

    #[test]
    fn test_missing_nameserver_is_mismatch() {
        let result = DelegationCheckResult::compare(
            &strings(&["ns1.example.", "ns2.example."]),
            &strings(&["ns1.example", "ns3.example"]),
        );
        assert!(!result.matched);
    }

    #[test]
    fn test_empty_public_result_is_mismatch() {
        let result =
            DelegationCheckResult::compare(&strings(&["ns1.example."]), &strings(&[]));
        assert!(!result.matched);
    }

    #[tokio::test]
    async fn test_verify_succeeds_once_delegation_appears() {
        let mut dns = MockDnsProvider::new();
        dns.expect_get_zone()
            .returning(|_, _| Ok(Some(zone(&["ns1-01.azure-dns.com."]))));

        let mut resolver = MockPublicResolver::new();
        let mut calls = 0_u32;
        resolver.expect_resolve_ns().returning(move |_| {
            calls += 1;
            if calls < 3 {
                Ok(vec![String::from("ns.oldregistrar.net")])
            } else {
                Ok(vec![String::from("ns1-01.azure-dns.com")])
            }
        });

        let verifier =
            DelegationVerifier::new(Arc::new(dns), Arc::new(resolver), fast_policy(5));
        let result = verifier.verify("smtpgroup", "example.com").await.unwrap();
        assert!(result.matched);
    }

    #[tokio::test]
    async fn test_verify_exhaustion_is_delegation_timeout() {
        let mut dns = MockDnsProvider::new();
        dns.expect_get_zone()
            .times(4)
            .returning(|_, _| Ok(Some(zone(&["ns1-01.azure-dns.com."]))));

        let mut resolver = MockPublicResolver::new();
        resolver
            .expect_resolve_ns()
            .times(4)
            .returning(|_| Ok(vec![String::from("ns.oldregistrar.net")]));

        let verifier =
            DelegationVerifier::new(Arc::new(dns), Arc::new(resolver), fast_policy(4));
        let err = verifier.verify("smtpgroup", "example.com").await.unwrap_err();
        assert!(matches!(
            err,
            MailforgeError::Verify(VerifyError::DelegationTimeout { attempts: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_resolver_error_counts_as_mismatch_not_fatal() {
        let mut dns = MockDnsProvider::new();
        dns.expect_get_zone()
            .returning(|_, _| Ok(Some(zone(&["ns1-01.azure-dns.com."]))));

        let mut resolver = MockPublicResolver::new();
        let mut calls = 0_u32;
        resolver.expect_resolve_ns().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(crate::error::CloudError::network("resolver unreachable").into())
            } else {
                Ok(vec![String::from("ns1-01.azure-dns.com")])
            }
        });

        let verifier =
            DelegationVerifier::new(Arc::new(dns), Arc::new(resolver), fast_policy(3));
        let result = verifier.verify("smtpgroup", "example.com").await.unwrap();
        assert!(result.matched);
    }
}
