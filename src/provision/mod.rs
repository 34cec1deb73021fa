//! The provisioning pipeline: forward pass, verification, and rollback.

pub mod delegation;
pub mod provisioner;
pub mod records;
pub mod rollback;
pub mod rules;

pub use delegation::{DelegationCheckResult, DelegationVerifier, RetryPolicy};
pub use provisioner::{ProvisionOutcome, Provisioner};
pub use rollback::{CleanupReport, RollbackEngine};
