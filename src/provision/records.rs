//! The DNS record set required for mail delivery and domain verification.
//!
//! Every record is an independent upsert keyed by `(zone, relative name,
//! record type)`. Order does not matter functionally, except that the A
//! record is created before the delegation gate so the check verifies a
//! zone that already answers for the mail host.

use crate::config::ProvisionSettings;
use crate::plan::{RecordKey, RecordType};
use crate::providers::types::RecordData;

/// MX preference for the single mail exchanger.
pub const MX_PREFERENCE: u16 = 10;

/// The A record for the service subdomain. Created before the delegation
/// gate; everything else comes after.
#[must_use]
pub fn service_a_record(settings: &ProvisionSettings, public_ip: &str) -> (RecordKey, RecordData) {
    (
        RecordKey::new(settings.subdomain.clone(), RecordType::A),
        RecordData::A {
            address: public_ip.to_string(),
        },
    )
}

/// The records created after delegation is confirmed.
///
/// SPF and DMARC embed the resolved public IP and admin mailbox, so this
/// can only run once the NIC has an address.
#[must_use]
pub fn post_delegation_records(
    settings: &ProvisionSettings,
    public_ip: &str,
) -> Vec<(RecordKey, RecordData)> {
    let fqdn = settings.fqdn();
    let domain = &settings.domain;

    vec![
        (
            RecordKey::new("autodiscover", RecordType::Cname),
            RecordData::Cname {
                target: fqdn.clone(),
            },
        ),
        (
            RecordKey::new("autoconfig", RecordType::Cname),
            RecordData::Cname {
                target: fqdn.clone(),
            },
        ),
        (
            RecordKey::new("@", RecordType::Txt),
            RecordData::Txt {
                values: vec![format!("v=spf1 ip4:{public_ip} -all")],
            },
        ),
        (
            RecordKey::new("_dmarc", RecordType::Txt),
            RecordData::Txt {
                values: vec![format!(
                    "v=DMARC1; p=quarantine; rua=mailto:admin@{domain}; \
                     ruf=mailto:admin@{domain}; fo=1; adkim=s; aspf=s"
                )],
            },
        ),
        (
            RecordKey::new("@", RecordType::Mx),
            RecordData::Mx {
                preference: MX_PREFERENCE,
                exchange: fqdn,
            },
        ),
        // Placeholder for the DNS-01 challenge; replaced by the ACME
        // client once certificates are issued from the VM.
        (
            RecordKey::new("_acme-challenge", RecordType::Txt),
            RecordData::Txt {
                values: vec![format!("_acme-challenge.{domain}")],
            },
        ),
    ]
}
