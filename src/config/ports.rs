//! Port tables for the mail server security group.
//!
//! These are the ports Mailcow needs reachable (inbound) and the ports the
//! VM itself must be able to reach out on (DNS, SMTP relay, ACME).

/// Inbound ports opened on the security group.
pub const INBOUND_PORTS: &[u16] = &[
    22,   // SSH
    80,   // HTTP
    443,  // HTTPS
    8000, // Optional app port
    3000, // Optional app port
    25,   // Postfix SMTP
    465,  // Postfix SMTPS
    587,  // Postfix submission
    110,  // Dovecot POP3
    995,  // Dovecot POP3S
    143,  // Dovecot IMAP
    993,  // Dovecot IMAPS
    4190, // Dovecot ManageSieve
];

/// Outbound ports allowed from the VM.
pub const OUTBOUND_PORTS: &[u16] = &[
    25,  // Outbound SMTP
    53,  // DNS resolution
    80,  // HTTP (Let's Encrypt)
    443, // HTTPS (Let's Encrypt, updates)
];
