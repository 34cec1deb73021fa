//! Security-group rule synthesis.
//!
//! Turns the static port tables into allow-rules that can be merged into a
//! possibly pre-existing rule set. Rule names are deterministic per port
//! and direction, so a repeated run adds nothing and repeated merges never
//! collide on names or priorities.

use std::collections::HashSet;

use crate::providers::types::{RuleDirection, SecurityRule};

/// First priority assigned to synthesized rules.
pub const BASE_PRIORITY: u32 = 100;

/// Deterministic rule name for a port and direction.
#[must_use]
pub fn rule_name(port: u16, direction: RuleDirection) -> String {
    format!("AllowAnyCustom{port}{}", direction.as_str())
}

/// Computes the rules missing from `existing` for the given port lists.
///
/// New rules get strictly increasing priorities starting at
/// [`BASE_PRIORITY`], or just above the highest existing priority when the
/// group already holds rules in that range. Ports whose rule name is
/// already present are skipped, so the merge is idempotent.
#[must_use]
pub fn missing_rules(
    existing: &[SecurityRule],
    inbound_ports: &[u16],
    outbound_ports: &[u16],
) -> Vec<SecurityRule> {
    let existing_names: HashSet<&str> = existing.iter().map(|r| r.name.as_str()).collect();

    let mut next_priority = existing
        .iter()
        .map(|r| r.priority)
        .max()
        .map_or(BASE_PRIORITY, |max| max.max(BASE_PRIORITY - 1) + 1);

    let mut rules = Vec::new();
    let directions = [
        (RuleDirection::Inbound, inbound_ports),
        (RuleDirection::Outbound, outbound_ports),
    ];

    for (direction, ports) in directions {
        for &port in ports {
            let name = rule_name(port, direction);
            if existing_names.contains(name.as_str()) {
                continue;
            }
            rules.push(SecurityRule {
                name,
                direction,
                priority: next_priority,
                destination_port: port,
            });
            next_priority += 1;
        }
    }

    rules
}

/// Merges the missing rules into the existing set.
///
/// The existing rules are kept untouched; this never replaces a rule set,
/// only extends it.
#[must_use]
pub fn merged_rules(
    existing: &[SecurityRule],
    inbound_ports: &[u16],
    outbound_ports: &[u16],
) -> Vec<SecurityRule> {
    let mut merged = existing.to_vec();
    merged.extend(missing_rules(existing, inbound_ports, outbound_ports));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ports::{INBOUND_PORTS, OUTBOUND_PORTS};

    #[test]
    fn test_rule_names_are_deterministic() {
        assert_eq!(rule_name(25, RuleDirection::Inbound), "AllowAnyCustom25Inbound");
        assert_eq!(rule_name(53, RuleDirection::Outbound), "AllowAnyCustom53Outbound");
    }

    #[test]
    fn test_priorities_strictly_increase_from_base() {
        let rules = missing_rules(&[], INBOUND_PORTS, OUTBOUND_PORTS);
        assert_eq!(rules.len(), INBOUND_PORTS.len() + OUTBOUND_PORTS.len());
        assert_eq!(rules[0].priority, BASE_PRIORITY);
        for pair in rules.windows(2) {
            assert_eq!(pair[1].priority, pair[0].priority + 1);
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let first = merged_rules(&[], INBOUND_PORTS, OUTBOUND_PORTS);
        let second = merged_rules(&first, INBOUND_PORTS, OUTBOUND_PORTS);
        assert_eq!(first, second);

        let names: std::collections::HashSet<&str> =
            second.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names.len(), second.len(), "duplicate rule names");

        let priorities: std::collections::HashSet<u32> =
            second.iter().map(|r| r.priority).collect();
        assert_eq!(priorities.len(), second.len(), "priority collision");
    }

    #[test]
    fn test_merge_extends_preexisting_rules() {
        let preexisting = vec![SecurityRule {
            name: String::from("AllowSshFromBastion"),
            direction: RuleDirection::Inbound,
            priority: 150,
            destination_port: 22,
        }];

        let merged = merged_rules(&preexisting, &[80], &[]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "AllowSshFromBastion");
        // New rule lands above the highest existing priority.
        assert_eq!(merged[1].priority, 151);
    }

    #[test]
    fn test_existing_port_rule_is_skipped() {
        let first = missing_rules(&[], &[22, 80], &[]);
        let again = missing_rules(&first, &[22, 80, 443], &[]);
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].destination_port, 443);
    }
}
