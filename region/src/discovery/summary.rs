//! Turns raw per-agent scan outcomes into the user-facing summary.

use core::net::IpAddr;
use std::collections::{BTreeMap, BTreeSet};

use ipnet::IpNet;
use serde::Serialize;
use tracing::debug;

use metalfleet_common::Discovery;

use super::rpc::RackCallError;
use crate::{
    inventory::Tables,
    model::{Subnet, SubnetId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub rack: String,
    pub reason: String,
}

/// One (MAC, IP) pair, merged across every agent that reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredNeighbour {
    pub ip: IpAddr,
    pub mac: String,
    /// Latest observation, unix seconds.
    pub last_seen: u64,
    pub seen_by: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub subnet: SubnetId,
    pub cidr: IpNet,
    /// Agents that answered.
    pub scan_started_on: Vec<String>,
    pub scan_failed_on: Vec<ScanFailure>,
    /// Keyed by the CIDR of the most specific known subnet containing each address.
    pub discoveries: BTreeMap<String, Vec<DiscoveredNeighbour>>,
    pub result: String,
}

impl ScanSummary {
    pub fn neighbours(&self) -> impl Iterator<Item = &DiscoveredNeighbour> {
        self.discoveries.values().flatten()
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn result_message(cidr: IpNet, answered: usize, failed: usize, found: usize) -> String {
    let total = answered + failed;
    match (answered, failed) {
        (0, _) => format!(
            "Unable to scan {cidr}: none of the {} responded.",
            plural(total, "rack controller")
        ),
        (_, 0) => format!(
            "Active discovery of {cidr} completed on {}. Found {}.",
            plural(answered, "rack controller"),
            plural(found, "neighbour")
        ),
        _ => format!(
            "Active discovery of {cidr} completed on {answered} of {}; {failed} failed to respond. Found {}.",
            plural(total, "rack controller"),
            plural(found, "neighbour")
        ),
    }
}

/// Builds the summary from each agent's outcome.
///
/// Pairs are de-duplicated on (lower-cased MAC, IP), keeping the latest
/// timestamp. Entries whose IP doesn't parse are dropped.
pub fn summarize(
    subnet: &Subnet,
    outcomes: BTreeMap<String, Result<Vec<Discovery>, RackCallError>>,
    tables: &Tables,
) -> ScanSummary {
    let mut scan_started_on = Vec::new();
    let mut scan_failed_on = Vec::new();
    let mut merged: BTreeMap<(IpAddr, String), DiscoveredNeighbour> = BTreeMap::new();

    for (rack, outcome) in outcomes {
        let discoveries = match outcome {
            Ok(discoveries) => discoveries,
            Err(e) => {
                scan_failed_on.push(ScanFailure {
                    rack,
                    reason: e.reason(),
                });
                continue;
            }
        };
        for discovery in discoveries {
            let Ok(ip) = discovery.ip.parse::<IpAddr>() else {
                debug!("Dropping discovery with invalid IP '{}' from {rack}", discovery.ip);
                continue;
            };
            let mac = discovery.mac.to_ascii_lowercase();
            let entry = merged
                .entry((ip, mac.clone()))
                .or_insert_with(|| DiscoveredNeighbour {
                    ip,
                    mac,
                    last_seen: discovery.observed_at,
                    seen_by: BTreeSet::new(),
                });
            entry.last_seen = entry.last_seen.max(discovery.observed_at);
            entry.seen_by.insert(rack.clone());
        }
        scan_started_on.push(rack);
    }

    let found = merged.len();
    let mut discoveries: BTreeMap<String, Vec<DiscoveredNeighbour>> = BTreeMap::new();
    for neighbour in merged.into_values() {
        let group = tables
            .longest_match(neighbour.ip)
            .map_or(subnet.cidr, |s| s.cidr);
        discoveries
            .entry(group.to_string())
            .or_default()
            .push(neighbour);
    }

    ScanSummary {
        subnet: subnet.id,
        cidr: subnet.cidr,
        result: result_message(subnet.cidr, scan_started_on.len(), scan_failed_on.len(), found),
        scan_started_on,
        scan_failed_on,
        discoveries,
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::*;
    use crate::model::RdnsMode;

    fn subnet(id: SubnetId, cidr: &str) -> Subnet {
        Subnet {
            id,
            name: cidr.to_owned(),
            description: String::new(),
            cidr: cidr.parse().unwrap(),
            vlan: None,
            space: None,
            rdns_mode: RdnsMode::default(),
            gateway_ip: None,
            managed: true,
            allow_proxy: true,
            active_discovery: false,
            dns_servers: Vec::new(),
        }
    }

    fn seen(mac: &str, ip: &str, at: u64) -> Discovery {
        Discovery {
            mac: mac.to_owned(),
            ip: ip.to_owned(),
            observed_at: at,
        }
    }

    #[test]
    fn pairs_are_merged_across_agents() {
        let scanned = subnet(1, "10.0.0.0/24");
        let mut tables = Tables::default();
        tables.subnets.insert(1, scanned.clone());
        tables.subnets.insert(2, subnet(2, "10.0.1.0/24"));

        let outcomes = BTreeMap::from([
            (
                "rack1".to_owned(),
                Ok(vec![
                    seen("AA:BB:CC:DD:EE:01", "10.0.0.5", 100),
                    seen("aa:bb:cc:dd:ee:02", "10.0.1.7", 100),
                    seen("aa:bb:cc:dd:ee:03", "not-an-ip", 100),
                ]),
            ),
            (
                "rack2".to_owned(),
                Ok(vec![
                    seen("aa:bb:cc:dd:ee:01", "10.0.0.5", 250),
                    seen("aa:bb:cc:dd:ee:04", "192.168.9.9", 90),
                ]),
            ),
            (
                "rack3".to_owned(),
                Err(RackCallError::Timeout(Duration::from_secs(1))),
            ),
        ]);

        let summary = summarize(&scanned, outcomes, &tables);
        assert_eq!(summary.scan_started_on, vec!["rack1", "rack2"]);
        assert_eq!(
            summary.scan_failed_on,
            vec![ScanFailure {
                rack: "rack3".to_owned(),
                reason: "unreachable".to_owned()
            }]
        );
        assert_eq!(summary.neighbours().count(), 3);

        let local = &summary.discoveries["10.0.0.0/24"];
        let merged = local.iter().find(|n| n.mac == "aa:bb:cc:dd:ee:01").unwrap();
        assert_eq!(merged.last_seen, 250, "latest observation wins");
        assert_eq!(merged.seen_by.len(), 2);
        assert_eq!(summary.discoveries["10.0.1.0/24"].len(), 1, "grouped by known subnet");
        assert!(
            local.iter().any(|n| n.ip.to_string() == "192.168.9.9"),
            "unknown addresses fall back to the scanned CIDR"
        );
        assert_eq!(
            summary.result,
            "Active discovery of 10.0.0.0/24 completed on 2 of 3 rack controllers; 1 failed to respond. Found 3 neighbours."
        );
    }

    #[test]
    fn result_message_covers_all_outcomes() {
        let cidr: IpNet = "10.0.0.0/24".parse().unwrap();
        assert_eq!(
            result_message(cidr, 1, 0, 1),
            "Active discovery of 10.0.0.0/24 completed on 1 rack controller. Found 1 neighbour."
        );
        assert_eq!(
            result_message(cidr, 0, 2, 0),
            "Unable to scan 10.0.0.0/24: none of the 2 rack controllers responded."
        );
    }
}
