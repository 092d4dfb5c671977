//! Fans a scan out to every rack agent on a subnet and gathers what comes back.

use core::time::Duration;
use std::collections::BTreeMap;

use futures::{StreamExt as _, stream::FuturesUnordered};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{error, info, warn};

use super::{
    rpc::{RackAgent, RackCallError, RackClient},
    summary::{ScanSummary, summarize},
};
use crate::{
    error::CoreError,
    inventory::Inventory,
    model::SubnetId,
    permission::{Action, Principal, Target, authorize},
};

/// Time limits for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Bound on each individual agent call.
    pub agent_timeout: Duration,
    /// Bound on the scan as a whole; agents still outstanding count as unreachable.
    pub scan_timeout: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(10),
            scan_timeout: Duration::from_secs(30),
        }
    }
}

/// Runs an active discovery scan of `subnet_id` on the rack agents attached to it.
///
/// `directory` lists the agents the region knows how to reach. Agent failures
/// never fail the call; they're reported in the summary.
///
/// # Errors
///
/// - [`CoreError::PermissionDenied`] for non-admins
/// - [`CoreError::NotFound`] for unknown subnets
/// - [`CoreError::UnsupportedFamily`] for IPv6 subnets
/// - [`CoreError::NoAgentAvailable`] when no reachable rack has a live interface on the subnet
///
/// None of these issue an agent call or write an audit entry.
#[tracing::instrument(skip(inventory, client, directory, settings, principal))]
pub async fn scan_subnet<C: RackClient>(
    inventory: &Inventory,
    client: &C,
    directory: &[RackAgent],
    settings: ScanSettings,
    principal: Option<&Principal>,
    subnet_id: SubnetId,
) -> Result<ScanSummary, CoreError> {
    let principal = authorize(principal, Action::ScanSubnet, &Target::Subnet(subnet_id))?;

    let tables = inventory.snapshot();
    let subnet = tables
        .subnets
        .get(&subnet_id)
        .cloned()
        .ok_or_else(|| CoreError::NotFound(format!("Subnet {subnet_id}")))?;
    if subnet.version() != 4 {
        return Err(CoreError::UnsupportedFamily);
    }

    let attached = tables.rack_hosts_on(subnet_id);
    let agents: Vec<&RackAgent> = directory
        .iter()
        .filter(|agent| attached.contains(&agent.name))
        .collect();
    for name in &attached {
        if !agents.iter().any(|agent| &agent.name == name) {
            warn!("Rack controller '{name}' is attached to {} but not configured; skipping", subnet.cidr);
        }
    }
    if agents.is_empty() {
        return Err(CoreError::NoAgentAvailable);
    }

    let rack_names: Vec<&str> = agents.iter().map(|agent| agent.name.as_str()).collect();
    inventory
        .record_audit(
            &principal.name,
            "scan",
            &subnet,
            format!("Scan dispatched to {}", rack_names.join(", ")),
        )
        .await?;
    info!(
        "User {} started active discovery scan of {}",
        principal.name, subnet.cidr
    );

    let cidrs = [subnet.cidr];
    let deadline = Instant::now() + settings.scan_timeout;
    let mut pending: FuturesUnordered<_> = agents
        .iter()
        .map(|&agent| async move {
            let outcome = match timeout(
                settings.agent_timeout,
                client.scan(agent, &cidrs, settings.agent_timeout),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_elapsed) => Err(RackCallError::Timeout(settings.agent_timeout)),
            };
            (agent.name.clone(), outcome)
        })
        .collect();

    let mut outcomes = BTreeMap::new();
    loop {
        match timeout_at(deadline, pending.next()).await {
            Ok(Some((name, outcome))) => {
                if let Err(ref e) = outcome {
                    warn!("Rack controller '{name}' failed to scan {}: {e}", subnet.cidr);
                }
                outcomes.insert(name, outcome);
            }
            Ok(None) => break,
            Err(_elapsed) => {
                warn!(
                    "Scan of {} hit its overall limit of {:?} with {} agent(s) outstanding",
                    subnet.cidr,
                    settings.scan_timeout,
                    pending.len()
                );
                break;
            }
        }
    }
    // Cancels whatever is still in flight.
    drop(pending);
    for agent in &agents {
        outcomes
            .entry(agent.name.clone())
            .or_insert(Err(RackCallError::Timeout(settings.scan_timeout)));
    }

    let summary = summarize(&subnet, outcomes, &inventory.snapshot());

    let seen = summary.neighbours().map(|n| (n.ip, n.mac.as_str()));
    if let Err(e) = inventory.observe_all(seen).await {
        error!("Failed to record addresses discovered on {}: {e}", subnet.cidr);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::collections::HashMap;

    use ipnet::IpNet;
    use metalfleet_common::Discovery;
    use secrecy::SecretString;

    use super::*;
    use crate::{
        inventory::{NewInterface, NewSubnet, Tables},
        model::{AddressType, InterfaceKind},
    };

    enum Script {
        Answer(Vec<Discovery>),
        Fail(&'static str),
        Hang,
    }

    #[derive(Default)]
    struct FakeRacks {
        scripts: HashMap<String, Script>,
        calls: AtomicUsize,
    }

    impl FakeRacks {
        fn with(mut self, name: &str, script: Script) -> Self {
            self.scripts.insert(name.to_owned(), script);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RackClient for FakeRacks {
        async fn scan(
            &self,
            rack: &RackAgent,
            _cidrs: &[IpNet],
            _timeout: Duration,
        ) -> Result<Vec<Discovery>, RackCallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.scripts.get(&rack.name) {
                Some(&Script::Answer(ref found)) => Ok(found.clone()),
                Some(&Script::Fail(reason)) => Err(RackCallError::Agent(reason.to_owned())),
                Some(&Script::Hang) | None => core::future::pending().await,
            }
        }

        async fn status(&self, _rack: &RackAgent, _timeout: Duration) -> Result<(), RackCallError> {
            Ok(())
        }
    }

    fn agent(name: &str) -> RackAgent {
        RackAgent {
            name: name.to_owned(),
            ip: "127.0.0.1".to_owned(),
            port: 0,
            shared_secret: Arc::new(SecretString::from("secret")),
        }
    }

    fn seen(mac: &str, ip: &str) -> Discovery {
        Discovery {
            mac: mac.to_owned(),
            ip: ip.to_owned(),
            observed_at: 1_700_000_000,
        }
    }

    fn root() -> Principal {
        Principal {
            name: "root".to_owned(),
            admin: true,
        }
    }

    const FAST: ScanSettings = ScanSettings {
        agent_timeout: Duration::from_millis(200),
        scan_timeout: Duration::from_secs(5),
    };

    /// A subnet with the given racks attached through live interfaces.
    async fn inventory_with_racks(cidr: &str, racks: &[&str]) -> (Arc<Inventory>, SubnetId) {
        let inventory = Inventory::new(Tables::default(), None);
        let subnet = inventory
            .create_subnet(NewSubnet::new(cidr.parse().unwrap()))
            .await
            .unwrap();
        for host in inventory.ensure_rack_hosts(racks.iter().copied()).await.unwrap() {
            inventory
                .create_interface(NewInterface {
                    name: "eth0".to_owned(),
                    kind: InterfaceKind::Physical,
                    host_id: Some(host.id),
                    mac: None,
                    subnet_id: Some(subnet.id),
                    link_up: true,
                })
                .await
                .unwrap();
        }
        (inventory, subnet.id)
    }

    #[tokio::test]
    async fn partial_failure_still_succeeds() {
        let (inventory, subnet_id) = inventory_with_racks("10.0.0.0/24", &["rack1", "rack2", "rack3"]).await;
        let client = FakeRacks::default()
            .with("rack1", Script::Answer(vec![seen("aa:bb:cc:dd:ee:01", "10.0.0.5")]))
            .with("rack2", Script::Answer(vec![seen("aa:bb:cc:dd:ee:02", "10.0.0.6")]))
            .with("rack3", Script::Hang);
        let directory = [agent("rack1"), agent("rack2"), agent("rack3")];

        let summary = scan_subnet(&inventory, &client, &directory, FAST, Some(&root()), subnet_id)
            .await
            .unwrap();
        assert_eq!(client.calls(), 3);
        assert_eq!(summary.scan_started_on, vec!["rack1", "rack2"]);
        assert_eq!(summary.scan_failed_on.len(), 1);
        assert_eq!(summary.scan_failed_on[0].rack, "rack3");
        assert_eq!(summary.scan_failed_on[0].reason, "unreachable");
        assert_eq!(summary.neighbours().count(), 2);

        let audit = inventory.audit_entries().await.unwrap();
        assert_eq!(audit.len(), 1, "audited once");
        assert_eq!(audit[0].user, "root");
        assert_eq!(audit[0].cidr, "10.0.0.0/24");
        let tables = inventory.snapshot();
        let observed: Vec<_> = tables.addresses.values().map(|a| a.kind).collect();
        assert_eq!(observed, vec![AddressType::Discovered; 2], "discoveries are recorded");
    }

    #[tokio::test]
    async fn agent_error_text_is_reported() {
        let (inventory, subnet_id) = inventory_with_racks("10.0.0.0/24", &["rack1"]).await;
        let client = FakeRacks::default().with("rack1", Script::Fail("Timestamp out of range"));
        let summary = scan_subnet(&inventory, &client, &[agent("rack1")], FAST, Some(&root()), subnet_id)
            .await
            .unwrap();
        assert_eq!(summary.scan_failed_on[0].reason, "Timestamp out of range");
        assert!(summary.result.starts_with("Unable to scan"), "{}", summary.result);
    }

    #[tokio::test]
    async fn overall_deadline_cuts_off_slow_agents() {
        let (inventory, subnet_id) = inventory_with_racks("10.0.0.0/24", &["rack1", "rack2"]).await;
        let client = FakeRacks::default()
            .with("rack1", Script::Answer(Vec::new()))
            .with("rack2", Script::Hang);
        let settings = ScanSettings {
            agent_timeout: Duration::from_secs(60),
            scan_timeout: Duration::from_millis(300),
        };
        let started = Instant::now();
        let summary = scan_subnet(
            &inventory,
            &client,
            &[agent("rack1"), agent("rack2")],
            settings,
            Some(&root()),
            subnet_id,
        )
        .await
        .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5), "did not wait for the agent timeout");
        assert_eq!(summary.scan_started_on, vec!["rack1"]);
        assert_eq!(summary.scan_failed_on[0].reason, "unreachable");
    }

    #[tokio::test]
    async fn rejected_scans_have_no_side_effects() {
        let client = FakeRacks::default().with("rack1", Script::Answer(Vec::new()));
        let directory = [agent("rack1")];

        let (inventory, subnet_id) = inventory_with_racks("10.0.0.0/24", &["rack1"]).await;
        let user = Principal {
            name: "alice".to_owned(),
            admin: false,
        };
        let err = scan_subnet(&inventory, &client, &directory, FAST, Some(&user), subnet_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied), "{err:?}");

        let (v6, v6_id) = inventory_with_racks("2001:db8::/64", &["rack1"]).await;
        let err = scan_subnet(&v6, &client, &directory, FAST, Some(&root()), v6_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedFamily), "{err:?}");
        assert_eq!(err.to_string(), "Only IPv4 scanning is supported");

        let (lonely, lonely_id) = inventory_with_racks("10.1.0.0/24", &[]).await;
        let err = scan_subnet(&lonely, &client, &directory, FAST, Some(&root()), lonely_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoAgentAvailable), "{err:?}");

        let (unconfigured, unconfigured_id) = inventory_with_racks("10.2.0.0/24", &["rack9"]).await;
        let err = scan_subnet(&unconfigured, &client, &directory, FAST, Some(&root()), unconfigured_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoAgentAvailable), "unreachable racks don't count");

        assert_eq!(client.calls(), 0, "no agent was contacted");
        for rejected in [&inventory, &v6, &lonely, &unconfigured] {
            assert!(rejected.audit_entries().await.unwrap().is_empty(), "nothing audited");
        }
    }
}
