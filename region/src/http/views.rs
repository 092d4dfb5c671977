//! JSON shapes of inventory records as the API and websocket feed expose them.
//!
//! Coded enumerations are sent as their stable integer code next to their name.

use core::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    address_space::RenderedStatistics,
    model::{
        AddressId, AddressRecord, Host, HostId, HostKind, Interface, InterfaceId,
        InterfaceKind, IpRange, IpRangeKind, RangeId, Subnet, SubnetId,
    },
    subnets::SubnetReport,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostView {
    pub id: HostId,
    pub hostname: String,
    pub status: u8,
    pub status_name: &'static str,
    pub kind: HostKind,
    pub owner: Option<String>,
}

impl From<&Host> for HostView {
    fn from(host: &Host) -> Self {
        Self {
            id: host.id,
            hostname: host.hostname.clone(),
            status: host.status.code(),
            status_name: host.status.name(),
            kind: host.kind,
            owner: host.owner.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubnetView {
    pub id: SubnetId,
    pub name: String,
    pub description: String,
    pub cidr: String,
    pub version: u8,
    pub vlan: Option<u16>,
    pub space: Option<String>,
    pub rdns_mode: u8,
    pub rdns_mode_name: &'static str,
    pub gateway_ip: Option<IpAddr>,
    pub managed: bool,
    pub allow_proxy: bool,
    pub active_discovery: bool,
    /// Space separated, sorted.
    pub dns_servers: String,
}

impl From<&Subnet> for SubnetView {
    fn from(subnet: &Subnet) -> Self {
        Self {
            id: subnet.id,
            name: subnet.name.clone(),
            description: subnet.description.clone(),
            cidr: subnet.cidr.to_string(),
            version: subnet.version(),
            vlan: subnet.vlan,
            space: subnet.space.clone(),
            rdns_mode: subnet.rdns_mode.code(),
            rdns_mode_name: subnet.rdns_mode.name(),
            gateway_ip: subnet.gateway_ip,
            managed: subnet.managed,
            allow_proxy: subnet.allow_proxy,
            active_discovery: subnet.active_discovery,
            dns_servers: subnet.dns_servers_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeView {
    pub id: RangeId,
    pub subnet_id: SubnetId,
    pub start_ip: IpAddr,
    pub end_ip: IpAddr,
    #[serde(rename = "type")]
    pub kind: IpRangeKind,
    pub comment: String,
}

impl From<&IpRange> for RangeView {
    fn from(range: &IpRange) -> Self {
        Self {
            id: range.id,
            subnet_id: range.subnet_id,
            start_ip: range.start,
            end_ip: range.end,
            kind: range.kind,
            comment: range.comment.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AddressView {
    pub id: AddressId,
    pub ip: IpAddr,
    pub subnet_id: SubnetId,
    pub alloc_type: u8,
    pub alloc_type_name: &'static str,
    pub interface_id: Option<InterfaceId>,
    pub mac: Option<String>,
    pub created: DateTime<Utc>,
}

impl From<&AddressRecord> for AddressView {
    fn from(record: &AddressRecord) -> Self {
        Self {
            id: record.id,
            ip: record.ip,
            subnet_id: record.subnet_id,
            alloc_type: record.kind.code(),
            alloc_type_name: record.kind.name(),
            interface_id: record.interface_id,
            mac: record.mac.clone(),
            created: record.created,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceView {
    pub id: InterfaceId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InterfaceKind,
    pub host_id: Option<HostId>,
    pub mac: Option<String>,
    pub subnet_id: Option<SubnetId>,
    pub link_up: bool,
}

impl From<&Interface> for InterfaceView {
    fn from(interface: &Interface) -> Self {
        Self {
            id: interface.id,
            name: interface.name.clone(),
            kind: interface.kind,
            host_id: interface.host_id,
            mac: interface.mac.clone(),
            subnet_id: interface.subnet_id,
            link_up: interface.link_up,
        }
    }
}

/// A subnet with its statistics; the detail view adds ranges and address records.
#[derive(Debug, Clone, Serialize)]
pub struct SubnetReportView {
    #[serde(flatten)]
    pub subnet: SubnetView,
    pub statistics: RenderedStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_ranges: Option<Vec<RangeView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_addresses: Option<Vec<AddressView>>,
}

impl SubnetReportView {
    pub fn summary(report: SubnetReport) -> Self {
        Self {
            subnet: SubnetView::from(&report.subnet),
            statistics: report.statistics,
            ip_ranges: None,
            ip_addresses: None,
        }
    }

    pub fn detail(report: SubnetReport) -> Self {
        Self {
            subnet: SubnetView::from(&report.subnet),
            ip_ranges: Some(report.ranges.iter().map(RangeView::from).collect()),
            ip_addresses: Some(report.addresses.iter().map(AddressView::from).collect()),
            statistics: report.statistics,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::{HostStatus, RdnsMode};

    #[test]
    fn host_status_is_sent_as_code_and_name() {
        let mut host = Host::new(3, "node03".to_owned(), HostKind::Machine);
        host.status = HostStatus::FailedDiskErasing;
        assert_eq!(
            serde_json::to_value(HostView::from(&host)).unwrap(),
            json!({
                "id": 3,
                "hostname": "node03",
                "status": 15,
                "status_name": "FAILED_DISK_ERASING",
                "kind": "machine",
                "owner": null,
            })
        );
    }

    #[test]
    fn subnet_codes_and_dns_servers() {
        let subnet = Subnet {
            id: 1,
            name: "lab".to_owned(),
            description: String::new(),
            cidr: "10.0.0.0/24".parse().unwrap(),
            vlan: Some(7),
            space: None,
            rdns_mode: RdnsMode::Enabled,
            gateway_ip: None,
            managed: true,
            allow_proxy: true,
            active_discovery: false,
            dns_servers: vec!["9.9.9.9".parse().unwrap(), "1.1.1.1".parse().unwrap()],
        };
        let value = serde_json::to_value(SubnetView::from(&subnet)).unwrap();
        assert_eq!(value["rdns_mode"], 1);
        assert_eq!(value["rdns_mode_name"], "ENABLED");
        assert_eq!(value["version"], 4);
        assert_eq!(value["dns_servers"], "1.1.1.1 9.9.9.9");
    }
}
