use core::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use super::{HostId, InterfaceId, RangeId, SubnetId};
use crate::error::CoreError;

define_coded_enum! {
    /// How reverse DNS is published for a subnet.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum RdnsMode {
        Disabled = 0 => "DISABLED",
        Enabled = 1 => "ENABLED",
        /// Classless delegation glue.
        #[default]
        Rfc2317 = 2 => "RFC2317",
    }
}

define_coded_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum IpRangeKind {
        Dynamic = 0 => "DYNAMIC",
        Reserved = 1 => "RESERVED",
    }
}

define_coded_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum InterfaceKind {
        Physical = 0 => "PHYSICAL",
        Bond = 1 => "BOND",
        Bridge = 2 => "BRIDGE",
        Vlan = 3 => "VLAN",
        Alias = 4 => "ALIAS",
        Unknown = 5 => "UNKNOWN",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    pub id: SubnetId,
    pub name: String,
    pub description: String,
    pub cidr: IpNet,
    /// VLAN id; `None` for the untagged network.
    pub vlan: Option<u16>,
    pub space: Option<String>,
    pub rdns_mode: RdnsMode,
    pub gateway_ip: Option<IpAddr>,
    pub managed: bool,
    pub allow_proxy: bool,
    pub active_discovery: bool,
    pub dns_servers: Vec<IpAddr>,
}

impl Subnet {
    #[must_use]
    pub const fn version(&self) -> u8 {
        match self.cidr {
            IpNet::V4(_) => 4,
            IpNet::V6(_) => 6,
        }
    }

    /// DNS servers as a sorted, space separated list.
    #[must_use]
    pub fn dns_servers_string(&self) -> String {
        let mut servers = self.dns_servers.clone();
        servers.sort_unstable();
        servers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Addresses that can never be handed out: the network address and, for
    /// IPv4 networks larger than /31, the broadcast address.
    #[must_use]
    pub fn unusable_addresses(&self) -> Vec<IpAddr> {
        unusable_addresses(self.cidr)
    }

    /// Checks the invariants a subnet must hold before it's stored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] naming the first violated rule.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cidr.addr() != self.cidr.network() {
            return Err(CoreError::validation(format!(
                "CIDR {} has host bits set; did you mean {}?",
                self.cidr,
                self.cidr.trunc()
            )));
        }
        if matches!(self.cidr, IpNet::V6(_)) && self.cidr.prefix_len() == 0 {
            return Err(CoreError::validation(
                "The IPv6 default route ::/0 can't be managed as a subnet",
            ));
        }
        if let Some(gateway) = self.gateway_ip {
            if !self.cidr.contains(&gateway) {
                return Err(CoreError::validation(format!(
                    "Gateway {gateway} is not within {}",
                    self.cidr
                )));
            }
            if self.unusable_addresses().contains(&gateway) {
                return Err(CoreError::validation(format!(
                    "Gateway {gateway} is not a host address of {}",
                    self.cidr
                )));
            }
        }
        Ok(())
    }
}

/// See [`Subnet::unusable_addresses`].
#[must_use]
pub fn unusable_addresses(cidr: IpNet) -> Vec<IpAddr> {
    match cidr {
        IpNet::V4(net) if net.prefix_len() < 31 => {
            vec![IpAddr::V4(net.network()), IpAddr::V4(net.broadcast())]
        }
        // Subnet-router anycast address.
        IpNet::V6(net) if net.prefix_len() < 127 => vec![IpAddr::V6(net.network())],
        IpNet::V4(_) | IpNet::V6(_) => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRange {
    pub id: RangeId,
    pub subnet_id: SubnetId,
    pub start: IpAddr,
    /// Inclusive.
    pub end: IpAddr,
    pub kind: IpRangeKind,
    pub comment: String,
}

impl IpRange {
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        same_family(self.start, ip) && self.start <= ip && ip <= self.end
    }

    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        same_family(self.start, other.start) && self.start <= other.end && other.start <= self.end
    }

    /// Checks bounds against the owning subnet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for mixed families, reversed bounds or
    /// bounds outside `cidr`.
    pub fn validate_within(&self, cidr: IpNet) -> Result<(), CoreError> {
        if !same_family(self.start, self.end) || !same_family(self.start, cidr.addr()) {
            return Err(CoreError::validation(
                "Range bounds must be of the subnet's address family",
            ));
        }
        if self.start > self.end {
            return Err(CoreError::validation(format!(
                "Range start {} is after its end {}",
                self.start, self.end
            )));
        }
        if !cidr.contains(&self.start) || !cidr.contains(&self.end) {
            return Err(CoreError::validation(format!(
                "Range {}-{} is not within {cidr}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub id: InterfaceId,
    pub name: String,
    pub kind: InterfaceKind,
    /// `None` for interfaces not linked to any host.
    pub host_id: Option<HostId>,
    pub mac: Option<String>,
    pub subnet_id: Option<SubnetId>,
    pub link_up: bool,
}

#[must_use]
pub const fn same_family(a: IpAddr, b: IpAddr) -> bool {
    matches!((a, b), (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)))
}
