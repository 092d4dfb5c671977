use core::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AddressId, InterfaceId, SubnetId};

define_coded_enum! {
    /// How an address record came to exist.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum AddressType {
        /// Picked by the allocator when the interface is configured.
        Auto = 0 => "AUTO",
        /// Pinned to the interface across redeployments.
        Sticky = 1 => "STICKY",
        UserReserved = 4 => "USER_RESERVED",
        /// Handed out by the DHCP server.
        Dhcp = 5 => "DHCP",
        /// Observed on the wire.
        Discovered = 6 => "DISCOVERED",
    }
}

impl AddressType {
    /// Auto and sticky addresses are mutually exclusive per interface and family.
    #[must_use]
    pub const fn is_exclusive(self) -> bool {
        matches!(self, Self::Auto | Self::Sticky)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub id: AddressId,
    pub ip: IpAddr,
    pub subnet_id: SubnetId,
    pub kind: AddressType,
    pub interface_id: Option<InterfaceId>,
    pub mac: Option<String>,
    pub created: DateTime<Utc>,
}

/// Durable record of an administrative action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action: String,
    pub subnet_id: SubnetId,
    pub cidr: String,
    pub detail: String,
}
