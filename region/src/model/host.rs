use serde::{Deserialize, Serialize};

use super::HostId;

define_coded_enum! {
    /// Lifecycle status of a managed host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum HostStatus {
        New = 0 => "NEW",
        Commissioning = 1 => "COMMISSIONING",
        FailedCommissioning = 2 => "FAILED_COMMISSIONING",
        /// The host stopped answering.
        Missing = 3 => "MISSING",
        Ready = 4 => "READY",
        /// Reserved outside the normal allocation flow.
        Reserved = 5 => "RESERVED",
        Deployed = 6 => "DEPLOYED",
        Retired = 7 => "RETIRED",
        Broken = 8 => "BROKEN",
        Deploying = 9 => "DEPLOYING",
        Allocated = 10 => "ALLOCATED",
        FailedDeployment = 11 => "FAILED_DEPLOYMENT",
        Releasing = 12 => "RELEASING",
        FailedReleasing = 13 => "FAILED_RELEASING",
        DiskErasing = 14 => "DISK_ERASING",
        FailedDiskErasing = 15 => "FAILED_DISK_ERASING",
    }
}

impl HostStatus {
    /// Status every host starts in.
    pub const DEFAULT: Self = Self::New;

    /// Whether a host in this status has an owner.
    #[must_use]
    pub const fn is_owned(self) -> bool {
        matches!(
            self,
            Self::Allocated
                | Self::Deploying
                | Self::Deployed
                | Self::FailedDeployment
                | Self::Releasing
                | Self::FailedReleasing
                | Self::DiskErasing
                | Self::FailedDiskErasing
        )
    }
}

define_coded_enum! {
    /// What kind of node a host is.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum HostKind {
        Machine = 0 => "MACHINE",
        Device = 1 => "DEVICE",
        RackController = 2 => "RACK_CONTROLLER",
        RegionController = 3 => "REGION_CONTROLLER",
        RegionAndRackController = 4 => "REGION_AND_RACK_CONTROLLER",
    }
}

impl HostKind {
    #[must_use]
    pub const fn is_rack_controller(self) -> bool {
        matches!(self, Self::RackController | Self::RegionAndRackController)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub id: HostId,
    pub hostname: String,
    pub status: HostStatus,
    pub kind: HostKind,
    /// Only set while `status.is_owned()`.
    pub owner: Option<String>,
}

impl Host {
    #[must_use]
    pub const fn new(id: HostId, hostname: String, kind: HostKind) -> Self {
        Self {
            id,
            hostname,
            status: HostStatus::DEFAULT,
            kind,
            owner: None,
        }
    }
}
