//! Host lifecycle state machine.
//!
//! [`next_status`] is the whole transition table. [`transition`] wraps it with
//! the permission check and an optimistic compare-and-set on the stored status,
//! so two concurrent events on one host never both apply.

use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::CoreError,
    inventory::Inventory,
    model::{Host, HostId, HostStatus},
    permission::{Action, Principal, Target, authorize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostEvent {
    Commission,
    CommissionSucceeded,
    CommissionFailed,
    Allocate,
    Deploy,
    DeploySucceeded,
    DeployFailed,
    Release,
    ReleaseSucceeded,
    ReleaseFailed,
    EraseDisks,
    EraseDisksSucceeded,
    EraseDisksFailed,
    MarkBroken,
    Retire,
    Reset,
}

impl HostEvent {
    pub const ALL: &'static [Self] = &[
        Self::Commission,
        Self::CommissionSucceeded,
        Self::CommissionFailed,
        Self::Allocate,
        Self::Deploy,
        Self::DeploySucceeded,
        Self::DeployFailed,
        Self::Release,
        Self::ReleaseSucceeded,
        Self::ReleaseFailed,
        Self::EraseDisks,
        Self::EraseDisksSucceeded,
        Self::EraseDisksFailed,
        Self::MarkBroken,
        Self::Retire,
        Self::Reset,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Commission => "commission",
            Self::CommissionSucceeded => "commission-succeeded",
            Self::CommissionFailed => "commission-failed",
            Self::Allocate => "allocate",
            Self::Deploy => "deploy",
            Self::DeploySucceeded => "deploy-succeeded",
            Self::DeployFailed => "deploy-failed",
            Self::Release => "release",
            Self::ReleaseSucceeded => "release-succeeded",
            Self::ReleaseFailed => "release-failed",
            Self::EraseDisks => "erase-disks",
            Self::EraseDisksSucceeded => "erase-disks-succeeded",
            Self::EraseDisksFailed => "erase-disks-failed",
            Self::MarkBroken => "mark-broken",
            Self::Retire => "retire",
            Self::Reset => "reset",
        }
    }

    /// Administrative overrides need the admin role; every other event is
    /// driven by the provisioning workflow.
    #[must_use]
    pub const fn is_override(self) -> bool {
        matches!(self, Self::MarkBroken | Self::Retire | Self::Reset)
    }
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostEvent {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| CoreError::validation(format!("Unknown host event '{s}'")))
    }
}

/// Looks up the single edge leaving `from` for `event`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidTransition`] when `from` has no such edge.
pub fn next_status(from: HostStatus, event: HostEvent) -> Result<HostStatus, CoreError> {
    use HostEvent as E;
    use HostStatus as S;

    let to = match (event, from) {
        (E::Commission, S::New | S::FailedCommissioning) => S::Commissioning,
        (E::CommissionSucceeded, S::Commissioning) => S::Ready,
        (E::CommissionFailed, S::Commissioning) => S::FailedCommissioning,
        (E::Allocate, S::Ready) => S::Allocated,
        (E::Deploy, S::Allocated | S::FailedDeployment) => S::Deploying,
        (E::DeploySucceeded, S::Deploying) => S::Deployed,
        (E::DeployFailed, S::Deploying) => S::FailedDeployment,
        (E::Release, S::Deployed | S::Allocated | S::FailedReleasing) => S::Releasing,
        (E::ReleaseSucceeded, S::Releasing) => S::Ready,
        (E::ReleaseFailed, S::Releasing) => S::FailedReleasing,
        (E::EraseDisks, S::Deployed | S::FailedDiskErasing) => S::DiskErasing,
        (E::EraseDisksSucceeded, S::DiskErasing) => S::Releasing,
        (E::EraseDisksFailed, S::DiskErasing) => S::FailedDiskErasing,
        (E::MarkBroken, other) if other != S::Broken => S::Broken,
        (E::Retire, other) if other != S::Retired => S::Retired,
        (E::Reset, S::Broken | S::Retired) => S::New,
        _ => {
            return Err(CoreError::InvalidTransition {
                from,
                event: event.as_str().to_owned(),
            });
        }
    };
    Ok(to)
}

/// Outcome of applying an event to a host, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransition {
    pub from: HostStatus,
    pub to: HostStatus,
    pub owner: Option<String>,
}

/// Computes the target status and owner for `event`.
///
/// `allocate` hands the host to `owner`; leaving the owned set clears it.
///
/// # Errors
///
/// See [`next_status`].
pub fn plan(host: &Host, event: HostEvent, owner: &str) -> Result<PlannedTransition, CoreError> {
    let to = next_status(host.status, event)?;
    let owner = if !to.is_owned() {
        None
    } else if event == HostEvent::Allocate {
        Some(owner.to_owned())
    } else {
        host.owner.clone()
    };
    Ok(PlannedTransition {
        from: host.status,
        to,
        owner,
    })
}

/// A transition request as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub event: HostEvent,
    /// Owner for `allocate`; defaults to the requesting user.
    pub owner: Option<String>,
    /// Status the caller last observed; a mismatch fails as a retryable conflict.
    pub expected_status: Option<HostStatus>,
}

/// Applies `request` to host `id` on behalf of `principal`.
///
/// # Errors
///
/// [`CoreError::PermissionDenied`] before anything else is looked at,
/// [`CoreError::NotFound`], [`CoreError::InvalidTransition`], or a retryable
/// [`CoreError::Conflict`] when the host changed status concurrently.
#[tracing::instrument(skip_all, fields(host_id = id, event = %request.event))]
pub async fn transition(
    inventory: &Inventory,
    principal: Option<&Principal>,
    id: HostId,
    request: TransitionRequest,
) -> Result<Host, CoreError> {
    let action = if request.event.is_override() {
        Action::OverrideHostStatus
    } else {
        Action::TransitionHost
    };
    let principal = authorize(principal, action, &Target::Host(id))?;

    let host = inventory
        .snapshot()
        .hosts
        .get(&id)
        .cloned()
        .ok_or_else(|| CoreError::NotFound(format!("Host {id}")))?;

    if let Some(expected) = request.expected_status
        && expected != host.status
    {
        return Err(CoreError::stale(format!(
            "Host {} is {} rather than {expected}",
            host.hostname, host.status
        )));
    }

    let owner = request.owner.as_deref().unwrap_or(&principal.name);
    let planned = plan(&host, request.event, owner)?;
    let updated = inventory.compare_and_set_status(id, &planned).await?;
    info!(
        "Host {} moved from {} to {} ({} by {})",
        updated.hostname, planned.from, planned.to, request.event, principal.name
    );
    Ok(updated)
}
