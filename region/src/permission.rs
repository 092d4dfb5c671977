//! Authorization predicate for every inventory operation.

use core::net::IpAddr;

use tracing::debug;

use crate::{
    error::CoreError,
    model::{HostId, InterfaceId, SubnetId},
};

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadInventory,
    TransitionHost,
    CreateSubnet,
    DeleteSubnet,
    ScanSubnet,
    DeclareRange,
    CreateHost,
    DeleteHost,
    CreateInterface,
    DeleteInterface,
    AssignAddress,
    ReleaseAddress,
    OverrideHostStatus,
    ReadAudit,
}

impl Action {
    #[must_use]
    pub const fn requires_admin(self) -> bool {
        !matches!(self, Self::ReadInventory | Self::TransitionHost)
    }
}

/// What an action is aimed at. Only used for diagnostics, never for the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Inventory,
    Subnet(SubnetId),
    Host(HostId),
    Interface(InterfaceId),
    Address(IpAddr),
}

/// Allows `action` on `target` for `principal`.
///
/// Every refusal is the same [`CoreError::PermissionDenied`], whether the caller
/// is anonymous, unknown, or lacks the admin role, and whether the target exists.
///
/// # Errors
///
/// Returns [`CoreError::PermissionDenied`] when the caller may not perform `action`.
pub fn authorize<'p>(
    principal: Option<&'p Principal>,
    action: Action,
    target: &Target,
) -> Result<&'p Principal, CoreError> {
    match principal {
        Some(p) if p.admin || !action.requires_admin() => Ok(p),
        _ => {
            debug!(
                user = principal.map(|p| p.name.as_str()),
                ?action,
                ?target,
                "Denied"
            );
            Err(CoreError::PermissionDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_may_do_everything() {
        let admin = Principal {
            name: "root".to_owned(),
            admin: true,
        };
        for action in [Action::ScanSubnet, Action::DeleteSubnet, Action::ReadInventory] {
            assert!(authorize(Some(&admin), action, &Target::Inventory).is_ok(), "{action:?}");
        }
    }

    #[test]
    fn denial_is_uniform() {
        let user = Principal {
            name: "alice".to_owned(),
            admin: false,
        };
        assert!(authorize(Some(&user), Action::ReadInventory, &Target::Inventory).is_ok(), "read");
        assert!(authorize(Some(&user), Action::TransitionHost, &Target::Host(1)).is_ok(), "self-service");

        let denials = [
            authorize(Some(&user), Action::ScanSubnet, &Target::Subnet(1)),
            authorize(Some(&user), Action::DeleteSubnet, &Target::Subnet(999)),
            authorize(Some(&user), Action::OverrideHostStatus, &Target::Host(1)),
            authorize(None, Action::ReadInventory, &Target::Inventory),
        ];
        for denial in denials {
            let err = denial.unwrap_err();
            assert!(matches!(err, CoreError::PermissionDenied), "{err:?}");
            assert_eq!(err.to_string(), crate::error::PERMISSION_DENIED_MESSAGE);
        }
    }
}
