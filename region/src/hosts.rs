//! Host and interface administration, plus the audit log read.

use crate::{
    error::CoreError,
    inventory::{Inventory, NewInterface},
    model::{AuditEntry, Host, HostId, HostKind, Interface, InterfaceId},
    permission::{Action, Principal, Target, authorize},
};

/// Every host, ordered by id.
///
/// # Errors
///
/// [`CoreError::PermissionDenied`] for anonymous callers.
pub fn list_hosts(inventory: &Inventory, principal: Option<&Principal>) -> Result<Vec<Host>, CoreError> {
    authorize(principal, Action::ReadInventory, &Target::Inventory)?;
    Ok(inventory.snapshot().hosts.values().cloned().collect())
}

pub fn get_host(
    inventory: &Inventory,
    principal: Option<&Principal>,
    id: HostId,
) -> Result<Host, CoreError> {
    authorize(principal, Action::ReadInventory, &Target::Host(id))?;
    inventory
        .snapshot()
        .hosts
        .get(&id)
        .cloned()
        .ok_or_else(|| CoreError::NotFound(format!("Host {id}")))
}

/// Registers a new host in status NEW.
///
/// # Errors
///
/// [`CoreError::PermissionDenied`] for non-admins, [`CoreError::Validation`] for
/// an empty hostname, [`CoreError::Conflict`] for a taken one.
pub async fn create_host(
    inventory: &Inventory,
    principal: Option<&Principal>,
    hostname: &str,
    kind: HostKind,
) -> Result<Host, CoreError> {
    authorize(principal, Action::CreateHost, &Target::Inventory)?;
    inventory.create_host(hostname, kind).await
}

pub async fn delete_host(
    inventory: &Inventory,
    principal: Option<&Principal>,
    id: HostId,
) -> Result<Host, CoreError> {
    authorize(principal, Action::DeleteHost, &Target::Host(id))?;
    inventory.delete_host(id).await
}

pub async fn create_interface(
    inventory: &Inventory,
    principal: Option<&Principal>,
    new: NewInterface,
) -> Result<Interface, CoreError> {
    authorize(principal, Action::CreateInterface, &Target::Inventory)?;
    inventory.create_interface(new).await
}

/// Deletes an interface together with the address records assigned to it.
pub async fn delete_interface(
    inventory: &Inventory,
    principal: Option<&Principal>,
    id: InterfaceId,
) -> Result<Interface, CoreError> {
    authorize(principal, Action::DeleteInterface, &Target::Interface(id))?;
    inventory.delete_interface(id).await
}

/// The audit log, oldest first.
///
/// # Errors
///
/// [`CoreError::PermissionDenied`] for non-admins, or a storage failure.
pub async fn audit_log(
    inventory: &Inventory,
    principal: Option<&Principal>,
) -> Result<Vec<AuditEntry>, CoreError> {
    authorize(principal, Action::ReadAudit, &Target::Inventory)?;
    inventory.audit_entries().await
}
