//! Address record registry: who may create which kind of record, and where.

use core::net::IpAddr;

use crate::{
    error::CoreError,
    inventory::{Inventory, Tables},
    model::{AddressRecord, AddressType, InterfaceId, SubnetId, same_family},
    permission::{Action, Principal, Target, authorize},
};

/// Who is asking for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// An operator, through the API.
    User,
    /// Discovery or lease observation.
    Observation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignRequest {
    pub ip: IpAddr,
    pub kind: AddressType,
    pub interface_id: Option<InterfaceId>,
    pub mac: Option<String>,
}

/// Validates `request` against `tables` and returns the subnet the record
/// belongs to. Performs no mutation.
///
/// # Errors
///
/// - [`CoreError::ForbiddenOrigin`] for discovered records not coming from observation
/// - [`CoreError::Validation`] when no subnet contains the address, or when it
///   is the network, broadcast or gateway address
/// - [`CoreError::Conflict`] for an already recorded address, or an auto and a
///   sticky address of one family on the same interface
/// - [`CoreError::NotFound`] for an unknown interface
pub fn check_assign(
    tables: &Tables,
    request: &AssignRequest,
    origin: Origin,
) -> Result<SubnetId, CoreError> {
    if request.kind == AddressType::Discovered && origin != Origin::Observation {
        return Err(CoreError::ForbiddenOrigin);
    }

    let ip = request.ip;
    let mut containing = tables.subnets_containing(ip);
    let Some(subnet) = containing.next() else {
        return Err(CoreError::validation(format!(
            "{ip} is not within any known subnet"
        )));
    };
    // Subnets never overlap, `Inventory::create_subnet` refuses any that would.
    debug_assert!(
        containing.next().is_none(),
        "{ip} is within more than one subnet"
    );
    if subnet.unusable_addresses().contains(&ip) {
        return Err(CoreError::validation(format!(
            "{ip} is a reserved address of {}",
            subnet.cidr
        )));
    }
    if subnet.gateway_ip == Some(ip) {
        return Err(CoreError::validation(format!(
            "{ip} is the gateway of {}",
            subnet.cidr
        )));
    }

    if let Some(existing) = tables.addresses.get(&ip) {
        return Err(CoreError::conflict(format!(
            "{ip} is already recorded as {}",
            existing.kind
        )));
    }

    if let Some(interface_id) = request.interface_id {
        if !tables.interfaces.contains_key(&interface_id) {
            return Err(CoreError::NotFound(format!("Interface {interface_id}")));
        }
        if request.kind.is_exclusive()
            && let Some(clash) = tables.addresses.values().find(|a| {
                a.interface_id == Some(interface_id)
                    && a.kind.is_exclusive()
                    && a.kind != request.kind
                    && same_family(a.ip, ip)
            })
        {
            return Err(CoreError::conflict(format!(
                "Interface {interface_id} already has {} address {}; {} and {} addresses of one family are exclusive",
                clash.kind, clash.ip, clash.kind, request.kind
            )));
        }
    }

    Ok(subnet.id)
}

/// Creates an address record on behalf of an operator.
///
/// # Errors
///
/// [`CoreError::PermissionDenied`] for non-admins, otherwise see [`check_assign`].
pub async fn assign(
    inventory: &Inventory,
    principal: Option<&Principal>,
    request: AssignRequest,
) -> Result<AddressRecord, CoreError> {
    authorize(principal, Action::AssignAddress, &Target::Address(request.ip))?;
    inventory.assign_address(request, Origin::User).await
}

/// Removes the record for `ip`; releasing an unrecorded address succeeds.
///
/// # Errors
///
/// [`CoreError::PermissionDenied`] for non-admins, or a storage failure.
pub async fn release(
    inventory: &Inventory,
    principal: Option<&Principal>,
    ip: IpAddr,
) -> Result<Option<AddressRecord>, CoreError> {
    authorize(principal, Action::ReleaseAddress, &Target::Address(ip))?;
    inventory.release_address(ip).await
}
