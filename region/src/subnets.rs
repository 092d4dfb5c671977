//! Subnet queries and administrative subnet operations.

use crate::{
    address_space::{RenderOptions, RenderedStatistics, StatisticsSettings},
    error::CoreError,
    inventory::{Inventory, NewRange, NewSubnet},
    model::{AddressRecord, IpRange, Subnet, SubnetId},
    permission::{Action, Principal, Target, authorize},
};

/// A subnet with its statistics and, for detail views, its address records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetReport {
    pub subnet: Subnet,
    pub ranges: Vec<IpRange>,
    pub statistics: RenderedStatistics,
    pub addresses: Vec<AddressRecord>,
}

/// Every subnet with summary statistics, ordered by id.
///
/// # Errors
///
/// [`CoreError::PermissionDenied`] for anonymous callers.
pub fn list_subnets(
    inventory: &Inventory,
    principal: Option<&Principal>,
    settings: StatisticsSettings,
) -> Result<Vec<SubnetReport>, CoreError> {
    authorize(principal, Action::ReadInventory, &Target::Inventory)?;
    let tables = inventory.snapshot();
    tables
        .subnets
        .values()
        .map(|subnet| {
            Ok(SubnetReport {
                subnet: subnet.clone(),
                ranges: tables.ranges_of(subnet.id).cloned().collect(),
                statistics: tables
                    .statistics(subnet.id, settings)?
                    .render(RenderOptions::default()),
                addresses: Vec::new(),
            })
        })
        .collect()
}

/// One subnet with full statistics and its address records.
///
/// # Errors
///
/// [`CoreError::PermissionDenied`] for anonymous callers, [`CoreError::NotFound`].
pub fn get_subnet(
    inventory: &Inventory,
    principal: Option<&Principal>,
    id: SubnetId,
    settings: StatisticsSettings,
) -> Result<SubnetReport, CoreError> {
    authorize(principal, Action::ReadInventory, &Target::Subnet(id))?;
    let tables = inventory.snapshot();
    let statistics = tables.statistics(id, settings)?.render(RenderOptions {
        include_ranges: true,
        include_suggestions: true,
    });
    let subnet = tables
        .subnets
        .get(&id)
        .cloned()
        .ok_or_else(|| CoreError::NotFound(format!("Subnet {id}")))?;
    Ok(SubnetReport {
        ranges: tables.ranges_of(id).cloned().collect(),
        addresses: tables.addresses_of(id).cloned().collect(),
        subnet,
        statistics,
    })
}

/// Statistics of one subnet with caller-selected detail.
///
/// # Errors
///
/// [`CoreError::PermissionDenied`] for anonymous callers, [`CoreError::NotFound`].
pub fn subnet_statistics(
    inventory: &Inventory,
    principal: Option<&Principal>,
    id: SubnetId,
    settings: StatisticsSettings,
    options: RenderOptions,
) -> Result<RenderedStatistics, CoreError> {
    authorize(principal, Action::ReadInventory, &Target::Subnet(id))?;
    Ok(inventory.snapshot().statistics(id, settings)?.render(options))
}

pub async fn create_subnet(
    inventory: &Inventory,
    principal: Option<&Principal>,
    new: NewSubnet,
) -> Result<Subnet, CoreError> {
    authorize(principal, Action::CreateSubnet, &Target::Inventory)?;
    inventory.create_subnet(new).await
}

/// Deletes a subnet with everything it owns.
///
/// # Errors
///
/// [`CoreError::PermissionDenied`] for non-admins, whether or not the subnet exists.
pub async fn delete_subnet(
    inventory: &Inventory,
    principal: Option<&Principal>,
    id: SubnetId,
) -> Result<Subnet, CoreError> {
    authorize(principal, Action::DeleteSubnet, &Target::Subnet(id))?;
    inventory.delete_subnet(id).await
}

pub async fn declare_range(
    inventory: &Inventory,
    principal: Option<&Principal>,
    new: NewRange,
) -> Result<IpRange, CoreError> {
    authorize(principal, Action::DeclareRange, &Target::Subnet(new.subnet_id))?;
    inventory.add_range(new).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{inventory::Tables, model::IpRangeKind};

    fn admin() -> Principal {
        Principal {
            name: "root".to_owned(),
            admin: true,
        }
    }

    #[tokio::test]
    async fn detail_includes_ranges_and_suggestions() {
        let inventory = Inventory::new(Tables::default(), None);
        let root = admin();
        let subnet = create_subnet(&inventory, Some(&root), NewSubnet::new("10.0.0.0/24".parse().unwrap()))
            .await
            .unwrap();
        declare_range(
            &inventory,
            Some(&root),
            NewRange {
                subnet_id: subnet.id,
                start: "10.0.0.100".parse().unwrap(),
                end: "10.0.0.199".parse().unwrap(),
                kind: IpRangeKind::Dynamic,
                comment: "pxe".to_owned(),
            },
        )
        .await
        .unwrap();

        let detail = get_subnet(&inventory, Some(&root), subnet.id, StatisticsSettings::default()).unwrap();
        assert_eq!(detail.statistics.num_dynamic, 100);
        assert!(detail.statistics.ranges.is_some(), "detail has segments");
        assert!(detail.statistics.suggested_dynamic_range.is_some(), "detail has suggestions");

        let list = list_subnets(&inventory, Some(&root), StatisticsSettings::default()).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].statistics.ranges, None, "summary has no segments");
        assert_eq!(list[0].statistics.num_available, 154);
    }

    #[tokio::test]
    async fn non_admin_delete_is_denied_even_for_missing_subnets() {
        let inventory = Inventory::new(Tables::default(), None);
        let user = Principal {
            name: "alice".to_owned(),
            admin: false,
        };
        for id in [1, 999] {
            let err = delete_subnet(&inventory, Some(&user), id).await.unwrap_err();
            assert!(matches!(err, CoreError::PermissionDenied), "{id}: {err:?}");
        }
        let err = get_subnet(&inventory, Some(&user), 999, StatisticsSettings::default()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)), "reads are allowed");
    }
}
