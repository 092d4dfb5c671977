use axum::{Json, extract::State};
use serde::Serialize;

use crate::{
    app::{AppState, RackState},
    error::CoreError,
    http::auth::Caller,
    permission::{Action, Target, authorize},
};

#[derive(Debug, Serialize)]
pub(super) struct RackView {
    name: String,
    ip: String,
    port: u16,
    /// `None` until the first status poll finished.
    state: Option<RackState>,
    /// CIDRs of the subnets the rack controller has an interface on.
    subnets: Vec<String>,
}

/// Configured rack agents with their last polled state.
pub(super) async fn list(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> Result<Json<Vec<RackView>>, CoreError> {
    authorize(principal.as_ref(), Action::ReadInventory, &Target::Inventory)?;

    let agents = state.config_rx.borrow().rack_agents();
    let status = state.rackstatus_rx.borrow().clone();
    let tables = state.inventory.snapshot();

    let racks = agents
        .into_iter()
        .map(|agent| {
            let subnets = tables
                .subnets
                .values()
                .filter(|subnet| tables.rack_hosts_on(subnet.id).contains(&agent.name))
                .map(|subnet| subnet.cidr.to_string())
                .collect();
            RackView {
                state: status.get(&agent.name).copied(),
                name: agent.name,
                ip: agent.ip,
                port: agent.port,
                subnets,
            }
        })
        .collect();
    Ok(Json(racks))
}
