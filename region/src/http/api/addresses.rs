use core::net::IpAddr;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    app::AppState,
    error::CoreError,
    http::{
        auth::Caller,
        extract::{JsonBody, PathParam},
        views::AddressView,
    },
    ipam::{self, AssignRequest},
    model::{AddressType, InterfaceId},
};

#[derive(Debug, Deserialize)]
pub(super) struct AssignBody {
    ip: IpAddr,
    alloc_type: AddressType,
    interface_id: Option<InterfaceId>,
    mac: Option<String>,
}

pub(super) async fn assign(
    State(state): State<AppState>,
    Caller(principal): Caller,
    JsonBody(body): JsonBody<AssignBody>,
) -> Result<impl IntoResponse, CoreError> {
    let request = AssignRequest {
        ip: body.ip,
        kind: body.alloc_type,
        interface_id: body.interface_id,
        mac: body.mac,
    };
    let record = ipam::assign(&state.inventory, principal.as_ref(), request).await?;
    Ok((StatusCode::CREATED, Json(AddressView::from(&record))))
}

/// Releasing an address that has no record is not an error.
pub(super) async fn release(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParam(ip): PathParam<IpAddr>,
) -> Result<StatusCode, CoreError> {
    ipam::release(&state.inventory, principal.as_ref(), ip).await?;
    Ok(StatusCode::NO_CONTENT)
}
