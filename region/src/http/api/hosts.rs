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
    hosts,
    http::{
        auth::Caller,
        extract::{JsonBody, PathParam},
        views::{HostView, InterfaceView},
    },
    inventory::NewInterface,
    lifecycle::{self, HostEvent, TransitionRequest},
    model::{AuditEntry, HostId, HostKind, HostStatus, InterfaceId, InterfaceKind, SubnetId},
};

pub(super) async fn list(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> Result<Json<Vec<HostView>>, CoreError> {
    let hosts = hosts::list_hosts(&state.inventory, principal.as_ref())?;
    Ok(Json(hosts.iter().map(HostView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateHostBody {
    hostname: String,
    #[serde(default = "default_kind")]
    kind: HostKind,
}

const fn default_kind() -> HostKind {
    HostKind::Machine
}

pub(super) async fn create(
    State(state): State<AppState>,
    Caller(principal): Caller,
    JsonBody(body): JsonBody<CreateHostBody>,
) -> Result<impl IntoResponse, CoreError> {
    let host = hosts::create_host(&state.inventory, principal.as_ref(), &body.hostname, body.kind)
        .await?;
    Ok((StatusCode::CREATED, Json(HostView::from(&host))))
}

pub(super) async fn detail(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParam(id): PathParam<HostId>,
) -> Result<Json<HostView>, CoreError> {
    let host = hosts::get_host(&state.inventory, principal.as_ref(), id)?;
    Ok(Json(HostView::from(&host)))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParam(id): PathParam<HostId>,
) -> Result<Json<HostView>, CoreError> {
    let host = hosts::delete_host(&state.inventory, principal.as_ref(), id).await?;
    Ok(Json(HostView::from(&host)))
}

#[derive(Debug, Deserialize)]
pub(super) struct TransitionBody {
    event: HostEvent,
    owner: Option<String>,
    /// Integer code of the status the caller last saw.
    expected_status: Option<u8>,
}

impl TryFrom<TransitionBody> for TransitionRequest {
    type Error = CoreError;

    fn try_from(body: TransitionBody) -> Result<Self, Self::Error> {
        let expected_status = body
            .expected_status
            .map(|code| {
                HostStatus::from_code(code)
                    .ok_or_else(|| CoreError::validation(format!("Unknown host status code {code}")))
            })
            .transpose()?;
        Ok(Self {
            event: body.event,
            owner: body.owner,
            expected_status,
        })
    }
}

#[axum::debug_handler]
pub(super) async fn transition(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParam(id): PathParam<HostId>,
    JsonBody(body): JsonBody<TransitionBody>,
) -> Result<Json<HostView>, CoreError> {
    let request = TransitionRequest::try_from(body)?;
    let host = lifecycle::transition(&state.inventory, principal.as_ref(), id, request).await?;
    Ok(Json(HostView::from(&host)))
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateInterfaceBody {
    name: String,
    #[serde(rename = "type", default = "default_interface_kind")]
    kind: InterfaceKind,
    host_id: Option<HostId>,
    mac: Option<String>,
    subnet_id: Option<SubnetId>,
    #[serde(default)]
    link_up: bool,
}

const fn default_interface_kind() -> InterfaceKind {
    InterfaceKind::Physical
}

pub(super) async fn create_interface(
    State(state): State<AppState>,
    Caller(principal): Caller,
    JsonBody(body): JsonBody<CreateInterfaceBody>,
) -> Result<impl IntoResponse, CoreError> {
    let new = NewInterface {
        name: body.name,
        kind: body.kind,
        host_id: body.host_id,
        mac: body.mac,
        subnet_id: body.subnet_id,
        link_up: body.link_up,
    };
    let interface = hosts::create_interface(&state.inventory, principal.as_ref(), new).await?;
    Ok((StatusCode::CREATED, Json(InterfaceView::from(&interface))))
}

pub(super) async fn delete_interface(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParam(id): PathParam<InterfaceId>,
) -> Result<Json<InterfaceView>, CoreError> {
    let interface = hosts::delete_interface(&state.inventory, principal.as_ref(), id).await?;
    Ok(Json(InterfaceView::from(&interface)))
}

pub(super) async fn audit(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> Result<Json<Vec<AuditEntry>>, CoreError> {
    hosts::audit_log(&state.inventory, principal.as_ref()).await.map(Json)
}
