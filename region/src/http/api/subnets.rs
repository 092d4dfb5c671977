use core::net::IpAddr;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use ipnet::IpNet;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    address_space::{RenderOptions, RenderedStatistics},
    app::AppState,
    discovery::{ScanSummary, scan_subnet},
    error::CoreError,
    http::{
        auth::Caller,
        extract::{JsonBody, PathParam, QueryParams},
        views::{RangeView, SubnetReportView, SubnetView},
    },
    inventory::{NewRange, NewSubnet},
    model::{IpRangeKind, RdnsMode, SubnetId},
    permission::{Action, Principal, Target, authorize},
    subnets,
    websocket::WsMessage,
};

const fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateSubnetBody {
    cidr: String,
    name: Option<String>,
    #[serde(default)]
    description: String,
    vlan: Option<u16>,
    space: Option<String>,
    /// Integer code; see [`RdnsMode`].
    rdns_mode: Option<u8>,
    gateway_ip: Option<IpAddr>,
    #[serde(default = "yes")]
    managed: bool,
    #[serde(default = "yes")]
    allow_proxy: bool,
    #[serde(default)]
    active_discovery: bool,
    #[serde(default)]
    dns_servers: Vec<IpAddr>,
}

impl TryFrom<CreateSubnetBody> for NewSubnet {
    type Error = CoreError;

    fn try_from(body: CreateSubnetBody) -> Result<Self, Self::Error> {
        let cidr: IpNet = body.cidr.trim().parse()?;
        let rdns_mode = match body.rdns_mode {
            None => RdnsMode::default(),
            Some(code) => RdnsMode::from_code(code)
                .ok_or_else(|| CoreError::validation(format!("Unknown rdns_mode code {code}")))?,
        };
        Ok(Self {
            cidr,
            name: body.name,
            description: body.description,
            vlan: body.vlan,
            space: body.space,
            rdns_mode,
            gateway_ip: body.gateway_ip,
            managed: body.managed,
            allow_proxy: body.allow_proxy,
            active_discovery: body.active_discovery,
            dns_servers: body.dns_servers,
        })
    }
}

/// Checks the caller before the body, so refusals don't depend on what was sent.
fn authorized_new_subnet(
    principal: Option<&Principal>,
    body: CreateSubnetBody,
) -> Result<NewSubnet, CoreError> {
    authorize(principal, Action::CreateSubnet, &Target::Inventory)?;
    NewSubnet::try_from(body)
}

pub(super) async fn list(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> Result<Json<Vec<SubnetReportView>>, CoreError> {
    let reports = subnets::list_subnets(
        &state.inventory,
        principal.as_ref(),
        state.statistics_settings(),
    )?;
    Ok(Json(reports.into_iter().map(SubnetReportView::summary).collect()))
}

#[axum::debug_handler]
pub(super) async fn create(
    State(state): State<AppState>,
    Caller(principal): Caller,
    JsonBody(body): JsonBody<CreateSubnetBody>,
) -> Result<impl IntoResponse, CoreError> {
    let new = authorized_new_subnet(principal.as_ref(), body)?;
    let subnet = subnets::create_subnet(&state.inventory, principal.as_ref(), new).await?;
    info!("Subnet {} ({}) created", subnet.name, subnet.cidr);
    Ok((StatusCode::CREATED, Json(SubnetView::from(&subnet))))
}

pub(super) async fn detail(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParam(id): PathParam<SubnetId>,
) -> Result<Json<SubnetReportView>, CoreError> {
    let report = subnets::get_subnet(
        &state.inventory,
        principal.as_ref(),
        id,
        state.statistics_settings(),
    )?;
    Ok(Json(SubnetReportView::detail(report)))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParam(id): PathParam<SubnetId>,
) -> Result<Json<SubnetView>, CoreError> {
    let subnet = subnets::delete_subnet(&state.inventory, principal.as_ref(), id).await?;
    info!("Subnet {} ({}) deleted", subnet.name, subnet.cidr);
    Ok(Json(SubnetView::from(&subnet)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct StatisticsQuery {
    include_ranges: bool,
    include_suggestions: bool,
}

pub(super) async fn statistics(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParam(id): PathParam<SubnetId>,
    QueryParams(query): QueryParams<StatisticsQuery>,
) -> Result<Json<RenderedStatistics>, CoreError> {
    let options = RenderOptions {
        include_ranges: query.include_ranges,
        include_suggestions: query.include_suggestions,
    };
    subnets::subnet_statistics(
        &state.inventory,
        principal.as_ref(),
        id,
        state.statistics_settings(),
        options,
    )
    .map(Json)
}

#[derive(Debug, Deserialize)]
pub(super) struct DeclareRangeBody {
    start_ip: IpAddr,
    end_ip: IpAddr,
    #[serde(rename = "type")]
    kind: IpRangeKind,
    #[serde(default)]
    comment: String,
}

pub(super) async fn declare_range(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParam(subnet_id): PathParam<SubnetId>,
    JsonBody(body): JsonBody<DeclareRangeBody>,
) -> Result<impl IntoResponse, CoreError> {
    let new = NewRange {
        subnet_id,
        start: body.start_ip,
        end: body.end_ip,
        kind: body.kind,
        comment: body.comment,
    };
    let range = subnets::declare_range(&state.inventory, principal.as_ref(), new).await?;
    Ok((StatusCode::CREATED, Json(RangeView::from(&range))))
}

/// Runs an active discovery scan and publishes its summary to websocket clients.
#[axum::debug_handler]
pub(super) async fn scan(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParam(id): PathParam<SubnetId>,
) -> Result<Json<ScanSummary>, CoreError> {
    let directory = state.config_rx.borrow().rack_agents();
    let summary = scan_subnet(
        &state.inventory,
        &state.rack_client,
        &directory,
        state.scan_settings(),
        principal.as_ref(),
        id,
    )
    .await?;

    if state.ws_tx.send(WsMessage::ScanCompleted(summary.clone())).is_err() {
        debug!("No Websocket Subscribers");
    }
    Ok(Json(summary))
}
