//! JSON REST API, nested under `/api`.
//!
//! Every handler resolves the [`Caller`](crate::http::auth::Caller) and passes
//! it on; authorization happens in the operations themselves.

mod addresses;
mod hosts;
mod racks;
mod subnets;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::app::AppState;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/subnets", get(subnets::list).post(subnets::create))
        .route("/subnets/{id}", get(subnets::detail).delete(subnets::remove))
        .route("/subnets/{id}/statistics", get(subnets::statistics))
        .route("/subnets/{id}/ranges", post(subnets::declare_range))
        .route("/subnets/{id}/scan", post(subnets::scan))
        .route("/hosts", get(hosts::list).post(hosts::create))
        .route("/hosts/{id}", get(hosts::detail).delete(hosts::remove))
        .route("/hosts/{id}/transition", post(hosts::transition))
        .route("/interfaces", post(hosts::create_interface))
        .route("/interfaces/{id}", delete(hosts::delete_interface))
        .route("/addresses", post(addresses::assign))
        .route("/addresses/{ip}", delete(addresses::release))
        .route("/audit", get(hosts::audit))
        .route("/racks", get(racks::list))
}
