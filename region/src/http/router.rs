use core::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::AUTHORIZATION},
    routing::{IntoMakeService, any},
};
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt as _, request_id::MakeRequestUuid, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::{
    app::AppState,
    error::CoreError,
    http::{api, middleware::LevelAdjustingOnFailure},
    websocket,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Every route of the region service.
pub(crate) fn create_app_router() -> Router<AppState> {
    Router::new()
        .nest("/api", api::routes())
        .route("/ws", any(websocket::ws_handler))
}

pub(crate) fn create_app(app_state: AppState) -> IntoMakeService<Router<()>> {
    let middleware_stack = ServiceBuilder::new()
        .sensitive_headers([AUTHORIZATION])
        .set_x_request_id(MakeRequestUuid)
        .propagate_x_request_id()
        .layer(TraceLayer::new_for_http().on_failure(LevelAdjustingOnFailure))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            // Must outlast the configured scan timeout.
            REQUEST_TIMEOUT.max(app_state.scan_settings().scan_timeout + Duration::from_secs(5)),
        ));

    let app = create_app_router()
        .with_state(app_state)
        .fallback(|req: Request<Body>| async move {
            tracing::warn!(method = %req.method(), uri = %req.uri(), "Unhandled request");
            CoreError::NotFound(format!("Route {}", req.uri().path()))
        })
        .layer(middleware_stack);

    app.into_make_service()
}
