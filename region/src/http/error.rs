//! Mapping of [`CoreError`] onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::error::CoreError;

impl CoreError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match *self {
            Self::Validation(_) | Self::UnsupportedFamily | Self::NoAgentAvailable => {
                StatusCode::BAD_REQUEST
            }
            Self::PermissionDenied | Self::ForbiddenOrigin => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. } | Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        if let Self::Storage(ref e) = self {
            error!("Storage failure while handling request: {e}");
        }
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}
