//! Bearer-token identification of API callers.
//!
//! Tokens are checked against the *current* config on every request, so a
//! reloaded `[users]` table applies to the next request.

use core::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{app::AppState, permission::Principal};

/// The caller of a request; `None` when no known token was presented.
///
/// Never rejects: what an anonymous caller may do is decided by
/// [`crate::permission::authorize`], so every refusal looks the same.
pub struct Caller(pub Option<Principal>);

impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Ok(TypedHeader(Authorization(bearer))) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
        else {
            return Ok(Self(None));
        };
        Ok(Self(state.config_rx.borrow().principal_for_token(bearer.token())))
    }
}
