//! Request authentication extractors.
//!
//! `CurrentUser` resolves the session cookie to a full user row, enforcing
//! both the constant-time secret check and absolute-age expiry before the
//! handler runs. `RequireAdmin` layers the role gate on top.

use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;

use colab_auth::cookie::token_from_cookie_header;
use colab_store::UserRecord;

use crate::AppState;
use crate::error::ApiError;

pub struct CurrentUser(pub UserRecord);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(token_from_cookie_header)
            .ok_or_else(ApiError::unauthorized)?;

        resolve_user(state, token).await
    }
}

/// Shared between the cookie extractor and the WebSocket handshake, where
/// the token arrives as a query parameter instead.
pub async fn resolve_user(state: &AppState, token: &str) -> Result<CurrentUser, ApiError> {
    let session = state
        .sessions
        .validate_session_token(token)?
        .ok_or_else(ApiError::unauthorized)?;

    // Absolute-age expiry; deletes the row as a side effect when stale.
    let session = state
        .sessions
        .get_session(&session.id)?
        .ok_or_else(ApiError::unauthorized)?;

    let user = state
        .db
        .user_by_id(&session.user_id)?
        .ok_or_else(ApiError::unauthorized)?;

    Ok(CurrentUser(user))
}

pub struct RequireAdmin(pub UserRecord);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != colab_proto::UserRole::Admin {
            return Err(ApiError::unauthorized());
        }
        Ok(RequireAdmin(user))
    }
}
