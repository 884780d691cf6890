//! Registration, login, verification and account setup.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::HeaderMap;
use axum::response::{AppendHeaders, IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use colab_auth::cookie::{clear_session_cookie, session_cookie, token_from_cookie_header};
use colab_auth::password::{MIN_PASSWORD_LENGTH, hash_password, verify_password};
use colab_proto::UserRole;
use colab_store::NewUser;

use crate::AppState;
use crate::error::ApiError;
use crate::mailer::verification_mail;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    contact_number: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<Response, ApiError> {
    let mut errors = Vec::new();
    if body.name.trim().is_empty() {
        errors.push("name_required");
    }
    if !body.email.contains('@') {
        errors.push("email_invalid");
    }
    if body.password.len() < MIN_PASSWORD_LENGTH {
        errors.push("password_too_short");
    }
    if body.contact_number.trim().is_empty() {
        errors.push("contact_number_required");
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(&errors));
    }

    if state.db.user_by_email(&body.email)?.is_some() {
        return Err(ApiError::validation_with_status(
            StatusCode::CONFLICT,
            &["email_already_used"],
        ));
    }

    // First registered account becomes the admin.
    let is_first_user = state.db.count_users()? == 0;

    let password = body.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|_| ApiError::internal())??;

    let verification_token = uuid::Uuid::new_v4().to_string();
    let user = state.db.create_user(NewUser {
        name: body.name.trim().to_string(),
        email: body.email.clone(),
        contact_number: body.contact_number.trim().to_string(),
        password_hash,
        role: if is_first_user { UserRole::Admin } else { UserRole::User },
        verification_token: Some(verification_token.clone()),
    })?;

    state.mailer.send(verification_mail(
        &user.name,
        &user.email,
        &state.config.origin,
        &verification_token,
    ));
    info!(user_id = %user.id, is_first_user, "user registered");

    let message = if is_first_user {
        "Admin account created! Please check your email to verify your account and complete the setup."
    } else {
        "Registration successful! Please check your email to verify your account."
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "isFirstUser": is_first_user,
    }))
    .into_response())
}

#[derive(Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<Response, ApiError> {
    let mut errors = Vec::new();
    if !body.email.contains('@') {
        errors.push("email_invalid");
    }
    if body.password.len() < MIN_PASSWORD_LENGTH {
        errors.push("password_too_short");
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(&errors));
    }

    let Some(user) = state.db.user_by_email(&body.email)? else {
        return Err(ApiError::validation_with_status(
            StatusCode::UNAUTHORIZED,
            &["invalid_credentials"],
        ));
    };

    let stored = user.password_hash.clone();
    let password = body.password.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&stored, &password))
        .await
        .map_err(|_| ApiError::internal())?;
    if !valid {
        return Err(ApiError::validation_with_status(
            StatusCode::UNAUTHORIZED,
            &["invalid_credentials"],
        ));
    }

    if !user.email_verified {
        return Err(ApiError::validation_with_status(
            StatusCode::FORBIDDEN,
            &["email_not_verified"],
        ));
    }

    let session = state.sessions.create_session(&user.id)?;
    info!(user_id = %user.id, session_id = %session.id, "login");

    let cookie = session_cookie(&session.token, state.config.secure_cookies);
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(json!({ "user": user.into_view() })),
    )
        .into_response())
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(token) = headers
        .get(COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(token_from_cookie_header)
    {
        // Only a holder of the full valid token may revoke the session.
        if let Some(session) = state.sessions.validate_session_token(token)? {
            state.sessions.delete_session(&session.id)?;
            info!(session_id = %session.id, "logout");
        }
    }

    let cookie = clear_session_cookie(state.config.secure_cookies);
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(json!({ "success": true })),
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct VerifyQuery {
    token: Option<String>,
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = query
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::bad_request("Verification token is required"))?;

    let Some(user) = state.db.user_by_verification_token(&token)? else {
        return Err(ApiError::bad_request("Invalid or expired verification token"));
    };

    state.db.mark_email_verified(&user.id)?;
    info!(user_id = %user.id, "email verified");
    Ok(Json(json!({ "success": true, "verified": true })))
}

#[derive(Deserialize)]
pub struct ResendBody {
    #[serde(default)]
    email: String,
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Json(body): Json<ResendBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // The response never reveals whether the address is registered.
    if let Some(user) = state.db.user_by_email(&body.email)? {
        if !user.email_verified {
            let token = uuid::Uuid::new_v4().to_string();
            state.db.set_verification_token(&user.id, &token)?;
            state.mailer.send(verification_mail(
                &user.name,
                &user.email,
                &state.config.origin,
                &token,
            ));
        }
    }
    Ok(Json(json!({
        "success": true,
        "message": "If the address is registered, a verification email has been sent.",
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupBody {
    #[serde(default)]
    token: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    contact_number: String,
}

/// Completes an invited account and logs the user straight in.
pub async fn complete_setup(
    State(state): State<AppState>,
    Json(body): Json<SetupBody>,
) -> Result<Response, ApiError> {
    let mut errors = Vec::new();
    if body.name.trim().is_empty() {
        errors.push("name_required");
    }
    if body.password.len() < MIN_PASSWORD_LENGTH {
        errors.push("password_too_short");
    }
    if body.contact_number.trim().is_empty() {
        errors.push("contact_number_required");
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(&errors));
    }

    let Some(user) = state.db.user_by_invite_token(&body.token)? else {
        return Err(ApiError::validation(&["invalid_token"]));
    };

    let password = body.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|_| ApiError::internal())??;

    let user = state.db.complete_setup(
        &user.id,
        body.name.trim(),
        body.contact_number.trim(),
        &password_hash,
    )?;

    let session = state.sessions.create_session(&user.id)?;
    info!(user_id = %user.id, "account setup completed");

    let cookie = session_cookie(&session.token, state.config.secure_cookies);
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(json!({ "success": true, "user": user.into_view() })),
    )
        .into_response())
}
