//! Session cookie handling and the session polling endpoint.
//!
//! The session cookie carries the signed claims token; there is no
//! server-side session table. `GET /v1/session` re-reads the user row and
//! re-mints the cookie so business-state changes (sync status, plan tier,
//! onboarding) reach the client on its poll interval without a new login.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::gate::now_unix_seconds;
use crate::session::{sign_hs256, verify_hs256, SessionClaims, SESSION_COOKIE_NAME};
use secrecy::ExposeSecret;

use super::{
    state::{AuthConfig, AuthState},
    storage::{lookup_user_by_id, UserRecord},
    types::SessionResponse,
};

/// Build claims for a user row and sign them into a cookie value.
///
/// A `required_2fa` session gets the short two-factor TTL; everything else
/// gets the full session TTL.
pub(crate) fn mint_session(
    auth_state: &AuthState,
    user: &UserRecord,
    required_2fa: bool,
) -> Result<(SessionClaims, HeaderValue), anyhow::Error> {
    let config = auth_state.config();
    let ttl_seconds = if required_2fa {
        config.two_factor_ttl_seconds()
    } else {
        config.session_ttl_seconds()
    };

    let claims = SessionClaims::new(user.id.to_string(), user.role, now_unix_seconds(), ttl_seconds)
        .with_required_2fa(required_2fa)
        .with_onboarding_completed(user.onboarding_completed)
        .with_sync_status(user.sync_status)
        .with_plan_tier(user.plan_tier);

    let token = sign_hs256(
        auth_state.session_secret().expose_secret().as_bytes(),
        &claims,
    )?;
    let cookie = session_cookie(config, &token, ttl_seconds)?;
    Ok((claims, cookie))
}

/// Decode the session cookie into claims; failures degrade to `None`.
pub(crate) fn decode_claims(auth_state: &AuthState, headers: &HeaderMap) -> Option<SessionClaims> {
    let token = extract_session_token(headers)?;
    verify_hs256(
        &token,
        auth_state.session_secret().expose_secret().as_bytes(),
        now_unix_seconds(),
    )
    .ok()
}

/// Build the claims-backed session response body.
pub(crate) fn session_response(user: &UserRecord, claims: &SessionClaims) -> SessionResponse {
    SessionResponse {
        user_id: user.id.to_string(),
        email: user.email.clone(),
        role: user.role,
        required_2fa: claims.required_2fa,
        onboarding_completed: user.onboarding_completed,
        sync_status: user.sync_status,
        plan_tier: user.plan_tier,
    }
}

#[utoipa::path(
    get,
    path = "/v1/session",
    responses(
        (status = 200, description = "Session is active; cookie refreshed from current state", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Missing or invalid cookies are "no session", never an error.
    let Some(claims) = decode_claims(&auth_state, &headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let user = match lookup_user_by_id(&pool, user_id).await {
        Ok(Some(user)) if user.is_active() => user,
        Ok(_) => return StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to refresh session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Re-mint from DB state so sync status and plan changes reach the poller.
    match mint_session(&auth_state, &user, claims.required_2fa) {
        Ok((claims, cookie)) => {
            let mut response_headers = HeaderMap::new();
            response_headers.insert(SET_COOKIE, cookie);
            (
                StatusCode::OK,
                response_headers,
                Json(session_response(&user, &claims)),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to mint session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Stateless sessions: logout is clearing the cookie.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
    ttl_seconds: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    // Only mark cookies secure when the app is served over HTTPS.
    let secure = config.session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
