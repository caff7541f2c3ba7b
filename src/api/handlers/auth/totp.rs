//! Two-factor (TOTP) enrollment, verification, and disable endpoints.
//!
//! Enrollment is two-step: `enable` stores a pending secret and returns the
//! otpauth URL; `verify` with a valid code flips it on. The same `verify`
//! endpoint also completes a pending login: a session with `required_2fa`
//! set is exchanged for a full session once the code checks out.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::api::error::ApiError;

use super::principal::require_auth;
use super::session::{decode_claims, mint_session, session_response};
use super::state::AuthState;
use super::storage::{
    clear_totp, confirm_totp, lookup_user_by_id, set_pending_totp_secret, UserRecord,
};
use super::types::{TwoFactorEnableResponse, TwoFactorVerifyRequest, TwoFactorVerifyResponse};

/// Start TOTP enrollment: generate a secret and return the otpauth URL.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/enable",
    responses(
        (status = 200, description = "Pending secret generated", body = TwoFactorEnableResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 409, description = "Two-factor already enabled")
    ),
    tag = "auth"
)]
pub async fn two_factor_enable(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    let user = load_user(&pool, principal.user_id).await?;

    if user.totp_enabled {
        return Err(ApiError::Conflict("Two-factor already enabled"));
    }

    let secret = Secret::generate_secret();
    let totp = build_totp(&secret, auth_state.config().totp_issuer(), &user.email)?;
    let secret_base32 = totp.get_secret_base32();
    let otpauth_url = totp.get_url();

    set_pending_totp_secret(&pool, user.id, &secret_base32).await?;

    Ok((
        StatusCode::OK,
        Json(TwoFactorEnableResponse {
            secret_base32,
            otpauth_url,
        }),
    )
        .into_response())
}

/// Verify a TOTP code: confirms a pending enrollment, or completes a login
/// whose session still carries `required_2fa`.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/verify",
    request_body = TwoFactorVerifyRequest,
    responses(
        (status = 200, description = "Code accepted", body = TwoFactorVerifyResponse),
        (status = 400, description = "Invalid code or no enrollment in progress"),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "auth"
)]
pub async fn two_factor_verify(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorVerifyRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };
    let code = request.code.trim();
    if code.is_empty() {
        return Err(ApiError::validation("code", "Missing code"));
    }

    // Decode directly: this is the one endpoint a required_2fa session may call.
    let claims = decode_claims(&auth_state, &headers).ok_or(ApiError::Unauthorized)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)?;
    let user = load_user(&pool, user_id).await?;

    if claims.required_2fa {
        // Login completion: the stored secret must already be confirmed.
        if !user.totp_enabled {
            return Err(ApiError::BadRequest("Two-factor is not enabled"));
        }
        check_code(&user, auth_state.config().totp_issuer(), code)?;

        let (claims, cookie) = mint_session(&auth_state, &user, false)?;
        let mut response_headers = HeaderMap::new();
        response_headers.insert(SET_COOKIE, cookie);
        let mut body = serde_json::to_value(TwoFactorVerifyResponse { verified: true })
            .map_err(anyhow::Error::from)?;
        if let Some(map) = body.as_object_mut() {
            map.insert(
                "session".to_string(),
                serde_json::to_value(session_response(&user, &claims))
                    .map_err(anyhow::Error::from)?,
            );
        }
        return Ok((StatusCode::OK, response_headers, Json(body)).into_response());
    }

    // Enrollment confirmation for a fully authenticated session.
    if user.totp_enabled {
        // Idempotent: re-verifying an enabled factor succeeds.
        check_code(&user, auth_state.config().totp_issuer(), code)?;
        return Ok((
            StatusCode::OK,
            Json(TwoFactorVerifyResponse { verified: true }),
        )
            .into_response());
    }
    if user.totp_secret.is_none() {
        return Err(ApiError::BadRequest("Two-factor enrollment not started"));
    }
    check_code(&user, auth_state.config().totp_issuer(), code)?;
    confirm_totp(&pool, user.id).await?;

    Ok((
        StatusCode::OK,
        Json(TwoFactorVerifyResponse { verified: true }),
    )
        .into_response())
}

/// Disable TOTP; requires a valid current code.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/disable",
    request_body = TwoFactorVerifyRequest,
    responses(
        (status = 204, description = "Two-factor disabled"),
        (status = 400, description = "Invalid code or not enabled"),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "auth"
)]
pub async fn two_factor_disable(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorVerifyRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };
    let code = request.code.trim();
    if code.is_empty() {
        return Err(ApiError::validation("code", "Missing code"));
    }

    let principal = require_auth(&headers, &auth_state)?;
    let user = load_user(&pool, principal.user_id).await?;

    if !user.totp_enabled {
        return Err(ApiError::BadRequest("Two-factor is not enabled"));
    }
    check_code(&user, auth_state.config().totp_issuer(), code)?;
    clear_totp(&pool, user.id).await?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn load_user(pool: &PgPool, user_id: Uuid) -> Result<UserRecord, ApiError> {
    lookup_user_by_id(pool, user_id)
        .await?
        .filter(UserRecord::is_active)
        .ok_or(ApiError::Unauthorized)
}

fn build_totp(secret: &Secret, issuer: &str, email: &str) -> Result<TOTP, ApiError> {
    let secret_bytes = secret
        .to_bytes()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("TOTP secret error: {e:?}")))?;
    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret_bytes,
        Some(issuer.to_string()),
        email.to_string(),
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("TOTP init error: {e}")))
}

/// Check a code against the user's stored secret; wrong codes are 400s.
fn check_code(user: &UserRecord, issuer: &str, code: &str) -> Result<(), ApiError> {
    let secret_base32 = user
        .totp_secret
        .as_deref()
        .ok_or(ApiError::BadRequest("Two-factor enrollment not started"))?;
    let totp = build_totp(
        &Secret::Encoded(secret_base32.to_string()),
        issuer,
        &user.email,
    )?;
    let valid = totp
        .check_current(code)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("TOTP clock error: {e}")))?;
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Invalid code"))
    }
}
