//! Login and password-reset endpoints.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::error::ApiError;

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::{mint_session, session_response};
use super::state::AuthState;
use super::storage::{
    consume_password_reset_token, enqueue_password_reset, lookup_user_by_email, update_password,
};
use super::types::{LoginRequest, LoginResponse, PasswordResetConfirmRequest, PasswordResetRequest};
use super::utils::{
    extract_client_ip, hash_password, hash_token, normalize_email, valid_email, valid_password,
    verify_password,
};

/// Exchange primary credentials for a session cookie.
///
/// When the account has TOTP enabled, the issued session carries
/// `required_2fa = true` and is restricted to the two-factor route until
/// `POST /v1/auth/2fa/verify` completes the login.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) || request.password.is_empty() {
        return Err(ApiError::Credentials);
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
        || auth_state
            .rate_limiter()
            .check_email(&email, RateLimitAction::Login)
            == RateLimitDecision::Limited
    {
        return Err(ApiError::RateLimited);
    }

    // Unknown account, wrong password, and inactive account all answer the
    // same 401 so callers cannot probe for registered addresses.
    let Some(user) = lookup_user_by_email(&pool, &email).await? else {
        return Err(ApiError::Credentials);
    };
    if !verify_password(&user.password_hash, &request.password) || !user.is_active() {
        return Err(ApiError::Credentials);
    }

    let requires_2fa = user.totp_enabled;
    let (claims, cookie) = mint_session(&auth_state, &user, requires_2fa)?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);
    let body = LoginResponse {
        requires_2fa,
        session: if requires_2fa {
            None
        } else {
            Some(session_response(&user, &claims))
        },
    };
    Ok((StatusCode::OK, response_headers, Json(body)).into_response())
}

/// Request a password-reset email (always returns 204 to avoid user
/// enumeration).
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 204, description = "Reset accepted")
    ),
    tag = "auth"
)]
pub async fn password_reset_request(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<PasswordResetRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::PasswordReset)
        == RateLimitDecision::Limited
        || auth_state
            .rate_limiter()
            .check_email(&email, RateLimitAction::PasswordReset)
            == RateLimitDecision::Limited
    {
        // Throttled callers still get 204; the response stays opaque.
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    if let Err(err) = enqueue_password_reset(&pool, &email, auth_state.config()).await {
        error!("Failed to enqueue password reset: {err}");
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Consume a reset token and replace the password.
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 204, description = "Password updated"),
        (status = 400, description = "Invalid token or password")
    ),
    tag = "auth"
)]
pub async fn password_reset_confirm(
    pool: Extension<PgPool>,
    payload: Option<Json<PasswordResetConfirmRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::validation("token", "Missing token"));
    }
    if !valid_password(&request.new_password) {
        return Err(ApiError::validation(
            "new_password",
            "Password must be at least 8 characters",
        ));
    }

    let token_hash = hash_token(token);
    let password_hash = hash_password(&request.new_password)?;

    let mut tx = pool.begin().await.map_err(anyhow::Error::from)?;
    match consume_password_reset_token(&mut tx, &token_hash).await {
        Ok(Some(user_id)) => {
            update_password(&mut tx, user_id, &password_hash).await?;
            tx.commit().await.map_err(anyhow::Error::from)?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Ok(None) => {
            let _ = tx.rollback().await;
            Err(ApiError::BadRequest("Invalid token"))
        }
        Err(err) => {
            let _ = tx.rollback().await;
            Err(ApiError::Internal(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::super::state::{AuthConfig, AuthState};
    use super::{login, password_reset_confirm, password_reset_request};
    use crate::api::error::ApiError;
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::HeaderMap;
    use axum::Json;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn auth_state() -> Arc<AuthState> {
        let config = AuthConfig::new("https://app.nexus.test".to_string());
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        Arc::new(AuthState::new(
            config,
            SecretString::from("a-test-session-secret"),
            limiter,
        ))
    }

    fn lazy_pool() -> Result<sqlx::PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn login_missing_payload() -> Result<()> {
        let result = login(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
            None,
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        Ok(())
    }

    #[tokio::test]
    async fn login_rejects_malformed_email_as_credentials() -> Result<()> {
        let result = login(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
            Some(Json(super::LoginRequest {
                email: "nope".to_string(),
                password: "whatever123".to_string(),
            })),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Credentials)));
        Ok(())
    }

    #[tokio::test]
    async fn reset_request_invalid_email_is_opaque() -> Result<()> {
        let response = password_reset_request(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
            Some(Json(super::PasswordResetRequest {
                email: "nope".to_string(),
            })),
        )
        .await
        .map_err(|err| anyhow::anyhow!("unexpected error: {err:?}"))?;
        assert_eq!(response.status(), axum::http::StatusCode::NO_CONTENT);
        Ok(())
    }

    #[tokio::test]
    async fn reset_confirm_requires_token_and_password() -> Result<()> {
        let result = password_reset_confirm(
            Extension(lazy_pool()?),
            Some(Json(super::PasswordResetConfirmRequest {
                token: "".to_string(),
                new_password: "longenough".to_string(),
            })),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));

        let result = password_reset_confirm(
            Extension(lazy_pool()?),
            Some(Json(super::PasswordResetConfirmRequest {
                token: "sometoken".to_string(),
                new_password: "short".to_string(),
            })),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
        Ok(())
    }
}
