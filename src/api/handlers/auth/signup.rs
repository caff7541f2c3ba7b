//! Signup, account activation, and activation-resend endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::error::{ApiError, ValidationIssue};

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{
    consume_activation_token, enqueue_resend_activation, insert_user_and_activation,
    lookup_email_by_activation_hash, ResendOutcome, SignupOutcome,
};
use super::types::{ActivateRequest, MessageResponse, ResendActivationRequest, SignupRequest};
use super::utils::{
    extract_client_ip, hash_password, hash_token, normalize_email, valid_email, valid_password,
};

/// Create a pending account and enqueue the activation email.
#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created, activation email queued", body = MessageResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn signup(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignupRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let email = normalize_email(&request.email);
    let mut issues = Vec::new();
    if !valid_email(&email) {
        issues.push(ValidationIssue::new("email", "Invalid email address"));
    }
    if !valid_password(&request.password) {
        issues.push(ValidationIssue::new(
            "password",
            "Password must be at least 8 characters",
        ));
    }
    if !issues.is_empty() {
        return Err(ApiError::Validation(issues));
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Signup)
        == RateLimitDecision::Limited
        || auth_state
            .rate_limiter()
            .check_email(&email, RateLimitAction::Signup)
            == RateLimitDecision::Limited
    {
        return Err(ApiError::RateLimited);
    }

    let password_hash = hash_password(&request.password)?;
    let display_name = request
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    match insert_user_and_activation(&pool, &email, &password_hash, display_name, auth_state.config())
        .await?
    {
        SignupOutcome::Created => Ok((
            StatusCode::CREATED,
            Json(MessageResponse {
                message: "Check your email to activate your account".to_string(),
            }),
        )
            .into_response()),
        SignupOutcome::Conflict => Err(ApiError::Conflict("Email already registered")),
    }
}

/// Activate an account by consuming the emailed token.
#[utoipa::path(
    post,
    path = "/v1/auth/activate",
    request_body = ActivateRequest,
    responses(
        (status = 204, description = "Account activated"),
        (status = 400, description = "Invalid or expired token"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn activate(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ActivateRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::validation("token", "Missing token"));
    }

    // Rate limits are enforced before any token work to avoid amplification.
    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Activate)
        == RateLimitDecision::Limited
    {
        return Err(ApiError::RateLimited);
    }

    // Hash the token before lookup; raw tokens are never stored server-side.
    let token_hash = hash_token(token);
    let mut tx = pool.begin().await.map_err(anyhow::Error::from)?;

    if let Ok(Some(email)) = lookup_email_by_activation_hash(&mut tx, &token_hash).await {
        if auth_state
            .rate_limiter()
            .check_email(&email, RateLimitAction::Activate)
            == RateLimitDecision::Limited
        {
            let _ = tx.rollback().await;
            return Err(ApiError::RateLimited);
        }
    }

    match consume_activation_token(&mut tx, &token_hash).await {
        Ok(true) => {
            tx.commit().await.map_err(anyhow::Error::from)?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Ok(false) => {
            let _ = tx.rollback().await;
            Err(ApiError::BadRequest("Invalid token"))
        }
        Err(err) => {
            let _ = tx.rollback().await;
            Err(ApiError::Internal(err))
        }
    }
}

/// Resend an activation email (always returns 204 to avoid user enumeration).
#[utoipa::path(
    post,
    path = "/v1/auth/resend-activation",
    request_body = ResendActivationRequest,
    responses(
        (status = 204, description = "Resend accepted")
    ),
    tag = "auth"
)]
pub async fn resend_activation(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendActivationRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        // Always return 204 for invalid emails to avoid account probing.
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::ResendActivation)
        == RateLimitDecision::Limited
        || auth_state
            .rate_limiter()
            .check_email(&email, RateLimitAction::ResendActivation)
            == RateLimitDecision::Limited
    {
        // Resend is intentionally opaque; rate limits still return 204.
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    match enqueue_resend_activation(&pool, &email, auth_state.config()).await {
        Ok(ResendOutcome::Queued | ResendOutcome::Cooldown | ResendOutcome::Noop) => {
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Err(err) => {
            error!("Failed to enqueue resend activation: {err}");
            // Avoid leaking failures; always return 204 to callers.
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::super::state::{AuthConfig, AuthState};
    use super::{activate, resend_activation, signup};
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
    async fn signup_missing_payload() -> Result<()> {
        let result = signup(
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
    async fn signup_rejects_bad_email_and_short_password() -> Result<()> {
        let result = signup(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
            Some(Json(super::SignupRequest {
                email: "not-an-email".to_string(),
                password: "short".to_string(),
                display_name: None,
            })),
        )
        .await;
        match result {
            Err(ApiError::Validation(issues)) => {
                assert_eq!(issues.len(), 2);
                assert_eq!(issues[0].field, "email");
                assert_eq!(issues[1].field, "password");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn activate_empty_token() -> Result<()> {
        let result = activate(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
            Some(Json(super::ActivateRequest {
                token: " ".to_string(),
            })),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn resend_activation_invalid_email_is_opaque() -> Result<()> {
        let response = resend_activation(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
            Some(Json(super::ResendActivationRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .map_err(|err| anyhow::anyhow!("unexpected error: {err:?}"))?;
        assert_eq!(response.status(), axum::http::StatusCode::NO_CONTENT);
        Ok(())
    }
}
