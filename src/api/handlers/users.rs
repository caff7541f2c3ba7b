//! User management endpoints (SUPER_ADMIN only), plus invite redemption.
//!
//! Flow Overview:
//! 1) Authenticate the request via session cookie.
//! 2) Enforce the SUPER_ADMIN role for /v1/users routes.
//! 3) Invites create an `invited` user stub plus a hashed single-use token;
//!    redemption sets the password and activates the account.

use anyhow::{Context, Result};
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::email::TEMPLATE_INVITE;
use crate::api::error::ApiError;
use crate::session::Role;

use super::auth::principal::{require_auth, require_role};
use super::auth::state::{AuthConfig, AuthState};
use super::auth::storage::enqueue_email;
use super::auth::utils::{
    build_invite_url, generate_token, hash_password, hash_token, is_unique_violation,
    normalize_email, valid_email, valid_password,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserDetail {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub status: String,
    pub plan_tier: String,
    pub sync_status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct InviteRequest {
    pub email: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct InviteVerifyRequest {
    pub token: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InviteResponse {
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "List users.", body = [UserSummary]),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    require_role(&principal, Role::SuperAdmin)?;

    let list = fetch_user_summaries(&pool).await?;
    Ok((StatusCode::OK, Json(list)).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User detail.", body = UserDetail),
        (status = 400, description = "Invalid user id."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn get_user(
    headers: HeaderMap,
    Path(id): Path<String>,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    require_role(&principal, Role::SuperAdmin)?;

    let user_id =
        Uuid::parse_str(id.trim()).map_err(|_| ApiError::validation("id", "Invalid user id"))?;

    let detail = fetch_user_detail(&pool, user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok((StatusCode::OK, Json(detail)).into_response())
}

/// Invite a new user by email; the invitee sets a password via the link.
#[utoipa::path(
    post,
    path = "/v1/users/invite",
    request_body = InviteRequest,
    responses(
        (status = 201, description = "Invite created and email queued.", body = InviteResponse),
        (status = 400, description = "Invalid email or role."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Forbidden."),
        (status = 409, description = "Email already registered."),
    ),
    tag = "users"
)]
pub async fn invite_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<InviteRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    require_role(&principal, Role::SuperAdmin)?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::validation("email", "Invalid email address"));
    }
    let role = match request.role.as_deref().map(str::trim) {
        None | Some("") => Role::User,
        Some(value) => {
            Role::from_str(value).ok_or(ApiError::validation("role", "Unknown role"))?
        }
    };

    match create_invite(&pool, &email, role, auth_state.config()).await? {
        true => Ok((
            StatusCode::CREATED,
            Json(InviteResponse {
                message: "Invite sent".to_string(),
            }),
        )
            .into_response()),
        false => Err(ApiError::Conflict("Email already registered")),
    }
}

/// Redeem an invite token: set the password and activate the account.
#[utoipa::path(
    post,
    path = "/v1/users/invite-verify",
    request_body = InviteVerifyRequest,
    responses(
        (status = 204, description = "Invite accepted, account active."),
        (status = 400, description = "Invalid token or password."),
    ),
    tag = "users"
)]
pub async fn invite_verify(
    pool: Extension<PgPool>,
    payload: Option<Json<InviteVerifyRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::validation("token", "Missing token"));
    }
    if !valid_password(&request.password) {
        return Err(ApiError::validation(
            "password",
            "Password must be at least 8 characters",
        ));
    }

    let password_hash = hash_password(&request.password)?;
    let display_name = request
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    if redeem_invite(&pool, &hash_token(token), &password_hash, display_name).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::BadRequest("Invalid token"))
    }
}

async fn fetch_user_summaries(pool: &PgPool) -> Result<Vec<UserSummary>, ApiError> {
    let query = r"
        SELECT id::text AS id, email, display_name, role, status
        FROM users
        ORDER BY created_at DESC
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let role: String = row.get("role");
            UserSummary {
                id: row.get("id"),
                email: row.get("email"),
                display_name: row.get("display_name"),
                role: Role::from_str(&role).unwrap_or(Role::Guest),
                status: row.get("status"),
            }
        })
        .collect())
}

async fn fetch_user_detail(pool: &PgPool, user_id: Uuid) -> Result<Option<UserDetail>, ApiError> {
    let query = r#"
        SELECT
            id::text AS id,
            email,
            display_name,
            role,
            status,
            plan_tier,
            sync_status,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM users
        WHERE id = $1
        LIMIT 1
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(row.map(|row| {
        let role: String = row.get("role");
        UserDetail {
            id: row.get("id"),
            email: row.get("email"),
            display_name: row.get("display_name"),
            role: Role::from_str(&role).unwrap_or(Role::Guest),
            status: row.get("status"),
            plan_tier: row.get("plan_tier"),
            sync_status: row.get("sync_status"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }))
}

/// Create the invited user stub, token, and outbox row in one transaction.
/// Returns false when the email is already registered.
async fn create_invite(
    pool: &PgPool,
    email: &str,
    role: Role,
    config: &AuthConfig,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin invite transaction")?;

    // Invited users have no password until redemption.
    let query = r"
        INSERT INTO users (email, password_hash, role, status)
        VALUES ($1, '', $2, 'invited')
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(false);
            }
            return Err(err).context("failed to insert invited user");
        }
    };

    let token = generate_token()?;
    let token_hash = hash_token(&token);
    let query = r"
        INSERT INTO invite_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(config.email_token_ttl_seconds())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert invite token")?;

    let invite_url = build_invite_url(config.base_url(), &token);
    enqueue_email(&mut tx, email, TEMPLATE_INVITE, &json!({
        "email": email,
        "invite_url": invite_url,
    }))
    .await?;

    tx.commit().await.context("commit invite transaction")?;
    Ok(true)
}

/// Consume the invite token exactly once and activate the account.
async fn redeem_invite(
    pool: &PgPool,
    token_hash: &[u8],
    password_hash: &str,
    display_name: Option<&str>,
) -> Result<bool, ApiError> {
    let mut tx = pool.begin().await.map_err(anyhow::Error::from)?;

    let query = r"
        UPDATE invite_tokens
        SET consumed_at = NOW()
        WHERE token_hash = $1
          AND consumed_at IS NULL
          AND expires_at > NOW()
        RETURNING user_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .map_err(anyhow::Error::from)?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(false);
    };

    let user_id: Uuid = row.get("user_id");
    let query = r"
        UPDATE users
        SET password_hash = $2,
            display_name = COALESCE($3, display_name),
            status = 'active',
            updated_at = NOW()
        WHERE id = $1
          AND status = 'invited'
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .bind(display_name)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .map_err(anyhow::Error::from)?;

    if result.rows_affected() == 0 {
        let _ = tx.rollback().await;
        return Ok(false);
    }

    tx.commit().await.map_err(anyhow::Error::from)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::rate_limit::{NoopRateLimiter, RateLimiter};
    use anyhow::Result;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Arc<AuthState> {
        let config = AuthConfig::new("https://app.nexus.test".to_string());
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        Arc::new(AuthState::new(
            config,
            SecretString::from("a-test-session-secret"),
            limiter,
        ))
    }

    #[tokio::test]
    async fn list_users_without_session_is_unauthorized() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let result = list_users(HeaderMap::new(), Extension(pool), Extension(auth_state())).await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        Ok(())
    }

    #[tokio::test]
    async fn invite_verify_requires_token_and_password() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let result = invite_verify(
            Extension(pool.clone()),
            Some(Json(InviteVerifyRequest {
                token: "".to_string(),
                password: "longenough".to_string(),
                display_name: None,
            })),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));

        let result = invite_verify(
            Extension(pool),
            Some(Json(InviteVerifyRequest {
                token: "tok".to_string(),
                password: "short".to_string(),
                display_name: None,
            })),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
        Ok(())
    }
}
