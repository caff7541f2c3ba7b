//! ERP integration endpoints: connect, OAuth callback, disconnect, status,
//! and manual sync dispatch.
//!
//! Flow Overview:
//! 1) `connect` stores a hashed OAuth state and hands back the authorize URL.
//! 2) The ERP redirects the browser to `callback`, which consumes the state,
//!    exchanges the code, stores the connection, and enqueues the first sync.
//! 3) `sync` (PRO only) enqueues a job; completion is observed by polling
//!    `status` or `GET /v1/session`, never awaited in the handler.

use anyhow::{Context, Result};
use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{error, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::erp::sync::{enqueue_sync_job, EnqueueOutcome};
use crate::erp::ErpClient;
use crate::gate::LANDING_PATH;
use crate::session::SyncStatus;

use super::auth::principal::{require_auth, require_pro};
use super::auth::state::AuthState;
use super::auth::utils::{generate_token, hash_token};

const OAUTH_STATE_TTL_SECONDS: i64 = 10 * 60;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ConnectResponse {
    pub authorize_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ErpStatusResponse {
    pub connected: bool,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SyncDispatchResponse {
    pub sync_status: SyncStatus,
}

/// Begin the OAuth connect flow.
#[utoipa::path(
    get,
    path = "/v1/erp/connect",
    responses(
        (status = 200, description = "Authorize URL for the browser", body = ConnectResponse),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "erp"
)]
pub async fn connect(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    erp: Extension<Arc<ErpClient>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;

    let state = generate_token().map_err(ApiError::Internal)?;
    insert_oauth_state(&pool, principal.user_id, &hash_token(&state)).await?;

    let authorize_url = erp.authorize_url(&state).map_err(ApiError::Internal)?;
    Ok((StatusCode::OK, Json(ConnectResponse { authorize_url })).into_response())
}

/// OAuth callback hit by the browser after ERP consent.
///
/// This is a navigation endpoint: success and failure both end in a redirect,
/// never a JSON body.
#[utoipa::path(
    get,
    path = "/v1/erp/callback",
    responses(
        (status = 303, description = "Redirect back into the app")
    ),
    tag = "erp"
)]
pub async fn callback(
    pool: Extension<PgPool>,
    erp: Extension<Arc<ErpClient>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let (Some(code), Some(state)) = (query.code.as_deref(), query.state.as_deref()) else {
        return Redirect::to(&format!("{LANDING_PATH}?error=missing_params")).into_response();
    };

    let user_id = match consume_oauth_state(&pool, &hash_token(state)).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            return Redirect::to(&format!("{LANDING_PATH}?error=invalid_state")).into_response()
        }
        Err(err) => {
            error!("Failed to consume OAuth state: {err}");
            return Redirect::to(&format!("{LANDING_PATH}?error=connect_failed")).into_response();
        }
    };

    let grant = match erp.exchange_code(code).await {
        Ok(grant) => grant,
        Err(err) => {
            error!("Failed to exchange ERP code: {err}");
            return Redirect::to(&format!("{LANDING_PATH}?error=connect_failed")).into_response();
        }
    };

    if let Err(err) = store_connection(&pool, user_id, &grant).await {
        error!("Failed to store ERP connection: {err}");
        return Redirect::to(&format!("{LANDING_PATH}?error=connect_failed")).into_response();
    }

    // First connect doubles as first-run setup; kick off the initial sync.
    if let Err(err) = enqueue_sync_job(&pool, user_id).await {
        error!("Failed to enqueue initial sync: {err}");
    }

    Redirect::to(&format!("{LANDING_PATH}?connected=1")).into_response()
}

/// Tear down the ERP connection.
#[utoipa::path(
    post,
    path = "/v1/erp/disconnect",
    responses(
        (status = 204, description = "Connection removed"),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "No connection on file")
    ),
    tag = "erp"
)]
pub async fn disconnect(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;

    if delete_connection(&pool, principal.user_id).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::NotFound)
    }
}

/// Report connection and sync state; the UI polls this during a sync.
#[utoipa::path(
    get,
    path = "/v1/erp/status",
    responses(
        (status = 200, description = "Connection and sync state", body = ErpStatusResponse),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "erp"
)]
pub async fn status(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    let status = connection_status(&pool, principal.user_id).await?;
    Ok((StatusCode::OK, Json(status)).into_response())
}

/// Dispatch a manual sync (PRO plan only); fire-and-forget.
#[utoipa::path(
    post,
    path = "/v1/erp/sync",
    responses(
        (status = 202, description = "Sync dispatched or already pending", body = SyncDispatchResponse),
        (status = 400, description = "ERP is not connected"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Manual sync requires the PRO plan")
    ),
    tag = "erp"
)]
pub async fn sync(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    require_pro(&principal)?;

    if !connection_exists(&pool, principal.user_id).await? {
        return Err(ApiError::BadRequest("ERP is not connected"));
    }

    // Queued and AlreadyPending both answer 202; dispatch is idempotent.
    let _outcome: EnqueueOutcome = enqueue_sync_job(&pool, principal.user_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SyncDispatchResponse {
            sync_status: SyncStatus::Syncing,
        }),
    )
        .into_response())
}

async fn insert_oauth_state(pool: &PgPool, user_id: Uuid, state_hash: &[u8]) -> Result<()> {
    let query = r"
        INSERT INTO erp_oauth_states (user_id, state_hash, expires_at)
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
        .bind(state_hash)
        .bind(OAUTH_STATE_TTL_SECONDS)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert OAuth state")?;
    Ok(())
}

async fn consume_oauth_state(pool: &PgPool, state_hash: &[u8]) -> Result<Option<Uuid>> {
    // Single-use: the row is deleted on consumption, expired rows never match.
    let query = r"
        DELETE FROM erp_oauth_states
        WHERE state_hash = $1
          AND expires_at > NOW()
        RETURNING user_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(state_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume OAuth state")?;
    Ok(row.map(|row| row.get("user_id")))
}

async fn store_connection(
    pool: &PgPool,
    user_id: Uuid,
    grant: &crate::erp::TokenGrant,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin connection store")?;

    let query = r"
        INSERT INTO erp_connections (user_id, access_token, refresh_token, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
        ON CONFLICT (user_id)
        DO UPDATE SET access_token = EXCLUDED.access_token,
                      refresh_token = EXCLUDED.refresh_token,
                      expires_at = EXCLUDED.expires_at,
                      connected_at = NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(&grant.access_token)
        .bind(&grant.refresh_token)
        .bind(grant.expires_in)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to upsert ERP connection")?;

    // Connecting the ERP is the first-run setup step.
    let query = r"
        UPDATE users
        SET onboarding_completed = TRUE,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to mark onboarding completed")?;

    tx.commit().await.context("commit connection store")?;
    Ok(())
}

async fn delete_connection(pool: &PgPool, user_id: Uuid) -> Result<bool, ApiError> {
    let mut tx = pool.begin().await.map_err(anyhow::Error::from)?;

    let query = "DELETE FROM erp_connections WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .map_err(anyhow::Error::from)?;

    if result.rows_affected() == 0 {
        let _ = tx.rollback().await;
        return Ok(false);
    }

    let query = r"
        UPDATE users
        SET sync_status = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(SyncStatus::Idle.as_str())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .map_err(anyhow::Error::from)?;

    tx.commit().await.map_err(anyhow::Error::from)?;
    Ok(true)
}

async fn connection_exists(pool: &PgPool, user_id: Uuid) -> Result<bool, ApiError> {
    let query = "SELECT 1 FROM erp_connections WHERE user_id = $1 LIMIT 1";
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
    Ok(row.is_some())
}

async fn connection_status(pool: &PgPool, user_id: Uuid) -> Result<ErpStatusResponse, ApiError> {
    let query = r#"
        SELECT
            users.sync_status,
            to_char(users.last_synced_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
                AS last_synced_at,
            erp_connections.user_id IS NOT NULL AS connected
        FROM users
        LEFT JOIN erp_connections ON erp_connections.user_id = users.id
        WHERE users.id = $1
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
        .map_err(anyhow::Error::from)?
        .ok_or(ApiError::Unauthorized)?;

    let sync_status: String = row.get("sync_status");
    Ok(ErpStatusResponse {
        connected: row.get("connected"),
        sync_status: SyncStatus::from_str(&sync_status).unwrap_or(SyncStatus::Idle),
        last_synced_at: row.get("last_synced_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::rate_limit::{NoopRateLimiter, RateLimiter};
    use crate::api::handlers::auth::state::AuthConfig;
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

    fn erp_client() -> Result<Arc<ErpClient>> {
        Ok(Arc::new(ErpClient::new(
            "https://erp.test/oauth/authorize".to_string(),
            "https://api.erp.test/v3".to_string(),
            "client-123".to_string(),
            SecretString::from("shh"),
            "https://app.nexus.test",
        )?))
    }

    #[tokio::test]
    async fn connect_without_session_is_unauthorized() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let result = connect(
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()),
            Extension(erp_client()?),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        Ok(())
    }

    #[tokio::test]
    async fn callback_without_params_redirects_with_error() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = callback(
            Extension(pool),
            Extension(erp_client()?),
            Query(CallbackQuery {
                code: None,
                state: None,
            }),
        )
        .await;
        assert!(response.status().is_redirection());
        let location = response
            .headers()
            .get(axum::http::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert_eq!(location, "/bling?error=missing_params");
        Ok(())
    }

    #[tokio::test]
    async fn sync_without_session_is_unauthorized() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let result = sync(HeaderMap::new(), Extension(pool), Extension(auth_state())).await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        Ok(())
    }
}
