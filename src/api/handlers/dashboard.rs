//! Dashboard read endpoints: alerts, overview metrics, and the first-impact
//! report.
//!
//! These are pure reads over rows the sync pipeline precomputes; no alert or
//! metric math happens here. Until the first sync lands there is simply
//! nothing to return, which surfaces as 404 for the singleton reports and an
//! empty list for alerts.

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::ApiError;

use super::auth::principal::require_auth;
use super::auth::state::AuthState;

/// Alert categories produced by the sync pipeline.
pub const ALERT_TYPES: &[&str] = &[
    "EXCESS_STOCK",
    "RUPTURE_RISK",
    "DEAD_STOCK",
    "PRICING_OPPORTUNITY",
];

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    /// Optional filter on the alert category.
    pub r#type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertResponse {
    pub id: String,
    pub sku: String,
    pub product_name: String,
    pub alert_type: String,
    /// CRITICAL, HIGH, MEDIUM, or LOW.
    pub severity: String,
    /// Inventory capital tied up in this product, in cents.
    pub capital_tied_cents: i64,
    /// Sales velocity (volume sold per day) at computation time.
    pub vvd: f64,
    pub computed_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OverviewMetricsResponse {
    pub total_skus: i64,
    pub stock_capital_cents: i64,
    pub excess_capital_cents: i64,
    pub rupture_risk_count: i64,
    pub dead_stock_count: i64,
    pub computed_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FirstImpactResponse {
    pub potential_savings_cents: i64,
    pub quick_wins: Vec<String>,
    pub computed_at: String,
}

/// List inventory-health alerts, optionally filtered by category.
#[utoipa::path(
    get,
    path = "/v1/dashboard/alerts",
    params(
        ("type" = Option<String>, Query, description = "Alert category filter")
    ),
    responses(
        (status = 200, description = "Alerts for the signed-in user", body = [AlertResponse]),
        (status = 400, description = "Unknown alert category"),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "dashboard"
)]
pub async fn alerts(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Query(query): Query<AlertsQuery>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;

    let alert_type = match query.r#type.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => {
            let upper = value.to_uppercase();
            if !ALERT_TYPES.contains(&upper.as_str()) {
                return Err(ApiError::validation("type", "Unknown alert category"));
            }
            Some(upper)
        }
    };

    let list = fetch_alerts(&pool, principal.user_id, alert_type.as_deref()).await?;
    Ok((StatusCode::OK, Json(list)).into_response())
}

/// Aggregate inventory metrics for the dashboard header.
#[utoipa::path(
    get,
    path = "/v1/dashboard/overview-metrics",
    responses(
        (status = 200, description = "Latest computed metrics", body = OverviewMetricsResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "No metrics computed yet")
    ),
    tag = "dashboard"
)]
pub async fn overview_metrics(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    let metrics = fetch_overview_metrics(&pool, principal.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok((StatusCode::OK, Json(metrics)).into_response())
}

/// One-shot report shown right after the first successful sync.
#[utoipa::path(
    get,
    path = "/v1/dashboard/first-impact",
    responses(
        (status = 200, description = "First-impact report", body = FirstImpactResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "No report computed yet")
    ),
    tag = "dashboard"
)]
pub async fn first_impact(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    let report = fetch_first_impact(&pool, principal.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok((StatusCode::OK, Json(report)).into_response())
}

async fn fetch_alerts(
    pool: &PgPool,
    user_id: Uuid,
    alert_type: Option<&str>,
) -> Result<Vec<AlertResponse>, ApiError> {
    let query = r#"
        SELECT
            id::text AS id,
            sku,
            product_name,
            alert_type,
            severity,
            capital_tied_cents,
            vvd,
            to_char(computed_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS computed_at
        FROM inventory_alerts
        WHERE user_id = $1
          AND ($2::text IS NULL OR alert_type = $2)
        ORDER BY
            CASE severity
                WHEN 'CRITICAL' THEN 0
                WHEN 'HIGH' THEN 1
                WHEN 'MEDIUM' THEN 2
                ELSE 3
            END,
            computed_at DESC
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .bind(alert_type)
        .fetch_all(pool)
        .instrument(span)
        .await
        .map_err(anyhow::Error::from)?;

    Ok(rows
        .into_iter()
        .map(|row| AlertResponse {
            id: row.get("id"),
            sku: row.get("sku"),
            product_name: row.get("product_name"),
            alert_type: row.get("alert_type"),
            severity: row.get("severity"),
            capital_tied_cents: row.get("capital_tied_cents"),
            vvd: row.get("vvd"),
            computed_at: row.get("computed_at"),
        })
        .collect())
}

async fn fetch_overview_metrics(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<OverviewMetricsResponse>, ApiError> {
    let query = r#"
        SELECT
            total_skus,
            stock_capital_cents,
            excess_capital_cents,
            rupture_risk_count,
            dead_stock_count,
            to_char(computed_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS computed_at
        FROM overview_metrics
        WHERE user_id = $1
        ORDER BY computed_at DESC
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

    Ok(row.map(|row| OverviewMetricsResponse {
        total_skus: row.get("total_skus"),
        stock_capital_cents: row.get("stock_capital_cents"),
        excess_capital_cents: row.get("excess_capital_cents"),
        rupture_risk_count: row.get("rupture_risk_count"),
        dead_stock_count: row.get("dead_stock_count"),
        computed_at: row.get("computed_at"),
    }))
}

async fn fetch_first_impact(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<FirstImpactResponse>, ApiError> {
    let query = r#"
        SELECT
            potential_savings_cents,
            quick_wins,
            to_char(computed_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS computed_at
        FROM first_impact_reports
        WHERE user_id = $1
        ORDER BY computed_at DESC
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

    Ok(row.map(|row| FirstImpactResponse {
        potential_savings_cents: row.get("potential_savings_cents"),
        quick_wins: row.get("quick_wins"),
        computed_at: row.get("computed_at"),
    }))
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

    #[tokio::test]
    async fn alerts_without_session_is_unauthorized() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let result = alerts(
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()),
            Query(AlertsQuery { r#type: None }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        Ok(())
    }

    #[test]
    fn alert_type_registry_matches_glossary() {
        assert!(ALERT_TYPES.contains(&"EXCESS_STOCK"));
        assert!(ALERT_TYPES.contains(&"RUPTURE_RISK"));
        assert!(ALERT_TYPES.contains(&"DEAD_STOCK"));
        assert!(ALERT_TYPES.contains(&"PRICING_OPPORTUNITY"));
    }
}
