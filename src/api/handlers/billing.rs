//! Billing endpoints: checkout, anonymous checkout, and the billing portal.
//!
//! Flow Overview: authenticate (except for the anonymous checkout), perform
//! one billing-provider call, and hand the hosted URL back to the browser.
//! The provider drives the subscription lifecycle; plan tier lands on the
//! user row out of band.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::error::ApiError;
use crate::billing::BillingClient;

use super::auth::principal::require_auth;
use super::auth::state::AuthState;
use super::auth::storage::lookup_user_by_id;
use super::auth::utils::{normalize_email, valid_email};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CheckoutAnonRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PortalResponse {
    pub portal_url: String,
}

/// Create a PRO checkout session for the signed-in user.
#[utoipa::path(
    post,
    path = "/v1/billing/checkout",
    responses(
        (status = 200, description = "Hosted checkout created", body = CheckoutResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 500, description = "Billing provider failure")
    ),
    tag = "billing"
)]
pub async fn checkout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    billing: Extension<Arc<BillingClient>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    let user = lookup_user_by_id(&pool, principal.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let session = billing.create_checkout_session(&user.email).await?;
    Ok((
        StatusCode::OK,
        Json(CheckoutResponse {
            checkout_url: session.url,
        }),
    )
        .into_response())
}

/// Create a checkout session for a visitor who has no account yet.
#[utoipa::path(
    post,
    path = "/v1/billing/checkout-anon",
    request_body = CheckoutAnonRequest,
    responses(
        (status = 200, description = "Hosted checkout created", body = CheckoutResponse),
        (status = 400, description = "Invalid email"),
        (status = 500, description = "Billing provider failure")
    ),
    tag = "billing"
)]
pub async fn checkout_anon(
    billing: Extension<Arc<BillingClient>>,
    payload: Option<Json<CheckoutAnonRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::validation("email", "Invalid email address"));
    }

    let session = billing.create_checkout_session(&email).await?;
    Ok((
        StatusCode::OK,
        Json(CheckoutResponse {
            checkout_url: session.url,
        }),
    )
        .into_response())
}

/// Open the billing portal for an existing customer.
#[utoipa::path(
    post,
    path = "/v1/billing/portal",
    responses(
        (status = 200, description = "Hosted portal created", body = PortalResponse),
        (status = 400, description = "No billing customer on file"),
        (status = 401, description = "Missing or invalid session"),
        (status = 500, description = "Billing provider failure")
    ),
    tag = "billing"
)]
pub async fn portal(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    billing: Extension<Arc<BillingClient>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;
    let user = lookup_user_by_id(&pool, principal.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let Some(customer_id) = user.billing_customer_id.as_deref() else {
        return Err(ApiError::BadRequest("No billing customer on file"));
    };

    let session = billing.create_portal_session(customer_id).await?;
    Ok((
        StatusCode::OK,
        Json(PortalResponse {
            portal_url: session.url,
        }),
    )
        .into_response())
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

    fn billing_client() -> Result<Arc<BillingClient>> {
        Ok(Arc::new(BillingClient::new(
            "https://api.billing.test".to_string(),
            SecretString::from("sk_test"),
            Some("price_pro".to_string()),
            "https://app.nexus.test".to_string(),
        )?))
    }

    #[tokio::test]
    async fn checkout_without_session_is_unauthorized() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let result = checkout(
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()),
            Extension(billing_client()?),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        Ok(())
    }

    #[tokio::test]
    async fn checkout_anon_rejects_bad_email() -> Result<()> {
        let result = checkout_anon(
            Extension(billing_client()?),
            Some(Json(CheckoutAnonRequest {
                email: "nope".to_string(),
            })),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
        Ok(())
    }
}
