//! End-to-end checks of the authorization gate over the page router.
//!
//! The app router is assembled exactly as in production (gate middleware over
//! the pages, lazily-connected database pool); requests are driven through
//! `tower::ServiceExt::oneshot`, so no network or database is required —
//! none of the gated pages touch storage.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use nexus::{
    api,
    api::handlers::auth::{
        rate_limit::{NoopRateLimiter, RateLimiter},
        AuthConfig, AuthState,
    },
    billing::BillingClient,
    erp::ErpClient,
    gate::{GateConfig, GateState},
    session::{sign_hs256, Role, SessionClaims},
};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::SystemTime;
use tower::ServiceExt;

const SECRET: &str = "gate-test-secret-with-enough-entropy";

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn build_app(config: GateConfig) -> Result<Router> {
    let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
    let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
    let auth_state = Arc::new(AuthState::new(
        AuthConfig::new("http://localhost:8080".to_string()),
        SecretString::from(SECRET),
        limiter,
    ));
    let billing = Arc::new(BillingClient::new(
        "https://api.billing.test".to_string(),
        SecretString::from("sk_test"),
        Some("price_pro".to_string()),
        "http://localhost:8080".to_string(),
    )?);
    let erp = Arc::new(ErpClient::new(
        "https://erp.test/oauth/authorize".to_string(),
        "https://api.erp.test/v3".to_string(),
        "client".to_string(),
        SecretString::from("shh"),
        "http://localhost:8080",
    )?);
    let gate_state = Arc::new(GateState::new(config, SecretString::from(SECRET)));
    Ok(api::app(pool, auth_state, billing, erp, gate_state))
}

fn session_cookie(role: Role, required_2fa: bool) -> Result<String> {
    let claims = SessionClaims::new("c0ffee00-0000-4000-8000-000000000001".to_string(), role, now_unix(), 3600)
        .with_required_2fa(required_2fa);
    let token = sign_hs256(SECRET.as_bytes(), &claims)?;
    Ok(format!("nexus_session={token}"))
}

async fn get_with_cookie(app: Router, path: &str, cookie: Option<&str>) -> Result<(StatusCode, Option<String>)> {
    let mut builder = Request::builder().uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let response = app
        .oneshot(builder.body(Body::empty()).context("build request")?)
        .await
        .context("drive request")?;
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    Ok((response.status(), location))
}

#[tokio::test]
async fn unauthenticated_private_page_redirects_to_login_with_redirect_param() -> Result<()> {
    let app = build_app(GateConfig::default())?;
    let (status, location) = get_with_cookie(app, "/dashboard", None).await?;
    assert!(status.is_redirection(), "got {status}");
    assert_eq!(location.as_deref(), Some("/login?redirect=%2Fdashboard"));
    Ok(())
}

#[tokio::test]
async fn tampered_token_is_treated_as_no_token() -> Result<()> {
    let app = build_app(GateConfig::default())?;
    let mut cookie = session_cookie(Role::SuperAdmin, false)?;
    // Corrupt the signature: flip the final character.
    let flipped = if cookie.ends_with('A') { 'B' } else { 'A' };
    cookie.pop();
    cookie.push(flipped);
    let (status, location) = get_with_cookie(app, "/dashboard", Some(&cookie)).await?;
    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some("/login?redirect=%2Fdashboard"));
    Ok(())
}

#[tokio::test]
async fn expired_token_is_treated_as_no_token() -> Result<()> {
    let app = build_app(GateConfig::default())?;
    let claims = SessionClaims::new(
        "c0ffee00-0000-4000-8000-000000000001".to_string(),
        Role::User,
        now_unix() - 7200,
        3600,
    );
    let token = sign_hs256(SECRET.as_bytes(), &claims)?;
    let cookie = format!("nexus_session={token}");
    let (status, location) = get_with_cookie(app, "/dashboard", Some(&cookie)).await?;
    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some("/login?redirect=%2Fdashboard"));
    Ok(())
}

#[tokio::test]
async fn pending_two_factor_session_is_denied_private_pages() -> Result<()> {
    let app = build_app(GateConfig::default())?;
    let cookie = session_cookie(Role::SuperAdmin, true)?;
    let (status, location) = get_with_cookie(app, "/dashboard", Some(&cookie)).await?;
    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some("/login"));
    Ok(())
}

#[tokio::test]
async fn pending_two_factor_session_reaches_the_two_factor_page() -> Result<()> {
    let app = build_app(GateConfig::default())?;
    let cookie = session_cookie(Role::User, true)?;
    let (status, _) = get_with_cookie(app, "/two-factor", Some(&cookie)).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn signed_in_user_is_bounced_from_auth_pages_to_landing() -> Result<()> {
    for path in ["/login", "/signup", "/reset-password"] {
        let app = build_app(GateConfig::default())?;
        let cookie = session_cookie(Role::User, false)?;
        let (status, location) = get_with_cookie(app, path, Some(&cookie)).await?;
        assert!(status.is_redirection(), "{path} gave {status}");
        assert_eq!(location.as_deref(), Some("/bling"), "{path}");
    }
    Ok(())
}

#[tokio::test]
async fn user_role_is_denied_super_admin_pages() -> Result<()> {
    let app = build_app(GateConfig::default())?;
    let cookie = session_cookie(Role::User, false)?;
    let (status, location) = get_with_cookie(app, "/users", Some(&cookie)).await?;
    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some("/sem-permissao"));
    Ok(())
}

#[tokio::test]
async fn super_admin_reaches_the_users_page() -> Result<()> {
    let app = build_app(GateConfig::default())?;
    let cookie = session_cookie(Role::SuperAdmin, false)?;
    let (status, _) = get_with_cookie(app, "/users", Some(&cookie)).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn admin_reaches_admin_but_not_users() -> Result<()> {
    let cookie = session_cookie(Role::Admin, false)?;

    let app = build_app(GateConfig::default())?;
    let (status, _) = get_with_cookie(app, "/admin", Some(&cookie)).await?;
    assert_eq!(status, StatusCode::OK);

    let app = build_app(GateConfig::default())?;
    let (status, location) = get_with_cookie(app, "/users", Some(&cookie)).await?;
    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some("/sem-permissao"));
    Ok(())
}

#[tokio::test]
async fn disabled_home_flag_redirects_even_with_a_session() -> Result<()> {
    let config = GateConfig {
        home_enabled: false,
        signup_enabled: true,
    };
    let app = build_app(config)?;
    let (status, location) = get_with_cookie(app, "/", None).await?;
    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some("/login"));

    let app = build_app(config)?;
    let cookie = session_cookie(Role::SuperAdmin, false)?;
    let (status, location) = get_with_cookie(app, "/", Some(&cookie)).await?;
    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some("/login"));
    Ok(())
}

#[tokio::test]
async fn disabled_signup_flag_redirects_to_login() -> Result<()> {
    let config = GateConfig {
        home_enabled: true,
        signup_enabled: false,
    };
    let app = build_app(config)?;
    let (status, location) = get_with_cookie(app, "/signup", None).await?;
    assert!(status.is_redirection());
    assert_eq!(location.as_deref(), Some("/login"));
    Ok(())
}

#[tokio::test]
async fn public_pages_and_health_pass_through() -> Result<()> {
    for path in ["/", "/activate", "/sem-permissao", "/health"] {
        let app = build_app(GateConfig::default())?;
        let (status, _) = get_with_cookie(app, path, None).await?;
        assert_eq!(status, StatusCode::OK, "{path}");
    }
    Ok(())
}

#[tokio::test]
async fn query_string_is_preserved_in_the_redirect_param() -> Result<()> {
    let app = build_app(GateConfig::default())?;
    let (status, location) = get_with_cookie(app, "/dashboard?tab=alerts", None).await?;
    assert!(status.is_redirection());
    assert_eq!(
        location.as_deref(),
        Some("/login?redirect=%2Fdashboard%3Ftab%3Dalerts")
    );
    Ok(())
}
