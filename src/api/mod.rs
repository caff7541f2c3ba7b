//! HTTP server assembly: routes, layers, background workers, startup.

use crate::{
    billing::BillingClient,
    erp::{sync::SyncWorkerConfig, ErpClient},
    gate::{self, GateConfig, GateState},
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware,
    routing::{get, post},
    Extension, Router,
};
use secrecy::SecretString;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod email;
pub mod error;
pub mod handlers;
mod openapi;

pub use openapi::ApiDoc;

use handlers::auth::{self, rate_limit::InMemoryRateLimiter, AuthConfig, AuthState};

/// Assemble the full application router: the JSON API, the gated pages, and
/// the docs UI. Shared state rides in request extensions the way every
/// handler expects.
#[must_use]
pub fn app(
    pool: PgPool,
    auth_state: Arc<AuthState>,
    billing: Arc<BillingClient>,
    erp: Arc<ErpClient>,
    gate_state: Arc<GateState>,
) -> Router {
    let api = Router::new()
        .route("/v1/auth/signup", post(auth::signup))
        .route("/v1/auth/activate", post(auth::activate))
        .route("/v1/auth/resend-activation", post(auth::resend_activation))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/logout", post(auth::logout))
        .route("/v1/auth/password-reset", post(auth::password_reset_request))
        .route(
            "/v1/auth/password-reset/confirm",
            post(auth::password_reset_confirm),
        )
        .route("/v1/auth/2fa/enable", post(auth::two_factor_enable))
        .route("/v1/auth/2fa/verify", post(auth::two_factor_verify))
        .route("/v1/auth/2fa/disable", post(auth::two_factor_disable))
        .route("/v1/session", get(auth::session))
        .route("/v1/billing/checkout", post(handlers::billing::checkout))
        .route(
            "/v1/billing/checkout-anon",
            post(handlers::billing::checkout_anon),
        )
        .route("/v1/billing/portal", post(handlers::billing::portal))
        .route("/v1/erp/connect", get(handlers::erp::connect))
        .route("/v1/erp/callback", get(handlers::erp::callback))
        .route("/v1/erp/disconnect", post(handlers::erp::disconnect))
        .route("/v1/erp/status", get(handlers::erp::status))
        .route("/v1/erp/sync", post(handlers::erp::sync))
        .route("/v1/dashboard/alerts", get(handlers::dashboard::alerts))
        .route(
            "/v1/dashboard/overview-metrics",
            get(handlers::dashboard::overview_metrics),
        )
        .route(
            "/v1/dashboard/first-impact",
            get(handlers::dashboard::first_impact),
        )
        .route("/v1/users", get(handlers::users::list_users))
        .route("/v1/users/invite", post(handlers::users::invite_user))
        .route(
            "/v1/users/invite-verify",
            post(handlers::users::invite_verify),
        )
        .route("/v1/users/:id", get(handlers::users::get_user))
        .route("/health", get(handlers::health::health));

    // Only page navigation passes the gate; API and assets answer their own
    // 401/403s.
    let pages = handlers::pages::router().layer(middleware::from_fn_with_state(
        gate_state,
        gate::authorize,
    ));

    Router::new()
        .merge(api)
        .merge(pages)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(Extension(pool))
        .layer(Extension(auth_state))
        .layer(Extension(billing))
        .layer(Extension(erp))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
#[allow(clippy::too_many_arguments)]
pub async fn new(
    port: u16,
    dsn: String,
    session_secret: SecretString,
    gate_config: GateConfig,
    auth_config: AuthConfig,
    email_config: email::EmailWorkerConfig,
    sync_config: SyncWorkerConfig,
    billing: Arc<BillingClient>,
    erp: Arc<ErpClient>,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    // The resend throttle window doubles as the generic rate-limit window.
    let window = u64::try_from(auth_config.resend_cooldown_seconds()).unwrap_or(60);
    let rate_limiter = Arc::new(InMemoryRateLimiter::new(Duration::from_secs(window)));
    let auth_state = Arc::new(AuthState::new(
        auth_config,
        session_secret.clone(),
        rate_limiter,
    ));
    let gate_state = Arc::new(GateState::new(gate_config, session_secret));

    // Background workers: transactional email outbox and the sync-job queue.
    email::spawn_outbox_worker(
        pool.clone(),
        Arc::new(email::LogEmailSender),
        email_config,
    );
    crate::erp::sync::spawn_sync_worker(
        pool.clone(),
        Arc::new(crate::erp::sync::LogSyncRunner),
        sync_config,
    );

    let origin = app_origin(auth_state.config().base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true);

    let app = app(pool, auth_state, billing, erp, gate_state).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn app_origin(base_url: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(base_url).with_context(|| format!("Invalid base URL: {base_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Base URL must include a valid host: {base_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build origin header")
}
