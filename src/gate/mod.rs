//! Authorization gate for page routes.
//!
//! Every non-API, non-asset request passes through [`authorize`] before any
//! page handler runs. The gate decodes the session cookie, consults the
//! route classifier, and either redirects or passes the request through
//! unmodified. It never mutates state and never errors: a token that fails
//! verification is treated exactly like a missing token.

pub mod classifier;

use axum::{
    extract::{Request, State},
    http::header::COOKIE,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;
use url::form_urlencoded;

use crate::session::{verify_hs256, SessionClaims, SESSION_COOKIE_NAME};
use classifier::classify;

pub const HOME_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const SIGNUP_PATH: &str = "/signup";
/// Authenticated landing page after login.
pub const LANDING_PATH: &str = "/bling";
pub const NOT_AUTHORIZED_PATH: &str = "/sem-permissao";

/// Feature flags consulted before any session logic.
#[derive(Clone, Copy, Debug)]
pub struct GateConfig {
    pub home_enabled: bool,
    pub signup_enabled: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            home_enabled: true,
            signup_enabled: true,
        }
    }
}

/// Shared state for the gate middleware.
pub struct GateState {
    config: GateConfig,
    session_secret: SecretString,
}

impl GateState {
    #[must_use]
    pub fn new(config: GateConfig, session_secret: SecretString) -> Self {
        Self {
            config,
            session_secret,
        }
    }
}

/// Outcome of the gate's decision table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GateDecision {
    Allow,
    Redirect(String),
}

/// axum middleware wrapper around [`decide`].
pub async fn authorize(
    State(gate): State<Arc<GateState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let claims = decode_session(&request, &gate.session_secret);

    match decide(&path, query.as_deref(), claims.as_ref(), gate.config) {
        GateDecision::Allow => next.run(request).await,
        GateDecision::Redirect(target) => {
            debug!(path = %path, target = %target, "gate redirect");
            Redirect::to(&target).into_response()
        }
    }
}

/// The decision table of the authorization gate, evaluated in order; the
/// first matching rule redirects.
#[must_use]
pub fn decide(
    path: &str,
    query: Option<&str>,
    claims: Option<&SessionClaims>,
    config: GateConfig,
) -> GateDecision {
    // 1-2. Feature flags win over everything, session or not.
    if path == HOME_PATH && !config.home_enabled {
        return GateDecision::Redirect(LOGIN_PATH.to_string());
    }
    if path == SIGNUP_PATH && !config.signup_enabled {
        return GateDecision::Redirect(LOGIN_PATH.to_string());
    }

    let class = classify(path);

    // 3. Valid session: two-factor gating, auth-page bounce, role check.
    if let Some(claims) = claims {
        if class.is_private_route && claims.required_2fa {
            return GateDecision::Redirect(LOGIN_PATH.to_string());
        }
        if class.is_auth_route && !claims.required_2fa {
            return GateDecision::Redirect(LANDING_PATH.to_string());
        }
        if let Some(min_role) = class.min_role {
            if claims.role < min_role {
                return GateDecision::Redirect(NOT_AUTHORIZED_PATH.to_string());
            }
        }
        return GateDecision::Allow;
    }

    // 4. No valid session: private pages go to login, original URL preserved.
    if class.is_private_route {
        let original = match query {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        };
        let encoded: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("redirect", &original)
            .finish();
        return GateDecision::Redirect(format!("{LOGIN_PATH}?{encoded}"));
    }

    // 5. Everything else passes through unmodified.
    GateDecision::Allow
}

/// Decode the session cookie; any failure degrades to "no token".
fn decode_session(request: &Request, secret: &SecretString) -> Option<SessionClaims> {
    let token = extract_session_cookie(request)?;
    let now = now_unix_seconds();
    verify_hs256(&token, secret.expose_secret().as_bytes(), now).ok()
}

fn extract_session_cookie(request: &Request) -> Option<String> {
    let header = request.headers().get(COOKIE)?;
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

pub(crate) fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
