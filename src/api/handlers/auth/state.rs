//! Auth state and configuration.

use secrecy::SecretString;
use std::sync::Arc;

use super::rate_limit::RateLimiter;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_TWO_FACTOR_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_EMAIL_TOKEN_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;
const DEFAULT_TOTP_ISSUER: &str = "Nexus OS";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    session_ttl_seconds: i64,
    two_factor_ttl_seconds: i64,
    email_token_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
    totp_issuer: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            two_factor_ttl_seconds: DEFAULT_TWO_FACTOR_TTL_SECONDS,
            email_token_ttl_seconds: DEFAULT_EMAIL_TOKEN_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_two_factor_ttl_seconds(mut self, seconds: i64) -> Self {
        self.two_factor_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_email_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.email_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn two_factor_ttl_seconds(&self) -> i64 {
        self.two_factor_ttl_seconds
    }

    pub(crate) fn email_token_ttl_seconds(&self) -> i64 {
        self.email_token_ttl_seconds
    }

    pub(crate) fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    session_secret: SecretString,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        session_secret: SecretString,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            config,
            session_secret,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn session_secret(&self) -> &SecretString {
        &self.session_secret
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::{AuthConfig, AuthState};
    use secrecy::SecretString;
    use std::sync::Arc;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://app.nexusos.app".to_string());

        assert_eq!(config.base_url(), "https://app.nexusos.app");
        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert_eq!(
            config.two_factor_ttl_seconds(),
            super::DEFAULT_TWO_FACTOR_TTL_SECONDS
        );
        assert_eq!(config.totp_issuer(), super::DEFAULT_TOTP_ISSUER);
        assert!(config.session_cookie_secure());

        let config = config
            .with_session_ttl_seconds(120)
            .with_two_factor_ttl_seconds(30)
            .with_email_token_ttl_seconds(60)
            .with_resend_cooldown_seconds(15)
            .with_totp_issuer("Nexus Test".to_string());

        assert_eq!(config.session_ttl_seconds(), 120);
        assert_eq!(config.two_factor_ttl_seconds(), 30);
        assert_eq!(config.email_token_ttl_seconds(), 60);
        assert_eq!(config.resend_cooldown_seconds(), 15);
        assert_eq!(config.totp_issuer(), "Nexus Test");
    }

    #[test]
    fn plain_http_base_url_keeps_cookies_insecure() {
        let config = AuthConfig::new("http://localhost:8080".to_string());
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn auth_state_constructs_with_noop_rate_limiter() {
        let config = AuthConfig::new("https://app.nexusos.app".to_string());
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        let state = AuthState::new(config, SecretString::from("secret"), limiter);
        assert_eq!(state.config().base_url(), "https://app.nexusos.app");
    }
}
