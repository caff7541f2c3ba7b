//! ERP ("Bling") OAuth client.
//!
//! The authorization server itself is external; this module only builds the
//! authorize URL, exchanges the callback code for tokens, and refreshes
//! expired grants. Connection state (tokens, sync status) lives in the
//! database next to the user.

pub mod sync;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info_span, Instrument};
use url::Url;

/// Token grant returned by the ERP token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
}

#[derive(Debug)]
pub struct ErpClient {
    authorize_url: String,
    api_base: String,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
    client: Client,
}

impl ErpClient {
    /// Build an ERP client; the OAuth redirect URI is derived from the
    /// application base URL.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        authorize_url: String,
        api_base: String,
        client_id: String,
        client_secret: SecretString,
        app_base_url: &str,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("Failed to build ERP HTTP client")?;
        let redirect_uri = format!("{}/v1/erp/callback", app_base_url.trim_end_matches('/'));
        Ok(Self {
            authorize_url,
            api_base: api_base.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            redirect_uri,
            client,
        })
    }

    /// Build the browser-facing authorization URL for a connect attempt.
    ///
    /// # Errors
    /// Returns an error if the configured authorize endpoint is not a valid URL.
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let mut url =
            Url::parse(&self.authorize_url).context("Invalid ERP authorize endpoint")?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state);
        Ok(url.into())
    }

    /// Exchange an authorization code for an initial token grant.
    ///
    /// # Errors
    /// Returns an error if the token endpoint rejects the exchange.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        self.post_token(&params)
            .await
            .context("failed to exchange authorization code")
    }

    /// Refresh an expired access token.
    ///
    /// # Errors
    /// Returns an error if the token endpoint rejects the refresh.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.post_token(&params)
            .await
            .context("failed to refresh token grant")
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> Result<TokenGrant> {
        let url = format!("{}/oauth/token", self.api_base);
        let span = info_span!(
            "erp.token",
            http.method = "POST",
            url = %url
        );
        async {
            let response = self
                .client
                .post(&url)
                .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
                .form(params)
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(anyhow!("ERP token request failed: {status}: {body}"));
            }

            serde_json::from_str(&body).context("invalid ERP token response")
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ErpClient {
        ErpClient::new(
            "https://erp.test/oauth/authorize".to_string(),
            "https://api.erp.test/v3/".to_string(),
            "client-123".to_string(),
            SecretString::from("shh"),
            "https://app.nexus.test/",
        )
        .expect("erp client")
    }

    #[test]
    fn authorize_url_carries_oauth_params() -> Result<()> {
        let url = client().authorize_url("state-abc")?;
        let parsed = Url::parse(&url)?;
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("client_id".to_string(), "client-123".to_string())));
        assert!(pairs.contains(&("state".to_string(), "state-abc".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "https://app.nexus.test/v1/erp/callback".to_string()
        )));
        Ok(())
    }

    #[test]
    fn redirect_uri_derived_from_base_url_without_double_slash() {
        assert_eq!(
            client().redirect_uri,
            "https://app.nexus.test/v1/erp/callback"
        );
    }

    #[test]
    fn token_grant_deserializes() {
        let grant: TokenGrant = serde_json::from_str(
            r#"{"access_token":"at","refresh_token":"rt","expires_in":21600,"token_type":"bearer"}"#,
        )
        .expect("token grant");
        assert_eq!(grant.access_token, "at");
        assert_eq!(grant.expires_in, 21600);
    }
}
