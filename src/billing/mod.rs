//! Billing provider client (Stripe-style REST API).
//!
//! Handlers call this client to create checkout and portal sessions and
//! return the hosted URL to the browser; subscription lifecycle beyond that
//! is the provider's problem. Plan tier is read from the user row, sourced
//! from billing state out of band.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info_span, Instrument};

/// Hosted checkout session returned by the billing provider.
#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Hosted billing-portal session returned by the billing provider.
#[derive(Debug, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug)]
pub struct BillingClient {
    api_base: String,
    secret_key: SecretString,
    price_pro: Option<String>,
    app_base_url: String,
    client: Client,
}

impl BillingClient {
    /// Build a billing client for the given provider base URL.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_base: String,
        secret_key: SecretString,
        price_pro: Option<String>,
        app_base_url: String,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("Failed to build billing HTTP client")?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key,
            price_pro,
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Create a subscription checkout session for the PRO plan.
    ///
    /// # Errors
    /// Returns an error if no PRO price is configured or the provider call
    /// fails; callers log the detail and answer with a generic 500.
    pub async fn create_checkout_session(&self, customer_email: &str) -> Result<CheckoutSession> {
        let price = self
            .price_pro
            .as_deref()
            .ok_or_else(|| anyhow!("PRO price id is not configured"))?;

        let success_url = format!("{}/bling?checkout=success", self.app_base_url);
        let cancel_url = format!("{}/checkout", self.app_base_url);
        let params = [
            ("mode", "subscription"),
            ("customer_email", customer_email),
            ("line_items[0][price]", price),
            ("line_items[0][quantity]", "1"),
            ("success_url", success_url.as_str()),
            ("cancel_url", cancel_url.as_str()),
        ];

        self.post_form("/v1/checkout/sessions", &params)
            .await
            .context("failed to create checkout session")
    }

    /// Create a billing-portal session for an existing customer.
    ///
    /// # Errors
    /// Returns an error if the provider call fails.
    pub async fn create_portal_session(&self, customer_id: &str) -> Result<PortalSession> {
        let return_url = format!("{}/settings", self.app_base_url);
        let params = [
            ("customer", customer_id),
            ("return_url", return_url.as_str()),
        ];

        self.post_form("/v1/billing_portal/sessions", &params)
            .await
            .context("failed to create billing portal session")
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{path}", self.api_base);
        let span = info_span!(
            "billing.request",
            http.method = "POST",
            url = %url
        );
        async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(self.secret_key.expose_secret())
                .form(params)
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(anyhow!("billing request failed: {status}: {body}"));
            }

            serde_json::from_str(&body).context("invalid billing provider response")
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(price: Option<&str>) -> BillingClient {
        BillingClient::new(
            "https://api.billing.test/".to_string(),
            SecretString::from("sk_test_123"),
            price.map(str::to_string),
            "https://app.nexus.test/".to_string(),
        )
        .expect("billing client")
    }

    #[test]
    fn new_trims_trailing_slashes() {
        let client = client(Some("price_pro"));
        assert_eq!(client.api_base, "https://api.billing.test");
        assert_eq!(client.app_base_url, "https://app.nexus.test");
    }

    #[tokio::test]
    async fn checkout_without_price_is_an_error() {
        let client = client(None);
        let result = client.create_checkout_session("user@example.com").await;
        assert!(result.is_err());
    }

    #[test]
    fn checkout_session_deserializes() {
        let session: CheckoutSession = serde_json::from_str(
            r#"{"id":"cs_test_1","url":"https://checkout.billing.test/cs_test_1","object":"checkout.session"}"#,
        )
        .expect("checkout session");
        assert_eq!(session.id, "cs_test_1");
        assert!(session.url.starts_with("https://checkout."));
    }
}
