use crate::{
    api,
    billing::BillingClient,
    cli::actions::Action,
    erp::{sync::SyncWorkerConfig, ErpClient},
    gate::GateConfig,
};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub base_url: String,
    pub session_secret: String,
    pub session_ttl_seconds: i64,
    pub two_factor_ttl_seconds: i64,
    pub email_token_ttl_seconds: i64,
    pub email_resend_cooldown_seconds: i64,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub home_page_disabled: bool,
    pub signups_disabled: bool,
    pub billing_api_base: String,
    pub billing_secret_key: Option<String>,
    pub billing_price_pro: Option<String>,
    pub erp_authorize_url: String,
    pub erp_api_base: String,
    pub erp_client_id: Option<String>,
    pub erp_client_secret: Option<String>,
    pub sync_poll_seconds: u64,
    pub sync_batch_size: usize,
    pub sync_max_attempts: u32,
}

/// Execute the server action.
/// # Errors
/// Returns an error if client construction or server startup fails.
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server(args) = action;

    if args.billing_secret_key.is_none() {
        warn!("billing secret key not configured; checkout/portal endpoints will fail upstream");
    }
    if args.erp_client_id.is_none() || args.erp_client_secret.is_none() {
        warn!("ERP OAuth credentials not configured; connect/callback endpoints will fail upstream");
    }

    let auth_config = api::handlers::auth::AuthConfig::new(args.base_url.clone())
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_two_factor_ttl_seconds(args.two_factor_ttl_seconds)
        .with_email_token_ttl_seconds(args.email_token_ttl_seconds)
        .with_resend_cooldown_seconds(args.email_resend_cooldown_seconds);

    let gate_config = GateConfig {
        home_enabled: !args.home_page_disabled,
        signup_enabled: !args.signups_disabled,
    };

    let email_config = api::email::EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts);

    let sync_config = SyncWorkerConfig::new()
        .with_poll_interval_seconds(args.sync_poll_seconds)
        .with_batch_size(args.sync_batch_size)
        .with_max_attempts(args.sync_max_attempts);

    let billing = Arc::new(BillingClient::new(
        args.billing_api_base,
        SecretString::from(args.billing_secret_key.unwrap_or_default()),
        args.billing_price_pro,
        args.base_url.clone(),
    )?);

    let erp = Arc::new(ErpClient::new(
        args.erp_authorize_url,
        args.erp_api_base,
        args.erp_client_id.unwrap_or_default(),
        SecretString::from(args.erp_client_secret.unwrap_or_default()),
        &args.base_url,
    )?);

    api::new(
        args.port,
        args.dsn,
        SecretString::from(args.session_secret),
        gate_config,
        auth_config,
        email_config,
        sync_config,
        billing,
        erp,
    )
    .await
}
