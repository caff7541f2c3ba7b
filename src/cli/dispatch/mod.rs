//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the HTTP server with its full
//! configuration state.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, billing, erp};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let base_url = matches
        .get_one::<String>("base-url")
        .cloned()
        .context("missing required argument: --base-url")?;

    let auth_opts = auth::Options::parse(matches)?;
    let billing_opts = billing::Options::parse(matches);
    let erp_opts = erp::Options::parse(matches);

    Ok(Action::Server(Box::new(Args {
        port,
        dsn,
        base_url,
        session_secret: auth_opts.session_secret,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        two_factor_ttl_seconds: auth_opts.two_factor_ttl_seconds,
        email_token_ttl_seconds: auth_opts.email_token_ttl_seconds,
        email_resend_cooldown_seconds: auth_opts.email_resend_cooldown_seconds,
        email_outbox_poll_seconds: auth_opts.email_outbox_poll_seconds,
        email_outbox_batch_size: auth_opts.email_outbox_batch_size,
        email_outbox_max_attempts: auth_opts.email_outbox_max_attempts,
        home_page_disabled: auth_opts.home_page_disabled,
        signups_disabled: auth_opts.signups_disabled,
        billing_api_base: billing_opts.api_base,
        billing_secret_key: billing_opts.secret_key,
        billing_price_pro: billing_opts.price_pro,
        erp_authorize_url: erp_opts.authorize_url,
        erp_api_base: erp_opts.api_base,
        erp_client_id: erp_opts.client_id,
        erp_client_secret: erp_opts.client_secret,
        sync_poll_seconds: erp_opts.sync_poll_seconds,
        sync_batch_size: erp_opts.sync_batch_size,
        sync_max_attempts: erp_opts.sync_max_attempts,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::Action;

    #[test]
    fn handler_builds_server_action_from_matches() -> Result<()> {
        temp_env::with_vars(
            [
                ("NEXUS_SESSION_SECRET", Some("dispatch-test-secret")),
                ("NEXUS_DISABLE_HOME_PAGE", Some("true")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec![
                    "nexus",
                    "--dsn",
                    "postgres://user@localhost:5432/nexus",
                    "--port",
                    "9000",
                ]);
                let action = handler(&matches)?;
                let Action::Server(args) = action;
                assert_eq!(args.port, 9000);
                assert_eq!(args.dsn, "postgres://user@localhost:5432/nexus");
                assert_eq!(args.session_secret, "dispatch-test-secret");
                assert!(args.home_page_disabled);
                assert!(!args.signups_disabled);
                assert_eq!(args.sync_batch_size, 2);
                Ok(())
            },
        )
    }
}
