use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};

pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_email_args(command);
    let command = with_outbox_args(command);
    with_feature_flag_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("session-secret")
                .long("session-secret")
                .help("Secret used to sign session tokens")
                .env("NEXUS_SESSION_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session token TTL in seconds")
                .env("NEXUS_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("two-factor-ttl-seconds")
                .long("two-factor-ttl-seconds")
                .help("TTL for the restricted session issued between password and OTP steps")
                .env("NEXUS_TWO_FACTOR_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_email_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-token-ttl-seconds")
                .long("email-token-ttl-seconds")
                .help("Activation/reset/invite token TTL in seconds")
                .env("NEXUS_EMAIL_TOKEN_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("email-resend-cooldown-seconds")
                .long("email-resend-cooldown-seconds")
                .help("Cooldown before resending activation emails")
                .env("NEXUS_EMAIL_RESEND_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("NEXUS_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("NEXUS_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("NEXUS_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
}

fn with_feature_flag_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("disable-home-page")
                .long("disable-home-page")
                .help("Redirect the home page to /login")
                .env("NEXUS_DISABLE_HOME_PAGE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("disable-signups")
                .long("disable-signups")
                .help("Redirect the signup page to /login")
                .env("NEXUS_DISABLE_SIGNUPS")
                .action(ArgAction::SetTrue),
        )
}

#[derive(Debug)]
pub struct Options {
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
}

impl Options {
    /// Extract auth/session options from validated matches.
    ///
    /// # Errors
    /// Returns an error if the session secret is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let session_secret = matches
            .get_one::<String>("session-secret")
            .cloned()
            .context("missing required argument: --session-secret")?;

        Ok(Self {
            session_secret,
            session_ttl_seconds: matches
                .get_one::<i64>("session-ttl-seconds")
                .copied()
                .unwrap_or(43200),
            two_factor_ttl_seconds: matches
                .get_one::<i64>("two-factor-ttl-seconds")
                .copied()
                .unwrap_or(600),
            email_token_ttl_seconds: matches
                .get_one::<i64>("email-token-ttl-seconds")
                .copied()
                .unwrap_or(1800),
            email_resend_cooldown_seconds: matches
                .get_one::<i64>("email-resend-cooldown-seconds")
                .copied()
                .unwrap_or(60),
            email_outbox_poll_seconds: matches
                .get_one::<u64>("email-outbox-poll-seconds")
                .copied()
                .unwrap_or(5),
            email_outbox_batch_size: matches
                .get_one::<usize>("email-outbox-batch-size")
                .copied()
                .unwrap_or(10),
            email_outbox_max_attempts: matches
                .get_one::<u32>("email-outbox-max-attempts")
                .copied()
                .unwrap_or(5),
            home_page_disabled: matches.get_flag("disable-home-page"),
            signups_disabled: matches.get_flag("disable-signups"),
        })
    }
}
