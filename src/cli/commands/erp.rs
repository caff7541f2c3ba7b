use clap::{Arg, ArgMatches, Command};

pub fn with_args(command: Command) -> Command {
    let command = with_oauth_args(command);
    with_sync_args(command)
}

fn with_oauth_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("erp-authorize-url")
                .long("erp-authorize-url")
                .help("ERP OAuth authorization endpoint")
                .env("NEXUS_ERP_AUTHORIZE_URL")
                .default_value("https://www.bling.com.br/Api/v3/oauth/authorize"),
        )
        .arg(
            Arg::new("erp-api-base")
                .long("erp-api-base")
                .help("ERP REST API base URL (token endpoint lives under it)")
                .env("NEXUS_ERP_API_BASE")
                .default_value("https://api.bling.com.br/Api/v3"),
        )
        .arg(
            Arg::new("erp-client-id")
                .long("erp-client-id")
                .help("ERP OAuth client id")
                .env("NEXUS_ERP_CLIENT_ID"),
        )
        .arg(
            Arg::new("erp-client-secret")
                .long("erp-client-secret")
                .help("ERP OAuth client secret")
                .env("NEXUS_ERP_CLIENT_SECRET"),
        )
}

fn with_sync_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("sync-poll-seconds")
                .long("sync-poll-seconds")
                .help("Sync job queue poll interval in seconds")
                .env("NEXUS_SYNC_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("sync-batch-size")
                .long("sync-batch-size")
                .help("Sync jobs claimed per poll")
                .env("NEXUS_SYNC_BATCH_SIZE")
                .default_value("2")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("sync-max-attempts")
                .long("sync-max-attempts")
                .help("Max attempts before marking a sync job as failed")
                .env("NEXUS_SYNC_MAX_ATTEMPTS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub authorize_url: String,
    pub api_base: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub sync_poll_seconds: u64,
    pub sync_batch_size: usize,
    pub sync_max_attempts: u32,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            authorize_url: matches
                .get_one::<String>("erp-authorize-url")
                .cloned()
                .unwrap_or_else(|| "https://www.bling.com.br/Api/v3/oauth/authorize".to_string()),
            api_base: matches
                .get_one::<String>("erp-api-base")
                .cloned()
                .unwrap_or_else(|| "https://api.bling.com.br/Api/v3".to_string()),
            client_id: matches.get_one::<String>("erp-client-id").cloned(),
            client_secret: matches.get_one::<String>("erp-client-secret").cloned(),
            sync_poll_seconds: matches
                .get_one::<u64>("sync-poll-seconds")
                .copied()
                .unwrap_or(5),
            sync_batch_size: matches
                .get_one::<usize>("sync-batch-size")
                .copied()
                .unwrap_or(2),
            sync_max_attempts: matches
                .get_one::<u32>("sync-max-attempts")
                .copied()
                .unwrap_or(3),
        }
    }
}
