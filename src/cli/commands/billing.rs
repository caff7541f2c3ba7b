use clap::{Arg, ArgMatches, Command};

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("billing-api-base")
                .long("billing-api-base")
                .help("Billing provider API base URL")
                .env("NEXUS_BILLING_API_BASE")
                .default_value("https://api.stripe.com"),
        )
        .arg(
            Arg::new("billing-secret-key")
                .long("billing-secret-key")
                .help("Billing provider secret API key")
                .env("NEXUS_BILLING_SECRET_KEY"),
        )
        .arg(
            Arg::new("billing-price-pro")
                .long("billing-price-pro")
                .help("Billing price id for the PRO plan")
                .env("NEXUS_BILLING_PRICE_PRO"),
        )
}

#[derive(Debug)]
pub struct Options {
    pub api_base: String,
    pub secret_key: Option<String>,
    pub price_pro: Option<String>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            api_base: matches
                .get_one::<String>("billing-api-base")
                .cloned()
                .unwrap_or_else(|| "https://api.stripe.com".to_string()),
            secret_key: matches.get_one::<String>("billing-secret-key").cloned(),
            price_pro: matches.get_one::<String>("billing-price-pro").cloned(),
        }
    }
}
