//! spacemig - provision a content space environment and run pending migrations

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use spacemig_core::{ConfigSource, Orchestrator, RunContext, RunReport};
use spacemig_remote::{CommandExecutor, ManagementClient, DEFAULT_API_URL};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn build_cli() -> Command {
    Command::new("spacemig")
        .version(spacemig_core::VERSION)
        .about("Provision a content space environment and run pending migrations")
        .arg(
            Arg::new("space-id")
                .long("space-id")
                .required(true)
                .help("Space owning the environments"),
        )
        .arg(
            Arg::new("environment")
                .long("environment")
                .short('e')
                .required(true)
                .help("Target environment name"),
        )
        .arg(
            Arg::new("access-token")
                .long("access-token")
                .env("CONTENTFUL_MANAGEMENT_TOKEN")
                .hide_env_values(true)
                .required(true)
                .help("Content management API token"),
        )
        .arg(
            Arg::new("migrations-dir")
                .long("migrations-dir")
                .default_value("migrations")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Directory holding migration files"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_parser(clap::value_parser!(PathBuf))
                .help("Config file (.toml, .yaml or .json)"),
        )
        .arg(
            Arg::new("api-url")
                .long("api-url")
                .default_value(DEFAULT_API_URL)
                .help("Content management API base URL"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .default_value("info")
                .help("Log filter used when RUST_LOG is unset"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
}

/// Parsed command line
#[derive(Clone, PartialEq, Eq)]
struct CliArgs {
    space_id: String,
    environment: String,
    access_token: String,
    migrations_dir: PathBuf,
    config: ConfigSource,
    api_url: String,
    log_level: String,
    log_json: bool,
}

impl CliArgs {
    fn from_matches(matches: &ArgMatches) -> anyhow::Result<Self> {
        let string = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .with_context(|| format!("missing --{id}"))
        };

        Ok(Self {
            space_id: string("space-id")?,
            environment: string("environment")?,
            access_token: string("access-token")?,
            migrations_dir: matches
                .get_one::<PathBuf>("migrations-dir")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("migrations")),
            config: matches
                .get_one::<PathBuf>("config")
                .cloned()
                .map_or(ConfigSource::Defaults, ConfigSource::File),
            api_url: string("api-url")?,
            log_level: string("log-level")?,
            log_json: matches.get_flag("log-json"),
        })
    }
}

impl std::fmt::Debug for CliArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliArgs")
            .field("space_id", &self.space_id)
            .field("environment", &self.environment)
            .field("access_token", &"<redacted>")
            .field("migrations_dir", &self.migrations_dir)
            .field("config", &self.config)
            .field("api_url", &self.api_url)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .finish()
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

async fn run(args: &CliArgs) -> anyhow::Result<RunReport> {
    let settings = args.config.load().context("failed to load config")?;

    let client = ManagementClient::new(&args.api_url, &args.space_id, &args.access_token)
        .context("failed to create management client")?;
    let executor = CommandExecutor::new(&settings.executor);

    let ctx = RunContext::new(&args.space_id, &args.environment, &args.access_token)
        .with_migrations_dir(&args.migrations_dir)
        .with_settings(settings);

    let report = Orchestrator::new(Arc::new(client), Arc::new(executor))
        .run(&ctx)
        .await
        .with_context(|| format!("migration of {} failed", args.environment))?;
    Ok(report)
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();
    let args = match CliArgs::from_matches(&matches) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(2);
        }
    };

    init_tracing(&args.log_level, args.log_json);

    match run(&args).await {
        Ok(report) => {
            if report.has_warnings() {
                tracing::warn!(
                    "Finished {} with {} warnings",
                    report.environment_id,
                    report.warnings.len()
                );
            }
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
