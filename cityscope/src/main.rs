mod config;

use crate::config::{CommonConfig, Config, ConfigError, LoggingConfig, MetricsConfig};
use clap::{Args, Parser, Subcommand};
use gateway::errors::GatewayError;
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cityscope", about = "City data aggregation gateway")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve `GET /city/{name}`
    Gateway(ConfigArgs),
    /// Parse and validate a config file, then exit
    ValidateConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, short, default_value = "config.yaml")]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("config has no gateway section")]
    MissingGatewayConfig,
    #[error("invalid configuration: {0}")]
    Validation(#[from] gateway::config::ValidationError),
    #[error("metrics setup failed: {0}")]
    Metrics(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        CliCommand::Gateway(args) => {
            let config = Config::from_file(&args.config)?;
            let gateway_config = config.gateway.ok_or(CliError::MissingGatewayConfig)?;
            gateway_config.validate()?;

            let _sentry = init_logging(config.common.logging.as_ref());
            init_metrics(&config.common)?;

            tracing::info!(config = %args.config.display(), "Starting gateway");
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(gateway::run(gateway_config))?;
        }
        CliCommand::ValidateConfig(args) => {
            let config = Config::from_file(&args.config)?;
            let gateway_config = config.gateway.ok_or(CliError::MissingGatewayConfig)?;
            gateway_config.validate()?;
            println!("{}: ok", args.config.display());
        }
    }

    Ok(())
}

/// Installs the fmt subscriber, plus the sentry layer when a DSN is configured.
/// The returned guard flushes sentry on drop.
fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let level = logging.map_or("info", |l| l.level.as_str());
    let sentry_guard = logging
        .and_then(|l| l.sentry_dsn.as_deref())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });
    let sentry_layer = sentry_guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    sentry_guard
}

fn init_metrics(common: &CommonConfig) -> Result<(), CliError> {
    let Some(MetricsConfig {
        statsd_host,
        statsd_port,
    }) = &common.metrics
    else {
        tracing::debug!("No metrics config, metrics are discarded");
        return Ok(());
    };

    let recorder = StatsdBuilder::from(statsd_host.as_str(), *statsd_port)
        .build(Some("cityscope"))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;
    shared::metrics_defs::describe_metrics(gateway::metrics_defs::ALL_METRICS);

    tracing::info!(host = %statsd_host, port = statsd_port, "Sending metrics to statsd");
    Ok(())
}
