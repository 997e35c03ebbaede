use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ipfilter::config::{ConfigWatcher, WatcherConfig};
use ipfilter::{Config, ConfigLoader, ConfigValidator, DecisionEngine, PolicyStore, Request};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ipfilter")]
#[command(about = "IP filter policies for reverse proxy routes")]
struct Args {
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one request against a route's policies
    Check {
        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Route id as listed under [routes]
        #[arg(long, short = 'r')]
        route: String,

        /// Caller address; omit to evaluate an unknown source
        #[arg(long, short = 'a')]
        address: Option<IpAddr>,
    },

    /// Check policies and route references without serving anything
    Validate {
        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Keep policies loaded and apply config file changes until Ctrl-C
    Watch {
        /// Config file path
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "5000")]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Load config first so [common] verbose can raise the log level
    let config = match &args.command {
        Command::Check { config, .. } | Command::Validate { config } => {
            ConfigLoader::load_or_default(config.clone())?
        }
        Command::Watch { config, .. } => ConfigLoader::load_from_file(config)?,
    };

    // Initialize logging
    let env_filter =
        EnvFilter::from_default_env().add_directive(config.common.log_level(args.verbose).into());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Check { route, address, .. } => check(&config, &route, address),
        Command::Validate { .. } => validate(&config),
        Command::Watch {
            config,
            interval_ms,
        } => watch(config, Duration::from_millis(interval_ms)).await,
    }
}

fn check(config: &Config, route: &str, address: Option<IpAddr>) -> anyhow::Result<ExitCode> {
    let Some(route_config) = config.routes.get(route) else {
        bail!("Unknown route: {}", route);
    };

    let store = Arc::new(PolicyStore::new(&config.filter)?);
    let engine = DecisionEngine::new(store);
    let request = Request::from_metadata(address, route, &route_config.metadata);

    match engine.evaluate(&request) {
        Ok(verdict) if verdict.is_continue() => {
            println!("continue");
            Ok(ExitCode::SUCCESS)
        }
        Ok(verdict) => {
            println!("reject {}", verdict.status_code().unwrap_or(403));
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            println!("reject {}: {}", e.status_code(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn validate(config: &Config) -> anyhow::Result<ExitCode> {
    let table = ConfigValidator::validate(config).context("Configuration is invalid")?;

    let mut names: Vec<_> = table.names().collect();
    names.sort_unstable();
    println!(
        "ok: {} policies ({}), {} routes",
        table.len(),
        names.join(", "),
        config.routes.len()
    );
    Ok(ExitCode::SUCCESS)
}

async fn watch(config: PathBuf, poll_interval: Duration) -> anyhow::Result<ExitCode> {
    let watcher = ConfigWatcher::new(
        &config,
        WatcherConfig::default().with_poll_interval(poll_interval),
    )?;
    let store = Arc::new(PolicyStore::new(&watcher.current())?);
    let reloads = Arc::clone(&store).watch(watcher.subscribe());
    let handle = watcher.start();

    tracing::info!("Watching {:?} for policy changes", config);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    handle.stop().await;
    reloads.await?;
    tracing::info!(generation = store.generation(), "Stopped");
    Ok(ExitCode::SUCCESS)
}
