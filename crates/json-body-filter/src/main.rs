use anyhow::Context;
use clap::{Parser, Subcommand};
use json_body_filter::config::Config;
use json_body_filter::metrics;
use json_body_filter::proxy::ProxyServer;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "json-body-filter", version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "JSON_BODY_FILTER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override the listen port from the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and compile its rules, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let config_path = args
        .config
        .context("a configuration file is required (--config or JSON_BODY_FILTER_CONFIG)")?;
    let mut config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config '{}'", config_path.display()))?;
    if let Some(port) = args.port {
        config.listen.port = port;
        config.validate()?;
    }

    if let Some(Command::Check) = args.command {
        let rules = config.compile_rules()?;
        println!(
            "{}: {} rules ({} active, {} inert)",
            config_path.display(),
            rules.len(),
            rules.active_count(),
            rules.len() - rules.active_count()
        );
        return Ok(());
    }

    let metrics_addr = config.metrics_addr()?;
    let server = ProxyServer::new(config).context("Failed to start filter")?;

    if let Some(addr) = metrics_addr {
        tokio::spawn(async move {
            if let Err(e) = metrics::run(addr).await {
                error!("Metrics server stopped: {}", e);
            }
        });
    }

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
