use anyhow::Context;
use clap::Parser;
use pulse_server::{build_service, routes, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Voter pulse service
#[derive(Debug, Parser)]
#[command(name = "pulse-server", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address (overrides the config file)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Disclosure threshold, at least 25 (overrides the config file)
    #[arg(long)]
    threshold: Option<u64>,

    /// Start with an empty catalog
    #[arg(long)]
    no_seed: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config = config.with_bind(bind);
        }
        if let Some(threshold) = self.threshold {
            config = config.with_threshold(threshold);
        }
        if self.no_seed {
            config = config.with_seed_catalog(false);
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = cli.server_config().context("invalid configuration")?;
    let service = build_service(&config).await?;

    let (addr, server) = routes::bind(service, config.bind, shutdown_signal())?;
    tracing::info!(
        %addr,
        threshold = config.disclosure_threshold,
        version = pulse_server::VERSION,
        "pulse-server listening"
    );
    server.await;
    Ok(())
}
