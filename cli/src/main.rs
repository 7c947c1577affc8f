//! chainproxy CLI: run the JSON-RPC failover proxy.
//!
//! Usage:
//! ```bash
//! # Serve on the address from proxy.toml
//! chainproxy proxy --config proxy.toml
//!
//! # Validate a config and print the resolved routes
//! chainproxy check --config proxy.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chainproxy_core::{ProxyConfig, RequestRouter};
use chainproxy_http::{build_router, server};

#[derive(Debug, Parser)]
#[command(name = "chainproxy", version, about = "Load-balancing, rate-limiting JSON-RPC failover proxy")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true, env = "CHAINPROXY_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Distribute requests across the configured node providers.
    Proxy {
        /// Path to the proxy config file.
        #[arg(short, long, default_value = "proxy.toml")]
        config: PathBuf,

        /// Override the listen address from the config file.
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Validate a config file and print the routing table.
    Check {
        /// Path to the proxy config file.
        #[arg(short, long, default_value = "proxy.toml")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
    }
}

fn load(path: &Path) -> Result<ProxyConfig> {
    ProxyConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match cli.command {
        Command::Proxy { config, listen } => cmd_proxy(&config, listen).await,
        Command::Check { config } => cmd_check(&config),
    }
}

async fn cmd_proxy(path: &Path, listen: Option<String>) -> Result<()> {
    let config = load(path)?;
    let router = Arc::new(build_router(&config).context("building router")?);
    let addr = listen.unwrap_or_else(|| config.listen_addr.clone());

    tracing::info!(
        providers = config.providers.len(),
        overrides = config.methods_mapping.len(),
        requests_per_second = config.requests_per_second,
        burst = config.burst,
        retry_limit = %router.engine().retry_limit(),
        batch_mode = ?router.batch_mode(),
        "starting proxy"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    server::serve(listener, router, server::shutdown_signal())
        .await
        .context("serving")?;
    Ok(())
}

fn cmd_check(path: &Path) -> Result<()> {
    let config = load(path)?;
    let router = build_router(&config).context("building router")?;
    print_routes(&config, &router);
    Ok(())
}

fn print_routes(config: &ProxyConfig, router: &RequestRouter) {
    let routes = router.routes();
    println!("Config OK\n");
    println!("  Listen:       {}", config.listen_addr);
    println!(
        "  Rate limit:   {} req/s (burst {})",
        config.requests_per_second, config.burst
    );
    println!("  Retry limit:  {}", router.engine().retry_limit());
    println!("  Batch mode:   {:?}", router.batch_mode());
    println!("  Tolerated:    {}", config.tolerated_errors.join(", "));
    println!();
    println!("  default");
    for url in routes.default_balancer().urls() {
        println!("    {url}");
    }
    for (method, urls) in routes.overrides() {
        println!("  {method}");
        for url in urls {
            println!("    {url}");
        }
    }
}
