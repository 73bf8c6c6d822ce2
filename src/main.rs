use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use newsrelay::config::Config;
use newsrelay::news::FeedProfile;
use newsrelay::server::{self, AppState};

/// Default config file path (~/.config/newsrelay/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("newsrelay")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "newsrelay", about = "RSS/Atom news aggregation proxy", version)]
struct Args {
    /// Config file (defaults to ~/.config/newsrelay/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file and NEWSRELAY_BIND
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Load the configuration, print the resolved feed profiles and exit
    #[arg(long)]
    check: bool,
}

fn print_profile(profile: &FeedProfile) {
    println!(
        "[{}] ttl={}ms summary={} page_size={} limit={}/{}",
        profile.name,
        profile.cache_ttl.as_millis(),
        profile.summary_max_chars,
        profile.page_size,
        profile.default_limit,
        profile.max_limit
    );
    for source in &profile.sources {
        println!("  {} ({}) {}", source.name, source.default_topic, source.url);
        for mirror in &source.mirrors {
            println!("    mirror {mirror}");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config
        .apply_overrides(|key| std::env::var(key).ok())
        .context("Invalid environment override")?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    if args.check {
        println!("bind = {}", config.bind);
        print_profile(&config.proxy_profile());
        print_profile(&config.stream_profile());
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let state = Arc::new(AppState::from_config(&config, client));
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
