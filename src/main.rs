//! SoftEther VPN client CLI application

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sevpn_client::config::{ClientConfig, DEFAULT_CONFIG_FILE};
use sevpn_client::crypto::hash_password;
use sevpn_client::{ActiveSession, TlsSessionCache};

#[derive(Parser)]
#[command(name = "sevpn-client")]
#[command(about = "SoftEther-protocol VPN client for macOS feth interfaces")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the credential digest for --username and --password
    #[arg(long)]
    gen_hash: bool,

    /// Username for hash generation
    #[arg(long, requires = "gen_hash")]
    username: Option<String>,

    /// Password for hash generation
    #[arg(long, requires = "gen_hash")]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG, then RUST_LOG_LEVEL, then --verbose
    let fallback = if cli.verbose { "debug" } else { "info" };
    let default_level = std::env::var("RUST_LOG_LEVEL").unwrap_or_else(|_| fallback.to_string());
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&default_level))
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).without_time())
        .try_init()
        .ok();

    if cli.gen_hash {
        let username = cli.username.context("--username is required with --gen-hash")?;
        let password = cli.password.context("--password is required with --gen-hash")?;
        let hash = hash_password(&password, &username);

        println!("Username: {}", username);
        println!("Password hash (base64): {}", hash.to_base64());
        println!();
        println!("Add this to your config.json:");
        println!("  \"username\": \"{}\",", username);
        println!("  \"hashed_password\": \"{}\"", hash.to_base64());
        return Ok(());
    }

    run(&cli.config).await
}

/// Connect with the given configuration and relay until interrupted.
async fn run(config_path: &str) -> Result<()> {
    info!("Loading configuration from: {}", config_path);
    let config = ClientConfig::from_file(config_path)
        .with_context(|| format!("Failed to load configuration from: {config_path}"))?;
    let settings = config.validate().context("Invalid configuration")?;

    if settings.handshake.target.insecure_skip_verify {
        warn!("TLS certificate verification is DISABLED (insecure_skip_verify=true)");
    }

    let active = ActiveSession::establish(&settings, TlsSessionCache::default())
        .await
        .with_context(|| {
            format!(
                "Failed to connect to {}:{}",
                settings.handshake.target.host, settings.handshake.target.port
            )
        })?;

    tokio::select! {
        result = active.run() => {
            active.shutdown().await;
            if let Err(e) = result {
                error!("VPN session error: {}", e);
                return Err(e).context("VPN session ended");
            }
        }
        signal = shutdown_signal() => {
            signal?;
            info!("Shutdown requested");
            active.shutdown().await;
        }
    }
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to wait for Ctrl-C")?,
            _ = term.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to wait for Ctrl-C")
    }
}
