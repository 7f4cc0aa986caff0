//! Main entry point for the Listening Room service
//!
//! Production entry point: configuration loading with CLI overrides,
//! structured logging, and graceful shutdown on SIGINT/SIGTERM.

use anyhow::Result;
use clap::Parser;
use listening_room::config::{validate_config, AppConfig};
use listening_room::service::{AppState, HealthStatus};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

/// Listening Room - synchronized group music lobbies
#[derive(Parser)]
#[command(
    name = "listening-room",
    version,
    about = "A synchronized group-listening service with shared playback queues",
    long_about = "Listening Room hosts shared music lobbies over WebSockets. Djs queue tracks \
                 from Spotify, SoundCloud, or YouTube; the server keeps every member on the \
                 same track by timing playback windows itself and advancing the queue exactly \
                 once per track."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Perform health check and exit
    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// HTTP port override
    #[arg(long, value_name = "PORT", help = "Override HTTP server port")]
    http_port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Perform health check and return appropriate exit code
fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let app_state = AppState::new(config)?;
    let report = app_state.health_report();

    println!("Health Check: {}", report.status);
    println!("  Active Lobbies: {}", report.stats.active_lobbies);
    println!("  Connected Clients: {}", report.stats.connected_clients);
    println!("  Armed Timers: {}", report.stats.armed_timers);
    println!(
        "  Configured Providers: {}",
        report.stats.configured_providers
    );
    println!("  Uptime: {}s", report.stats.uptime_seconds);

    // Degraded means search is unavailable; lobbies still work
    match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => std::process::exit(0),
        HealthStatus::Unhealthy => std::process::exit(1),
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🎵 Listening Room Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   HTTP port: {}", config.service.http_port);
    info!(
        "   Default track duration: {}s",
        config.playback.default_track_duration_secs
    );
    info!(
        "   Advance cooldown: {}ms",
        config.playback.advance_cooldown_ms
    );
    info!(
        "   Spotify: {}",
        if config.providers.spotify_client_id.is_some() {
            "configured"
        } else {
            "not configured"
        }
    );
    info!(
        "   SoundCloud: {}",
        if config.providers.soundcloud_client_id.is_some() {
            "configured"
        } else {
            "not configured"
        }
    );
    info!(
        "   YouTube: {}",
        if config.providers.youtube_api_key.is_some() {
            "configured"
        } else {
            "not configured"
        }
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(http_port) = args.http_port {
        config.service.http_port = http_port;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(config);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let shutdown_timeout = config.shutdown_timeout();
    let app_state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    let server_task = {
        let app_state = app_state.clone();
        tokio::spawn(async move {
            if let Err(e) = app_state.serve().await {
                error!("Server error: {}", e);
            }
        })
    };

    info!("✅ Listening Room Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");
    app_state.shutdown();

    match tokio::time::timeout(shutdown_timeout, server_task).await {
        Ok(_) => {
            info!("✅ Graceful shutdown completed successfully");
        }
        Err(_) => {
            warn!("⚠️  Shutdown timeout exceeded, forcing exit");
        }
    }

    info!("🛑 Listening Room Service stopped");
    Ok(())
}
