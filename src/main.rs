//! herakles-software-monitor
//!
//! Per-software process monitor with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, warn, Level};

use herakles_software_monitor::cli::{Args, Commands, LogLevel};
use herakles_software_monitor::collectors::{LocalCollector, Mode};
use herakles_software_monitor::commands::{command_config, command_groups};
use herakles_software_monitor::config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR,
    DEFAULT_PORT,
};
use herakles_software_monitor::handlers;
use herakles_software_monitor::sampler::{Sampler, WinRmConnector};
use herakles_software_monitor::state::AppState;
use herakles_software_monitor::store::TimeSeriesStore;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> anyhow::Result<Config> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {:#}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {:#}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format.clone());
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        return match command {
            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), format.clone(), *commented),

            Commands::Groups { verbose, classify } => {
                let config = load_validated_config(&args)?;
                command_groups(&config, *verbose, classify.clone())
            }
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;

    setup_logging(&args);

    info!("Starting herakles-software-monitor");

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR).to_string();
    let port = config.port.unwrap_or(DEFAULT_PORT);

    let matcher = config.build_matcher()?;
    info!(
        "Classifier ready: {} targets, {} name groups",
        matcher.targets().len(),
        matcher.name_groups().len()
    );

    let store = Arc::new(TimeSeriesStore::new(
        config.history_capacity(),
        config.persist_path(),
        config.persist_interval(),
    ));
    match config.persist_path() {
        Some(path) => {
            info!("History file: {}", path.display());
            store.load();
        }
        None => warn!("Persistence disabled, history is kept in memory only"),
    }

    let sampler = Arc::new(Sampler::new(
        Arc::clone(&store),
        matcher,
        config.mode(),
        config.sample_interval(),
        Arc::new(LocalCollector::default()),
        Arc::new(WinRmConnector),
    ));

    if config.mode() == Mode::Winrm {
        sampler.connect_configured(&config.remote_settings()).await;
    }

    sampler.start();

    let state = Arc::new(
        AppState::new(Arc::clone(&store), Arc::clone(&sampler), config)
            .context("Failed to register Prometheus metrics")?,
    );
    debug!("Application state initialized");

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", bind_ip_str, port))?;

    let app = handlers::router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        "herakles-software-monitor listening on http://{}:{}",
        bind_ip_str, port
    );

    let server = axum::serve(listener, app);

    let result = tokio::select! {
        result = server => result.map_err(anyhow::Error::from),
        _ = shutdown_signal() => {
            info!("Shutdown signal received, exiting...");
            Ok(())
        }
    };

    sampler.stop().await;

    if let Err(e) = &result {
        error!("Server error: {}", e);
    }

    info!("herakles-software-monitor stopped gracefully");
    result
}
