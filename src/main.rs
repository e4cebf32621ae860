//! TLS Forwarder Command Line Tool
//!
//! This binary is the command-line interface for TLS Forwarder.

use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use tokio::signal;

use tls_forwarder::config::{ConfigMerger, ConfigOverrides};
use tls_forwarder::common::{init_logger, ProxyError, Result};
use tls_forwarder::{create_tls_connector, Forwarder, ForwarderConfig, APP_NAME, VERSION};

/// TCP to TLS proxy: accept plaintext TCP locally, forward it over TLS
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Local address to listen on (format: host:port)
    #[clap(short, long, env = "TLS_FORWARDER_LOCAL")]
    local: Option<String>,

    /// Remote address to connect to with TLS (format: host:port)
    #[clap(short, long, env = "TLS_FORWARDER_REMOTE")]
    remote: Option<String>,

    /// Extra CA certificates (PEM) trusted in addition to the system store
    #[clap(long, env = "TLS_FORWARDER_CA_FILE")]
    ca_file: Option<PathBuf>,

    /// Relay buffer size in bytes [default: 4096]
    #[clap(long, env = "TLS_FORWARDER_BUFFER_SIZE")]
    buffer_size: Option<usize>,

    /// Seconds without traffic before a session is dropped [default: 60]
    #[clap(long, env = "TLS_FORWARDER_IDLE_TIMEOUT")]
    idle_timeout: Option<u64>,

    /// Seconds allowed for the remote connect and TLS handshake [default: 30]
    #[clap(long, env = "TLS_FORWARDER_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Seconds to let active sessions finish on shutdown [default: 30]
    #[clap(long, env = "TLS_FORWARDER_SHUTDOWN_TIMEOUT")]
    shutdown_timeout: Option<u64>,

    /// Log level [default: info]
    #[clap(long, env = "TLS_FORWARDER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Load configuration from a JSON file (command line values take precedence)
    #[clap(long, env = "TLS_FORWARDER_CONFIG_FILE")]
    config_file: Option<PathBuf>,
}

impl Args {
    /// Values given on the command line or in the environment
    fn to_overrides(&self) -> Result<ConfigOverrides> {
        Ok(ConfigOverrides {
            local: self.local.as_deref().map(str::parse).transpose()?,
            remote: self.remote.as_deref().map(str::parse).transpose()?,
            ca_file: self.ca_file.clone(),
            buffer_size: self.buffer_size,
            idle_timeout: self.idle_timeout,
            connect_timeout: self.connect_timeout,
            shutdown_timeout: self.shutdown_timeout,
            log_level: self.log_level.clone(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Defaults < config file < environment / command line
    let mut config = ForwarderConfig::default();
    if let Some(path) = &args.config_file {
        config = config.merge(ForwarderConfig::from_file(path)?);
    }
    config = config.with_overrides(&args.to_overrides()?);

    init_logger(&config.log_level);
    info!("Starting {} v{}", APP_NAME, VERSION);

    if let Some(path) = &args.config_file {
        info!("Loaded configuration from {}", path.display());
    }

    config.validate()?;

    let connector = create_tls_connector(config.ca_file.as_deref())?;
    let forwarder = Forwarder::bind(&config, connector).await?;

    info!("TLS proxy listening on {}", forwarder.local_addr());
    info!("Forwarding to {} with TLS", forwarder.remote());
    info!("Press Ctrl+C to exit");

    let (handle, mut dispatcher) = forwarder.start();

    tokio::select! {
        _ = shutdown_signal() => {
            if let Err(e) = handle.shutdown().await {
                warn!("Failed to request shutdown: {}", e);
            }
            join_dispatcher(dispatcher).await?;
        }
        result = &mut dispatcher => {
            error!("Dispatcher stopped unexpectedly");
            result.map_err(|e| ProxyError::Other(e.to_string()))??;
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for the dispatcher task and surface its result
async fn join_dispatcher(dispatcher: tokio::task::JoinHandle<Result<()>>) -> Result<()> {
    dispatcher
        .await
        .map_err(|e| ProxyError::Other(format!("Dispatcher task failed: {}", e)))?
}

/// Resolve on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
