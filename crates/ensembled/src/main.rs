//! ensembled — the ensemble daemon.
//!
//! # Usage
//!
//! ```text
//! ensembled run --config /etc/ensemble/ensembled.toml --port 8080 --data-dir /var/lib/ensemble
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use ensemble_client::GrpcConnector;
use ensemble_controller::StoreBackend;
use ensemble_state::StateStore;
use ensembled::{Daemon, DaemonConfig};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ensembled", about = "Ensemble daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop and the REST API.
    Run {
        /// Path to ensembled.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Ensembles reconciled concurrently.
        #[arg(long)]
        workers: Option<usize>,

        /// Log output format.
        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ensembled=debug,ensemble=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
            workers,
            log_format,
        } => {
            init_tracing(log_format);

            let mut daemon_config = DaemonConfig::load(config.as_deref())?;
            if let Some(port) = port {
                daemon_config.api.port = port;
            }
            if let Some(data_dir) = data_dir {
                daemon_config.data_dir = data_dir;
            }
            if let Some(workers) = workers {
                daemon_config.controller.workers = workers;
            }
            run(daemon_config).await
        }
    }
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("ensemble daemon starting");

    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.database_path();
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let backend = Arc::new(StoreBackend::new(store.clone()));
    let connector = Arc::new(GrpcConnector::new(config.request_timeout()));
    let daemon = Daemon::new(store, backend, connector, config.controller_config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    daemon.serve(listener, shutdown_rx).await?;

    info!("ensemble daemon stopped");
    Ok(())
}
