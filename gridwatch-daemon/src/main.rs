//! GridWatch Daemon - sensor anomaly streaming
//!
//! Classifies raw sensor readings into an append-only event log and streams
//! every new event to websocket subscribers at ws://<host>:<port>/ws.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gridwatch_daemon::config::DaemonConfig;
use gridwatch_daemon::pipeline::{self, Shutdown, ShutdownTrigger};
use gridwatch_log::TailStart;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gridwatch-daemon")]
#[command(about = "Sensor anomaly classifier and live event stream", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long, env = "GRIDWATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// tracing filter, overrides the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream the event log to websocket subscribers (default)
    Serve {
        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Event log to tail
        #[arg(long)]
        event_log: Option<PathBuf>,

        /// Only stream events appended after startup
        #[arg(long)]
        from_end: bool,
    },

    /// Classify the input log into the event log
    Enrich {
        /// Raw sensor reading log
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Classified event log
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Append simulated sensor readings to the input log
    Simulate {
        /// Raw sensor reading log
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Delay between readings (milliseconds)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Stop after this many readings
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },

    /// Simulator, enricher and server in one process
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve {
        port: None,
        event_log: None,
        from_end: false,
    });

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load_from(path),
        None => DaemonConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_logging(&config, cli.log_level.as_deref())?;

    info!("Starting GridWatch Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config.config_path.display());

    apply_overrides(&mut config, &command);
    config
        .validate()
        .context("Invalid configuration after command-line overrides")?;

    let (trigger, shutdown) = Shutdown::new();
    tokio::spawn(shutdown_signal(trigger));

    let result = match command {
        Commands::Serve { .. } => pipeline::serve(&config, shutdown, |_| {}).await,
        Commands::Enrich { .. } => pipeline::enrich(&config, shutdown).await,
        Commands::Simulate { count, .. } => {
            match pipeline::simulate(&config, count, shutdown).await {
                Ok(written) => {
                    info!(written, "Simulation finished");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        Commands::Run => pipeline::run_all(&config, shutdown).await,
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }

    info!("GridWatch daemon stopped");
    result
}

/// Fold the subcommand's flags into the loaded configuration.
fn apply_overrides(config: &mut DaemonConfig, command: &Commands) {
    match command {
        Commands::Serve {
            port,
            event_log,
            from_end,
        } => {
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(path) = event_log {
                config.log.event_path = path.clone();
            }
            if *from_end {
                config.log.start_from = TailStart::End;
            }
        }
        Commands::Enrich { input, output } => {
            if let Some(path) = input {
                config.log.input_path = path.clone();
            }
            if let Some(path) = output {
                config.log.event_path = path.clone();
            }
        }
        Commands::Simulate {
            input, interval_ms, ..
        } => {
            if let Some(path) = input {
                config.log.input_path = path.clone();
            }
            if let Some(interval_ms) = interval_ms {
                config.simulator.interval_ms = *interval_ms;
            }
        }
        Commands::Run => {}
    }
}

fn init_logging(config: &DaemonConfig, override_level: Option<&str>) -> Result<()> {
    let directives = match override_level {
        Some(level) => level.to_string(),
        None => std::env::var(EnvFilter::DEFAULT_ENV)
            .unwrap_or_else(|_| config.logging.level.clone()),
    };
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter '{}'", directives))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

/// Fire `trigger` on Ctrl-C or SIGTERM.
async fn shutdown_signal(trigger: ShutdownTrigger) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
    trigger.trigger();
}
