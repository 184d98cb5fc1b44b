//! UPS Sentry entry point: CLI dispatch, signal handlers, async runtime.

mod api;
mod app;
mod config;
mod error;
mod monitor;
mod remote;
mod storage;
mod ups;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tokio::sync::watch;
use tracing::{error, info, warn};

use api::ApiState;
use app::cli::{Args, HELP_TEXT};
use app::logging::{attach_log_file, init_tracing, reload_level, resolve_filter};
use app::status::{run_health_check, show_history, show_status};
use config::persistence::{default_config_path, load_config};
use config::types::AppConfig;
use monitor::{LocalPowerOff, MonitorExit, MonitorLoop, ShutdownSequence};
use remote::{resolve_devices, ShutdownDispatcher, SshShell};
use storage::SqliteTelemetryStore;
use ups::{ApcupsdClient, UpsSource};

/// EX_IOERR: the telemetry database became unusable while monitoring.
const EXIT_STORAGE_LOST: i32 = 74;

#[tokio::main]
async fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if err.kind() == clap::error::ErrorKind::DisplayHelp {
                print!("{}", HELP_TEXT);
                std::process::exit(0);
            }
            if err.kind() == clap::error::ErrorKind::DisplayVersion {
                println!("\x1b[32mups-sentry {} ({})\x1b[0m", env!("CARGO_PKG_VERSION"), std::env::consts::ARCH);
                std::process::exit(0);
            }

            eprintln!("{}", err);
            eprintln!();
            print!("{}", HELP_TEXT);
            eprintln!("\nFor more information, try '--help'.");
            std::process::exit(1);
        }
    };

    if !args.has_command() {
        eprintln!("ERROR: No command specified. You must specify a command.");
        eprintln!();
        Args::command().print_help()?;
        eprintln!();
        eprintln!("Common commands:");
        eprintln!("  ./ups-sentry --run           Start monitoring");
        eprintln!("  ./ups-sentry -i              Show UPS status");
        eprintln!("  ./ups-sentry --history 24h   Show the last day of samples");
        std::process::exit(1);
    }

    // Priority: 1. --log-level flag, 2. LOG_LEVEL env, 3. config file (--run only), 4. default
    // One-shot commands default to WARN so their own output stays readable.
    let env_level = std::env::var("LOG_LEVEL").ok();
    let startup_default = if args.run { "INFO" } else { "WARN" };
    init_tracing(resolve_filter(args.log_level.as_deref(), env_level.as_deref(), startup_default))?;

    let config_path = match args.config_path.clone() {
        Some(path) => path,
        None => default_config_path()?,
    };

    if args.check {
        let healthy = run_health_check(&config_path).await?;
        std::process::exit(if healthy { 0 } else { 1 });
    }

    let config = match load_config(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            eprintln!("\nExpected a JSON configuration at {:?} (override with --config-path)", config_path);
            std::process::exit(1);
        }
    };

    if args.config {
        println!("\n{}", serde_json::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    if args.status {
        return show_status(&config).await;
    }

    if let Some(range) = args.history.as_deref() {
        return show_history(&config, range).await;
    }

    let code = run_monitor(&args, config, &config_path).await?;
    std::process::exit(code);
}

/// Foreground `--run`: wire everything up, run the loop and map its exit onto a status code.
async fn run_monitor(args: &Args, config: AppConfig, config_path: &Path) -> Result<i32> {
    if args.log_level.is_none() && std::env::var_os("LOG_LEVEL").is_none() {
        reload_level(resolve_filter(None, None, &config.logging.log_level))?;
    }
    // Held until return so buffered file output is flushed before exit.
    let _log_guard = if config.logging.enable_file_logging {
        Some(attach_log_file(Path::new(&config.logging.log_file))?)
    } else {
        None
    };

    info!("UPS Sentry v{} starting ({})", env!("CARGO_PKG_VERSION"), std::env::consts::OS);
    info!("Using configuration {:?}", config_path);

    let store = match SqliteTelemetryStore::open(&config.storage.database_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("❌ Cannot initialize telemetry store: {}", e);
            return Ok(1);
        }
    };

    let source: Arc<dyn UpsSource> = Arc::new(ApcupsdClient::new(&config.ups));

    if config.api.enabled {
        if let Err(e) = start_api(&config, source.clone(), store.path()).await {
            error!("Read API not started: {:#}", e);
        }
    } else {
        info!("Read API disabled in configuration");
    }

    let devices = resolve_devices(&config.remote);
    let shell = Arc::new(SshShell::new(Duration::from_secs(config.remote.connect_timeout)));
    let sequence = ShutdownSequence::new(
        ShutdownDispatcher::new(shell, config.remote.command.clone()),
        devices,
        LocalPowerOff::from_settings(&config.monitor),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("Shutdown signal received");
        let _ = stop_tx.send(true);
    });

    #[cfg(unix)]
    spawn_log_level_reload(config_path.to_path_buf());

    let monitor = MonitorLoop::new(source, store, &config.monitor, sequence, stop_rx);
    let code = match monitor.run().await {
        MonitorExit::ShutdownComplete => {
            info!("Shutdown sequence finished, exiting");
            0
        }
        MonitorExit::StorageLost(e) => {
            error!("❌ Exiting: telemetry storage is unusable ({})", e);
            EXIT_STORAGE_LOST
        }
        MonitorExit::Stopped => {
            info!("Monitor stopped");
            0
        }
    };

    Ok(code)
}

async fn start_api(config: &AppConfig, source: Arc<dyn UpsSource>, database: &Path) -> Result<()> {
    let listen: SocketAddr = config
        .api
        .listen
        .parse()
        .with_context(|| format!("Invalid api.listen address '{}'", config.api.listen))?;
    let reader = SqliteTelemetryStore::open_reader(database)?;
    let state = ApiState { source, store: Arc::new(reader) };
    api::spawn(listen, state).await?;
    Ok(())
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// SIGHUP re-reads `logging.log_level` from the config file.
#[cfg(unix)]
fn spawn_log_level_reload(config_path: std::path::PathBuf) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(sighup) => sighup,
        Err(e) => {
            warn!("Failed to install SIGHUP handler: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        while sighup.recv().await.is_some() {
            info!("SIGHUP received, reloading log level configuration");
            match load_config(&config_path).await {
                Ok(new_config) => {
                    let level = new_config.logging.log_level;
                    let filter = app::logging::parse_level(&level).unwrap_or("info");
                    match app::logging::reload_level(filter) {
                        Ok(_) => info!("Log level reloaded: {}", level.to_uppercase()),
                        Err(e) => error!("{:#}", e),
                    }
                }
                Err(e) => error!("Failed to reload config: {}", e),
            }
        }
    });
}
