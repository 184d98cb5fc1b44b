//! One-shot CLI commands: current UPS status, stored history and the health check.

use std::path::Path;

use anyhow::{Context, Result};

use crate::api::routes::parse_timerange;
use crate::config::persistence::load_config;
use crate::config::types::AppConfig;
use crate::storage::{Sample, SqliteTelemetryStore, TelemetryStore};
use crate::ups::{ApcupsdClient, Snapshot, UpsSource};

fn banner() {
    println!("\x1b[32mups-sentry v{} ({})\x1b[0m", env!("CARGO_PKG_VERSION"), std::env::consts::ARCH);
}

pub async fn show_status(config: &AppConfig) -> Result<()> {
    banner();
    println!("================================");

    let client = ApcupsdClient::new(&config.ups);
    let snapshot = client
        .sample()
        .await
        .with_context(|| format!("Could not read UPS status from {}", client.addr()))?;

    println!("{}", format_status(&snapshot));
    Ok(())
}

pub fn format_status(snapshot: &Snapshot) -> String {
    format!(
        "Status: {}\nBattery: {:.1}%\nLoad: {:.1}%\nTime Left: {:.1} min",
        snapshot.status, snapshot.battery_charge_pct, snapshot.load_pct, snapshot.time_left_minutes
    )
}

pub async fn show_history(config: &AppConfig, range: &str) -> Result<()> {
    let window = parse_timerange(range)
        .with_context(|| format!("Invalid timerange '{}'. Valid ranges: 1h, 24h, 7d", range))?;

    let store = SqliteTelemetryStore::open_reader(&config.storage.database_path)?;
    let samples = store.query(window).await?;

    banner();
    println!("{} samples in the last {}", samples.len(), range);
    for sample in &samples {
        println!("{}", format_sample(sample));
    }
    Ok(())
}

fn format_sample(sample: &Sample) -> String {
    let s = &sample.snapshot;
    format!(
        "{}  {:<8} {:>5.1}%  load {:>5.1}%  {:>6.1} min  {:>5.1} V in  {:>5.1} V batt",
        sample.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
        s.status,
        s.battery_charge_pct,
        s.load_pct,
        s.time_left_minutes,
        s.line_voltage,
        s.battery_voltage
    )
}

/// Verify config, apcupsd reachability and database writability. Returns true when all passed.
pub async fn run_health_check(config_path: &Path) -> Result<bool> {
    banner();
    println!("Health Check");
    println!("============\n");

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✓ Config file: {}", config_path.display());
            config
        }
        Err(e) => {
            println!("✗ Config file: {}", e);
            println!("\n\x1b[33m⚠ Cannot continue without a valid configuration\x1b[0m");
            return Ok(false);
        }
    };

    let mut all_ok = true;

    let client = ApcupsdClient::new(&config.ups);
    match client.sample().await {
        Ok(snapshot) => println!(
            "✓ apcupsd: {} ({}, battery {:.1}%)",
            client.addr(),
            snapshot.status,
            snapshot.battery_charge_pct
        ),
        Err(e) => {
            println!("✗ apcupsd: {}", e);
            all_ok = false;
        }
    }

    match SqliteTelemetryStore::open(&config.storage.database_path) {
        Ok(store) => {
            println!("✓ Database: {} (writable)", store.path().display());
            match store.latest().await {
                Ok(Some(sample)) => println!("  Last sample: {}", format_sample(&sample)),
                Ok(None) => println!("  No samples recorded yet"),
                Err(e) => println!("⚠ Database: last sample unreadable ({})", e),
            }
        }
        Err(e) => {
            println!("✗ Database: {}", e);
            all_ok = false;
        }
    }

    let devices = crate::remote::resolve_devices(&config.remote);
    if devices.len() == config.remote.devices.len() {
        println!("✓ Remote devices: {} configured", devices.len());
    } else {
        println!(
            "⚠ Remote devices: {} of {} usable (see warnings above)",
            devices.len(),
            config.remote.devices.len()
        );
    }

    if config.monitor.local_poweroff {
        println!("✓ Local power-off: {}", config.monitor.local_poweroff_command.join(" "));
    } else {
        println!("- Local power-off: disabled");
    }

    println!();
    if all_ok {
        println!("\x1b[32m✓ All checks passed!\x1b[0m");
    } else {
        println!("\x1b[33m⚠ Some issues found - see above\x1b[0m");
    }

    Ok(all_ok)
}
