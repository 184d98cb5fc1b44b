//! Config file location, load, validation and migration logic.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use crate::config::types::AppConfig;
use crate::error::ConfigError;

/// Longest accepted apcupsd socket timeout, in seconds.
const MAX_UPS_TIMEOUT_SECS: f64 = 3600.0;

/// Default config location: `config.json` next to the executable.
pub fn default_config_path() -> Result<PathBuf> {
    let exe_dir = std::env::current_exe()?
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine executable directory"))?
        .to_path_buf();
    Ok(exe_dir.join("config.json"))
}

/// Migrate older config layouts in place. Returns true when the file was rewritten.
///
/// Handles the legacy `remote.hosts` form (`"10.0.0.2, 10.0.0.3"`), which is
/// expanded into `remote.devices` entries that inherit the shared credentials.
pub(crate) fn migrate_config(config_path: &Path) -> Result<bool> {
    if !config_path.exists() {
        return Ok(false);
    }

    let content = std::fs::read_to_string(config_path)?;
    let mut json: serde_json::Value = serde_json::from_str(&content)?;
    let mut migrated = false;

    if let Some(remote) = json.get_mut("remote").and_then(|r| r.as_object_mut()) {
        if let Some(hosts) = remote.remove("hosts") {
            let hosts: Vec<String> = hosts
                .as_str()
                .unwrap_or_default()
                .split(',')
                .map(|h| h.trim())
                .filter(|h| !h.is_empty())
                .map(|h| h.to_string())
                .collect();

            let devices = remote
                .entry("devices")
                .or_insert_with(|| serde_json::json!([]));
            if let Some(list) = devices.as_array_mut() {
                for host in &hosts {
                    list.push(serde_json::json!({ "host": host }));
                }
            }
            info!("Migrated: expanded 'remote.hosts' into {} device entries", hosts.len());
            migrated = true;
        }
    }

    if migrated {
        std::fs::write(config_path, serde_json::to_string_pretty(&json)?)?;
        info!("Config migrated to latest version: {:?}", config_path);
    }

    Ok(migrated)
}

/// Load and validate the configuration. Any failure here is fatal for the caller.
pub async fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if let Err(e) = migrate_config(path) {
        warn!("Config migration check failed: {}", e);
    }

    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let config: AppConfig = serde_json::from_str(&content)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

    validate(&config)?;

    info!("Loaded configuration from: {:?}", path);
    Ok(config)
}

pub(crate) fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.monitor.shutdown_threshold > 100 {
        return Err(ConfigError::Invalid {
            field: "monitor.shutdown_threshold",
            reason: format!("{} is outside 0-100", config.monitor.shutdown_threshold),
        });
    }
    if config.monitor.poll_interval == 0 {
        return Err(ConfigError::Invalid {
            field: "monitor.poll_interval",
            reason: "must be a positive number of seconds".to_string(),
        });
    }
    if config.monitor.local_poweroff && config.monitor.local_poweroff_command.is_empty() {
        return Err(ConfigError::Invalid {
            field: "monitor.local_poweroff_command",
            reason: "must not be empty when local_poweroff is enabled".to_string(),
        });
    }
    if config.ups.host.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field: "ups.host",
            reason: "must not be empty".to_string(),
        });
    }
    if config.ups.timeout.is_nan() || config.ups.timeout <= 0.0 {
        return Err(ConfigError::Invalid {
            field: "ups.timeout",
            reason: format!("{} is not a positive number of seconds", config.ups.timeout),
        });
    }
    if config.ups.timeout > MAX_UPS_TIMEOUT_SECS {
        return Err(ConfigError::Invalid {
            field: "ups.timeout",
            reason: format!("{} exceeds the maximum of {} seconds", config.ups.timeout, MAX_UPS_TIMEOUT_SECS),
        });
    }
    if config.storage.database_path.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field: "storage.database_path",
            reason: "must not be empty".to_string(),
        });
    }
    if config.remote.command.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field: "remote.command",
            reason: "must not be empty".to_string(),
        });
    }
    if config.remote.connect_timeout == 0 {
        return Err(ConfigError::Invalid {
            field: "remote.connect_timeout",
            reason: "must be a positive number of seconds".to_string(),
        });
    }
    if config.api.enabled {
        config.api.listen.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            field: "api.listen",
            reason: format!("'{}': {}", config.api.listen, e),
        })?;
    }
    Ok(())
}
