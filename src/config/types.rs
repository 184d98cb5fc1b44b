//! Configuration structs and defaults.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub ups: UpsSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    pub shutdown_threshold: u8,      // 0-100 %
    pub poll_interval: u64,          // seconds, > 0
    #[serde(default)]
    pub local_poweroff: bool,        // off by default: only logs the host power-off step
    #[serde(default = "default_local_poweroff_command")]
    pub local_poweroff_command: Vec<String>,
}

pub fn default_local_poweroff_command() -> Vec<String> {
    vec!["shutdown".to_string(), "-h".to_string(), "now".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsSettings {
    pub host: String,
    pub port: u16,
    pub timeout: f64,                // seconds per socket operation
}

impl Default for UpsSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3551,
            timeout: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub database_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "/var/lib/ups-sentry/ups_data.db".to_string(),
        }
    }
}

/// Remote shutdown targets. Top-level credentials apply to devices that omit their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_remote_command")]
    pub command: String,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            key_path: None,
            connect_timeout: default_connect_timeout(),
            command: default_remote_command(),
            devices: Vec::new(),
        }
    }
}

pub fn default_connect_timeout() -> u64 { 10 }

pub fn default_remote_command() -> String { "poweroff".to_string() }

/// One device as written in the config file, before credential resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(default)]
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    pub enabled: bool,
    pub listen: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub log_level: String,
    pub enable_file_logging: bool,
    pub log_file: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            enable_file_logging: false,
            log_file: "/var/log/ups-sentry/ups-sentry.log".to_string(),
        }
    }
}

impl AppConfig {
    /// Copy with every password replaced, for `--config` output.
    pub fn redacted(&self) -> AppConfig {
        let mut config = self.clone();
        let mask = |p: &mut Option<String>| {
            if p.is_some() {
                *p = Some("********".to_string());
            }
        };
        mask(&mut config.remote.password);
        for device in config.remote.devices.iter_mut() {
            mask(&mut device.password);
        }
        config
    }
}
