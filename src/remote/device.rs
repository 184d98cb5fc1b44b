//! Credential resolution for configured devices.
//! Invalid entries are dropped here, at load time, so dispatch only ever sees usable targets.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::types::{DeviceEntry, RemoteSettings};
use crate::remote::{Credential, RemoteDevice};

/// Resolve every configured device, keeping config order and skipping invalid ones.
pub fn resolve_devices(settings: &RemoteSettings) -> Vec<RemoteDevice> {
    let devices: Vec<RemoteDevice> = settings
        .devices
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match resolve_device(entry, settings) {
            Ok(device) => Some(device),
            Err(reason) => {
                let label = if entry.host.trim().is_empty() {
                    format!("#{}", index + 1)
                } else {
                    entry.host.trim().to_string()
                };
                warn!("⚠️ Remote device {} excluded from shutdown: {}", label, reason);
                None
            }
        })
        .collect();

    info!("{} of {} remote devices configured for shutdown", devices.len(), settings.devices.len());
    devices
}

fn resolve_device(entry: &DeviceEntry, defaults: &RemoteSettings) -> Result<RemoteDevice, String> {
    let host = entry.host.trim();
    if host.is_empty() {
        return Err("missing host".to_string());
    }

    let username = non_empty(&entry.username)
        .or_else(|| non_empty(&defaults.username))
        .ok_or_else(|| "missing username".to_string())?;

    let key_path = non_empty(&entry.key_path).or_else(|| non_empty(&defaults.key_path));
    let password = non_empty(&entry.password).or_else(|| non_empty(&defaults.password));

    let credential = match (key_path, password) {
        (Some(key), password) if Path::new(&key).is_file() => {
            if password.is_some() {
                info!("Device {}: key file {} takes precedence over password", host, key);
            }
            Credential::KeyFile(PathBuf::from(key))
        }
        (Some(key), Some(password)) => {
            warn!("Device {}: key file {} not found, falling back to password", host, key);
            Credential::Password(password)
        }
        (Some(key), None) => return Err(format!("key file {} not found and no password provided", key)),
        (None, Some(password)) => Credential::Password(password),
        (None, None) => return Err("no SSH key or password provided".to_string()),
    };

    Ok(RemoteDevice {
        host: host.to_string(),
        username,
        credential,
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
