//! The one-shot shutdown sequence: remote devices first, then this host.

use tracing::{error, info, warn};

use crate::config::types::MonitorSettings;
use crate::remote::{RemoteDevice, ShutdownDispatcher};

/// What to do with the local host once the network devices have been told to power off.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalPowerOff {
    /// Log the step only.
    Disabled,
    /// Run this argv (e.g. `shutdown -h now`).
    Command(Vec<String>),
}

impl LocalPowerOff {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        if settings.local_poweroff {
            LocalPowerOff::Command(settings.local_poweroff_command.clone())
        } else {
            LocalPowerOff::Disabled
        }
    }

    pub async fn run(&self) {
        let argv = match self {
            LocalPowerOff::Disabled => {
                info!("Local power-off disabled (monitor.local_poweroff = false), host stays up");
                return;
            }
            LocalPowerOff::Command(argv) => argv,
        };

        let Some((program, args)) = argv.split_first() else {
            warn!("Local power-off command is empty, skipping");
            return;
        };

        warn!("🔌 Powering off local host: {}", argv.join(" "));
        match tokio::process::Command::new(program).args(args).status().await {
            Ok(status) if status.success() => info!("Local power-off command accepted"),
            Ok(status) => error!("Local power-off command exited with {}", status),
            Err(e) => error!("Failed to run local power-off command '{}': {}", program, e),
        }
    }
}

/// Everything the monitor needs to carry out a shutdown, assembled once at startup.
pub struct ShutdownSequence {
    dispatcher: ShutdownDispatcher,
    devices: Vec<RemoteDevice>,
    local: LocalPowerOff,
}

impl ShutdownSequence {
    pub fn new(dispatcher: ShutdownDispatcher, devices: Vec<RemoteDevice>, local: LocalPowerOff) -> Self {
        Self { dispatcher, devices, local }
    }

    /// Runs to completion; individual failures are logged by the steps themselves.
    pub async fn execute(&self) {
        let summary = self.dispatcher.dispatch(&self.devices).await;
        info!(
            "Remote shutdown phase finished ({} of {} devices reached)",
            summary.succeeded,
            self.devices.len()
        );
        self.local.run().await;
    }
}
