//! Best-effort shutdown fan-out: one device at a time, in config order.
//! A failing device is logged and skipped; nothing aborts the sequence.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::RemoteError;
use crate::remote::{RemoteDevice, RemoteShell};

/// Per-run tally, used only for the summary log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub succeeded: usize,
    pub auth_failed: usize,
    pub connection_failed: usize,
}

pub struct ShutdownDispatcher {
    shell: Arc<dyn RemoteShell>,
    command: String,
}

impl ShutdownDispatcher {
    pub fn new(shell: Arc<dyn RemoteShell>, command: impl Into<String>) -> Self {
        Self { shell, command: command.into() }
    }

    /// Send the power-off command to every device, sequentially. Never fails.
    pub async fn dispatch(&self, devices: &[RemoteDevice]) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        if devices.is_empty() {
            info!("No remote devices configured for shutdown.");
            return summary;
        }

        for device in devices {
            info!("Connecting to {} for shutdown...", device.host);
            match self.shell.run_once(device, &self.command).await {
                Ok(()) => {
                    info!("Sent '{}' to {}", self.command, device.host);
                    summary.succeeded += 1;
                }
                Err(e @ RemoteError::Auth { .. }) => {
                    error!("{}. Check the credentials configured for this device.", e);
                    summary.auth_failed += 1;
                }
                Err(e @ RemoteError::Connection { .. }) => {
                    error!("Error shutting down {}: {}", device.host, e);
                    summary.connection_failed += 1;
                }
            }
        }

        let failed = summary.auth_failed + summary.connection_failed;
        if failed > 0 {
            warn!("Remote shutdown: {} sent, {} failed", summary.succeeded, failed);
        } else {
            info!("Remote shutdown: {} sent, 0 failed", summary.succeeded);
        }
        summary
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::app::logging::CapturedLogs;
    use crate::remote::Credential;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    pub(crate) enum Outcome {
        Sent,
        AuthFails,
        Unreachable,
    }

    /// Records every session attempt; hosts without a scripted outcome succeed.
    #[derive(Default)]
    pub(crate) struct ScriptedShell {
        pub(crate) outcomes: HashMap<String, Outcome>,
        pub(crate) attempts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedShell {
        pub(crate) fn with(outcomes: &[(&str, Outcome)]) -> Self {
            Self {
                outcomes: outcomes.iter().map(|(h, o)| (h.to_string(), *o)).collect(),
                attempts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn attempts(&self) -> Vec<(String, String)> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteShell for ScriptedShell {
        async fn run_once(&self, device: &RemoteDevice, command: &str) -> Result<(), RemoteError> {
            self.attempts.lock().unwrap().push((device.host.clone(), command.to_string()));
            match self.outcomes.get(&device.host).copied().unwrap_or(Outcome::Sent) {
                Outcome::Sent => Ok(()),
                Outcome::AuthFails => Err(RemoteError::Auth {
                    host: device.host.clone(),
                    detail: "Permission denied".to_string(),
                }),
                Outcome::Unreachable => Err(RemoteError::Connection {
                    host: device.host.clone(),
                    detail: "Connection timed out".to_string(),
                }),
            }
        }
    }

    pub(crate) fn device(host: &str) -> RemoteDevice {
        RemoteDevice {
            host: host.to_string(),
            username: "ubnt".to_string(),
            credential: Credential::Password("pw".to_string()),
        }
    }

    #[tokio::test]
    async fn empty_device_list_opens_no_session() {
        let logs = CapturedLogs::default();
        let _subscriber = tracing::subscriber::set_default(logs.subscriber());
        let shell = Arc::new(ScriptedShell::default());
        let dispatcher = ShutdownDispatcher::new(shell.clone(), "poweroff");

        let summary = dispatcher.dispatch(&[]).await;

        assert_eq!(summary, DispatchSummary::default());
        assert!(shell.attempts().is_empty());
        assert_eq!(logs.lines_containing("No remote devices configured for shutdown."), 1);
        assert_eq!(logs.lines_containing("Remote shutdown:"), 0);
    }

    #[tokio::test]
    async fn auth_failure_does_not_block_later_device() {
        let shell = Arc::new(ScriptedShell::with(&[("10.0.0.1", Outcome::AuthFails)]));
        let dispatcher = ShutdownDispatcher::new(shell.clone(), "poweroff");

        let summary = dispatcher.dispatch(&[device("10.0.0.1"), device("10.0.0.2")]).await;

        assert_eq!(summary, DispatchSummary { succeeded: 1, auth_failed: 1, connection_failed: 0 });
        assert_eq!(
            shell.attempts(),
            vec![
                ("10.0.0.1".to_string(), "poweroff".to_string()),
                ("10.0.0.2".to_string(), "poweroff".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn auth_failure_after_success_still_returns() {
        let shell = Arc::new(ScriptedShell::with(&[("10.0.0.2", Outcome::AuthFails)]));
        let dispatcher = ShutdownDispatcher::new(shell.clone(), "poweroff");

        let summary = dispatcher.dispatch(&[device("10.0.0.1"), device("10.0.0.2")]).await;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.auth_failed, 1);
        assert_eq!(shell.attempts()[0].0, "10.0.0.1");
    }

    #[tokio::test]
    async fn devices_are_contacted_in_config_order_despite_failures() {
        let shell = Arc::new(ScriptedShell::with(&[
            ("switch", Outcome::Unreachable),
            ("ap-2", Outcome::AuthFails),
        ]));
        let dispatcher = ShutdownDispatcher::new(shell.clone(), "poweroff");

        let summary = dispatcher
            .dispatch(&[device("ap-1"), device("switch"), device("ap-2"), device("gateway")])
            .await;

        let order: Vec<String> = shell.attempts().into_iter().map(|(host, _)| host).collect();
        assert_eq!(order, vec!["ap-1", "switch", "ap-2", "gateway"]);
        assert_eq!(summary, DispatchSummary { succeeded: 2, auth_failed: 1, connection_failed: 1 });
    }
}
