//! Polling loop: sample, persist, evaluate the shutdown predicate, sleep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::types::MonitorSettings;
use crate::error::StoreError;
use crate::storage::TelemetryStore;
use crate::ups::{Snapshot, UpsSource};

pub mod shutdown;

pub use shutdown::{LocalPowerOff, ShutdownSequence};

/// Why the loop stopped. `main` turns this into the process exit status.
#[derive(Debug)]
pub enum MonitorExit {
    /// The shutdown sequence ran to completion.
    ShutdownComplete,
    /// The telemetry store became unusable.
    StorageLost(StoreError),
    /// SIGINT/SIGTERM received while idle.
    Stopped,
}

/// True when the UPS is on battery and the charge is strictly below `threshold` percent.
pub fn should_shut_down(snapshot: &Snapshot, threshold: u8) -> bool {
    snapshot.on_battery() && snapshot.battery_charge_pct < f64::from(threshold)
}

pub struct MonitorLoop {
    source: Arc<dyn UpsSource>,
    store: Arc<dyn TelemetryStore>,
    threshold: u8,
    interval: Duration,
    shutdown: ShutdownSequence,
    stop: watch::Receiver<bool>,
    last_status: Option<String>,
}

impl MonitorLoop {
    pub fn new(
        source: Arc<dyn UpsSource>,
        store: Arc<dyn TelemetryStore>,
        settings: &MonitorSettings,
        shutdown: ShutdownSequence,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            store,
            threshold: settings.shutdown_threshold,
            interval: Duration::from_secs(settings.poll_interval),
            shutdown,
            stop,
            last_status: None,
        }
    }

    pub async fn run(mut self) -> MonitorExit {
        info!(
            "Monitoring UPS every {}s, shutdown below {}% on battery",
            self.interval.as_secs(),
            self.threshold
        );

        loop {
            if let Some(exit) = self.run_cycle().await {
                return exit;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop_requested(&mut self.stop) => {
                    info!("Stop requested, monitor loop exiting");
                    return MonitorExit::Stopped;
                }
            }
        }
    }

    /// One poll. `Some` means the loop must end.
    pub async fn run_cycle(&mut self) -> Option<MonitorExit> {
        let snapshot = match self.source.sample().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Failed to read UPS status: {}", e);
                return None;
            }
        };

        debug!(
            "UPS: {} | charge {:.1}% | load {:.1}% | {:.1} min left",
            snapshot.status, snapshot.battery_charge_pct, snapshot.load_pct, snapshot.time_left_minutes
        );
        self.note_status(&snapshot.status);

        match self.store.append(&snapshot, None).await {
            Ok(sample) => debug!("Stored sample at {}", sample.timestamp),
            Err(e) if e.is_unrecoverable() => {
                error!("❌ Telemetry storage lost: {}", e);
                return Some(MonitorExit::StorageLost(e));
            }
            Err(e) => error!("Failed to store UPS data: {}", e),
        }

        if should_shut_down(&snapshot, self.threshold) {
            warn!("UPS power lost and battery threshold reached. Initiating shutdown sequence...");
            warn!(
                "Battery at {:.1}% (threshold {}%), {:.1} min left",
                snapshot.battery_charge_pct, self.threshold, snapshot.time_left_minutes
            );
            self.shutdown.execute().await;
            info!("Shutdown sequence complete");
            return Some(MonitorExit::ShutdownComplete);
        }

        None
    }

    fn note_status(&mut self, status: &str) {
        if self.last_status.as_deref() == Some(status) {
            return;
        }
        match self.last_status.replace(status.to_string()) {
            Some(previous) => info!("UPS status changed: {} -> {}", previous, status),
            None => info!("UPS status: {}", status),
        }
    }
}

/// Resolves once a stop has been signalled. Never resolves if the sender is gone.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}
