//! RemoteShell trait, shutdown targets and the sequential fan-out dispatcher.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::RemoteError;

pub mod device;
pub mod dispatcher;
pub mod ssh;

pub use device::resolve_devices;
pub use dispatcher::{DispatchSummary, ShutdownDispatcher};
pub use ssh::SshShell;

/// How a device session authenticates. A key file always wins over a password.
#[derive(Clone, PartialEq)]
pub enum Credential {
    KeyFile(PathBuf),
    Password(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            Credential::Password(_) => f.write_str("Password(********)"),
        }
    }
}

/// One validated shutdown target.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDevice {
    pub host: String,
    pub username: String,
    pub credential: Credential,
}

#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Open an authenticated session, send `command` once and close the session.
    /// Success only means the command was sent, not that the device acted on it.
    async fn run_once(&self, device: &RemoteDevice, command: &str) -> Result<(), RemoteError>;
}
