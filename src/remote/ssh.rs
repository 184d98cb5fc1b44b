//! OpenSSH client executor.
//! Runs one `ssh` process per device; password sessions go through `sshpass -e`
//! with the secret in the environment, never on the command line.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::error::RemoteError;
use crate::remote::{Credential, RemoteDevice, RemoteShell};

/// sshpass exit status for a rejected password.
const SSHPASS_INVALID_PASSWORD: i32 = 5;
/// ssh exit status for any client-side failure (connect, auth, protocol).
const SSH_CLIENT_ERROR: i32 = 255;
/// Keepalive checks before ssh drops a session to a device that went silent.
const SERVER_ALIVE_INTERVAL_SECS: u64 = 5;
const SERVER_ALIVE_COUNT_MAX: u64 = 2;
/// Time allowed after connecting for the command to be sent and the session to close.
const COMMAND_GRACE: Duration = Duration::from_secs(15);

pub struct SshShell {
    connect_timeout: Duration,
    command_grace: Duration,
    ssh: Vec<String>,
}

impl SshShell {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            command_grace: COMMAND_GRACE,
            ssh: vec!["ssh".to_string()],
        }
    }

    /// Replace the `ssh` client argv prefix and the post-connect grace period.
    #[cfg(test)]
    pub(crate) fn with_client(connect_timeout: Duration, command_grace: Duration, ssh: &[&str]) -> Self {
        Self {
            connect_timeout,
            command_grace,
            ssh: ssh.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Upper bound on one whole session: connection attempt plus the grace period.
    fn session_limit(&self) -> Duration {
        self.connect_timeout.max(Duration::from_secs(1)).saturating_add(self.command_grace)
    }

    /// Build the client command for one device. Key sessions run in batch mode;
    /// password sessions are wrapped in sshpass and allow exactly one prompt.
    pub fn build_command(&self, device: &RemoteDevice, remote_command: &str) -> std::process::Command {
        let timeout = format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1));
        let destination = format!("{}@{}", device.username, device.host);

        let mut cmd = match &device.credential {
            Credential::KeyFile(key) => {
                let mut cmd = std::process::Command::new(&self.ssh[0]);
                cmd.args(&self.ssh[1..]);
                cmd.arg("-i").arg(key);
                cmd.args(["-o", "BatchMode=yes", "-o", "IdentitiesOnly=yes", "-o", "PasswordAuthentication=no"]);
                cmd
            }
            Credential::Password(password) => {
                let mut cmd = std::process::Command::new("sshpass");
                cmd.env("SSHPASS", password);
                cmd.arg("-e").args(&self.ssh);
                cmd.args([
                    "-o", "PubkeyAuthentication=no",
                    "-o", "PreferredAuthentications=password,keyboard-interactive",
                    "-o", "NumberOfPasswordPrompts=1",
                ]);
                cmd
            }
        };

        let alive_interval = format!("ServerAliveInterval={}", SERVER_ALIVE_INTERVAL_SECS);
        let alive_count = format!("ServerAliveCountMax={}", SERVER_ALIVE_COUNT_MAX);
        cmd.args([
            "-o", timeout.as_str(),
            "-o", alive_interval.as_str(),
            "-o", alive_count.as_str(),
            "-o", "StrictHostKeyChecking=accept-new",
        ]);
        cmd.arg(destination).arg(remote_command);
        cmd
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn run_once(&self, device: &RemoteDevice, command: &str) -> Result<(), RemoteError> {
        let cmd = self.build_command(device, command);
        trace!("Executing: {:?} {:?}", cmd.get_program(), cmd.get_args().collect::<Vec<_>>());

        let child = tokio::process::Command::from(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RemoteError::Connection {
                host: device.host.clone(),
                detail: format!("failed to start ssh client: {}", e),
            })?;

        // ConnectTimeout bounds the connection; past this limit the session is up and the
        // command went out, so the client is killed and the device counted as sent.
        let limit = self.session_limit();
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| RemoteError::Connection {
                host: device.host.clone(),
                detail: format!("ssh client failed: {}", e),
            })?,
            Err(_) => {
                warn!(
                    "{}: session still open after {}s, closing it without waiting for the device",
                    device.host,
                    limit.as_secs()
                );
                return Ok(());
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        let via_sshpass = matches!(device.credential, Credential::Password(_));
        classify_exit(&device.host, output.status.code(), &stderr, via_sshpass)
    }
}

/// Map the client's exit status and stderr onto the per-device outcome.
pub(crate) fn classify_exit(host: &str, code: Option<i32>, stderr: &str, via_sshpass: bool) -> Result<(), RemoteError> {
    let detail = stderr.trim().lines().last().unwrap_or("no diagnostic output").to_string();

    match code {
        Some(0) => Ok(()),
        Some(SSHPASS_INVALID_PASSWORD) if via_sshpass => Err(RemoteError::Auth {
            host: host.to_string(),
            detail: "password rejected".to_string(),
        }),
        // sshpass gave up before the remote command could run.
        Some(code @ (1..=4 | 6)) if via_sshpass => Err(RemoteError::Connection {
            host: host.to_string(),
            detail: format!("sshpass exited with status {} ({})", code, sshpass_failure(code)),
        }),
        Some(SSH_CLIENT_ERROR) => {
            if is_auth_failure(stderr) {
                Err(RemoteError::Auth { host: host.to_string(), detail })
            } else if stderr.contains("kex_exchange_identification") {
                Err(RemoteError::Connection { host: host.to_string(), detail })
            } else if stderr.contains("closed by remote host") {
                // The device dropped the session while powering off.
                debug!("{}: session closed by remote host after command", host);
                Ok(())
            } else {
                Err(RemoteError::Connection { host: host.to_string(), detail })
            }
        }
        Some(code) => {
            warn!("{}: power-off command exited with status {} ({})", host, code, detail);
            Ok(())
        }
        None => Err(RemoteError::Connection {
            host: host.to_string(),
            detail: "ssh client terminated by signal".to_string(),
        }),
    }
}

fn sshpass_failure(code: i32) -> &'static str {
    match code {
        1 => "invalid command line arguments",
        2 => "conflicting arguments",
        3 => "general runtime error",
        4 => "unrecognised response from ssh",
        6 => "host public key is unknown",
        _ => "unknown error",
    }
}

fn is_auth_failure(stderr: &str) -> bool {
    ["Permission denied", "Authentication failed", "Too many authentication failures"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    fn device(credential: Credential) -> RemoteDevice {
        RemoteDevice { host: "10.0.0.2".to_string(), username: "ubnt".to_string(), credential }
    }

    fn args(cmd: &std::process::Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect()
    }

    #[test]
    fn key_session_uses_identity_file_in_batch_mode() {
        let shell = SshShell::new(Duration::from_secs(10));
        let cmd = shell.build_command(&device(Credential::KeyFile(PathBuf::from("/keys/id_ed25519"))), "poweroff");
        let args = args(&cmd);

        assert_eq!(cmd.get_program(), OsStr::new("ssh"));
        assert_eq!(&args[..2], &["-i", "/keys/id_ed25519"]);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert_eq!(&args[args.len() - 2..], &["ubnt@10.0.0.2", "poweroff"]);
    }

    #[test]
    fn password_session_keeps_secret_off_the_command_line() {
        let shell = SshShell::new(Duration::from_secs(10));
        let cmd = shell.build_command(&device(Credential::Password("hunter2".to_string())), "poweroff");

        assert_eq!(cmd.get_program(), OsStr::new("sshpass"));
        assert!(!args(&cmd).iter().any(|a| a.contains("hunter2")));
        let env: Vec<_> = cmd.get_envs().collect();
        assert_eq!(env, vec![(OsStr::new("SSHPASS"), Some(OsStr::new("hunter2")))]);
    }

    #[test]
    fn permission_denied_is_an_auth_error() {
        let err = classify_exit("h", Some(255), "ubnt@h: Permission denied (publickey).\n", false).unwrap_err();
        assert!(matches!(err, RemoteError::Auth { .. }));
    }

    #[test]
    fn sshpass_rejected_password_is_an_auth_error() {
        let err = classify_exit("h", Some(5), "", true).unwrap_err();
        assert!(matches!(err, RemoteError::Auth { .. }));
    }

    #[test]
    fn unreachable_host_is_a_connection_error() {
        let err = classify_exit("h", Some(255), "ssh: connect to host h port 22: Connection timed out\n", false)
            .unwrap_err();
        assert!(matches!(err, RemoteError::Connection { .. }));

        let err = classify_exit("h", Some(255), "kex_exchange_identification: Connection closed by remote host\n", false)
            .unwrap_err();
        assert!(matches!(err, RemoteError::Connection { .. }));
    }

    #[test]
    fn dropped_session_after_poweroff_counts_as_sent() {
        assert!(classify_exit("h", Some(255), "Connection to h closed by remote host.\n", false).is_ok());
    }

    #[test]
    fn remote_command_status_is_not_verified() {
        assert!(classify_exit("h", Some(0), "", false).is_ok());
        assert!(classify_exit("h", Some(1), "poweroff: not found\n", false).is_ok());
    }

    #[test]
    fn sshpass_own_failures_are_connection_errors() {
        for code in [1, 2, 3, 4, 6] {
            let err = classify_exit("h", Some(code), "", true).unwrap_err();
            assert!(matches!(err, RemoteError::Connection { .. }), "status {}", code);
        }
        // Without sshpass the same statuses come from the remote command.
        assert!(classify_exit("h", Some(6), "", false).is_ok());
    }

    #[test]
    fn session_keeps_alive_checks_enabled() {
        let shell = SshShell::new(Duration::from_secs(10));
        let args = args(&shell.build_command(&device(Credential::Password("pw".to_string())), "poweroff"));
        assert!(args.contains(&"ServerAliveInterval=5".to_string()));
        assert!(args.contains(&"ServerAliveCountMax=2".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hanging_session_is_abandoned_and_counted_as_sent() {
        let shell = SshShell::with_client(
            Duration::from_secs(1),
            Duration::from_millis(200),
            &["sh", "-c", "exec sleep 30", "ssh"],
        );
        let started = std::time::Instant::now();

        let result = shell.run_once(&device(Credential::KeyFile(PathBuf::from("/keys/id"))), "poweroff").await;

        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn client_stderr_is_classified_after_exit() {
        let shell = SshShell::with_client(
            Duration::from_secs(1),
            Duration::from_secs(5),
            &["sh", "-c", "echo 'ubnt@h: Permission denied (publickey).' >&2; exit 255", "ssh"],
        );

        let err = shell
            .run_once(&device(Credential::KeyFile(PathBuf::from("/keys/id"))), "poweroff")
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteError::Auth { .. }));
    }
}
