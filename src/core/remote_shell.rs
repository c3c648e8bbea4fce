// src/core/remote_shell.rs

//! Key-authenticated remote shell adapter. Host keys are never
//! checked — containers are freshly provisioned and have no prior
//! host key for the control plane to pin.

use crate::core::errors::KothError;
use async_ssh2_tokio::client::{AuthMethod, Client, ServerCheckMethod};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

const SSH_PORT: u16 = 22;
const RETRY_GAP: Duration = Duration::from_secs(3);

/// A single SSH session against a container, scoped to its caller and
/// always released on drop.
pub struct RemoteShell {
    client: Client,
}

impl RemoteShell {
    /// Opens one session against `ip:22` as `root`, authenticating with
    /// the control plane's private key, ignoring host keys.
    pub async fn connect(ip: &str, private_key_path: &str) -> Result<Self, KothError> {
        let auth = AuthMethod::with_key_file(private_key_path, None);
        let client = Client::connect((ip, SSH_PORT), "root", auth, ServerCheckMethod::NoCheck)
            .await
            .map_err(|e| KothError::Transient(format!("ssh connect to {ip} failed: {e}")))?;
        Ok(Self { client })
    }

    /// Retries connection establishment up to `attempts` times, with a
    /// 3-second gap between tries.
    pub async fn connect_with_retries(
        ip: &str,
        private_key_path: &str,
        attempts: u32,
    ) -> Result<Self, KothError> {
        let mut last_err = None;
        for attempt in 1..=attempts {
            match Self::connect(ip, private_key_path).await {
                Ok(shell) => return Ok(shell),
                Err(e) => {
                    warn!("ssh connect attempt {attempt}/{attempts} to {ip} failed: {e}");
                    last_err = Some(e);
                    sleep(RETRY_GAP).await;
                }
            }
        }
        Err(last_err.unwrap_or(KothError::Transient(format!("could not connect to {ip}"))))
    }

    /// Runs `cmd`, discarding its output; fails only if the command
    /// could not be executed at all (a non-zero exit is not an error
    /// here, matching [`RemoteShell::send_with_output`]'s contract).
    pub async fn send(&self, cmd: &str) -> Result<(), KothError> {
        self.send_with_output(cmd).await?;
        Ok(())
    }

    /// Runs `cmd` and returns `(exit_code, combined stdout+stderr)`. A
    /// non-zero exit code is reported in the tuple, not as an `Err`.
    pub async fn send_with_output(&self, cmd: &str) -> Result<(i32, String), KothError> {
        let result = self
            .client
            .execute(cmd)
            .await
            .map_err(|e| KothError::Transient(format!("ssh exec failed: {e}")))?;

        let combined = if result.stderr.is_empty() {
            result.stdout
        } else {
            format!("{}{}", result.stdout, result.stderr)
        };

        Ok((result.exit_status as i32, combined))
    }
}
