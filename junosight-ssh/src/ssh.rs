//! SSH transport built on russh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use secrecy::ExposeSecret;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::device::{AuthMethod, Device};
use crate::error::{ConnectError, Result};
use crate::transport::{Dialer, Transport};

/// Default dial + handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client-side handler. Device host keys are not pinned.
struct DeviceHandler;

#[async_trait]
impl client::Handler for DeviceHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Dials devices over SSH.
pub struct SshDialer {
    config: Arc<client::Config>,
    connect_timeout: Duration,
}

impl SshDialer {
    /// Create a dialer with the given connect timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            config: Arc::new(client::Config::default()),
            connect_timeout,
        }
    }

    async fn authenticate(&self, handle: &mut Handle<DeviceHandler>, device: &Device) -> Result<()> {
        let accepted = match &device.auth {
            AuthMethod::Password(password) => handle
                .authenticate_password(device.username.as_str(), password.expose_secret())
                .await
                .map_err(|e| ConnectError::dial(&device.host, e))?,
            AuthMethod::PublicKey {
                key_file,
                passphrase,
            } => {
                let key_pair = russh_keys::load_secret_key(
                    key_file,
                    passphrase.as_ref().map(|p| p.expose_secret()),
                )
                .map_err(|e| ConnectError::Key {
                    path: key_file.display().to_string(),
                    message: e.to_string(),
                })?;

                handle
                    .authenticate_publickey(device.username.as_str(), Arc::new(key_pair))
                    .await
                    .map_err(|e| ConnectError::dial(&device.host, e))?
            }
        };

        if accepted {
            Ok(())
        } else {
            Err(ConnectError::Auth {
                host: device.host.clone(),
                user: device.username.clone(),
            })
        }
    }
}

impl Default for SshDialer {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Dialer for SshDialer {
    type Transport = SshTransport;

    async fn dial(&self, device: &Device) -> Result<SshTransport> {
        let address = device.address();
        debug!(device = %device.host, address = %address, "Dialing device");

        let connect = client::connect(self.config.clone(), address, DeviceHandler);
        let mut handle = timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| ConnectError::Timeout {
                host: device.host.clone(),
                timeout: self.connect_timeout,
            })?
            .map_err(|e| ConnectError::dial(&device.host, e))?;

        timeout(self.connect_timeout, self.authenticate(&mut handle, device))
            .await
            .map_err(|_| ConnectError::Timeout {
                host: device.host.clone(),
                timeout: self.connect_timeout,
            })??;

        debug!(device = %device.host, user = %device.username, "Authenticated");

        Ok(SshTransport {
            host: device.host.clone(),
            handle,
        })
    }
}

/// An authenticated SSH session. Each command runs on its own exec channel.
pub struct SshTransport {
    host: String,
    handle: Handle<DeviceHandler>,
}

#[async_trait]
impl Transport for SshTransport {
    async fn run(&mut self, command: &str) -> Result<Vec<u8>> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                _ => {}
            }
        }

        trace!(device = %self.host, command, bytes = stdout.len(), "Command finished");

        command_outcome(command, exit_status, stdout, &stderr)
    }

    async fn probe(&mut self) -> Result<()> {
        let channel = self.handle.channel_open_session().await?;
        channel.close().await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!(device = %self.host, error = %e, "Error while disconnecting");
        }
    }
}

/// Map a finished exec channel to its result.
///
/// A channel that closes without reporting an exit status was cut off
/// mid-reply, so its output is truncated and the session is suspect.
fn command_outcome(
    command: &str,
    exit_status: Option<u32>,
    stdout: Vec<u8>,
    stderr: &[u8],
) -> Result<Vec<u8>> {
    match exit_status {
        Some(0) => Ok(stdout),
        Some(status) => Err(ConnectError::Command {
            command: command.to_string(),
            status,
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }),
        None => Err(ConnectError::transport(format!(
            "channel closed without exit status after {} bytes of `{}`",
            stdout.len(),
            command
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_exit_returns_output() {
        let output = command_outcome("show version", Some(0), b"<ok/>".to_vec(), b"").unwrap();
        assert_eq!(output, b"<ok/>");
    }

    #[test]
    fn test_nonzero_exit_is_command_error() {
        let err = command_outcome("show bogus", Some(1), Vec::new(), b" syntax error \n")
            .unwrap_err();

        assert!(!err.is_transport());
        match err {
            ConnectError::Command { status, stderr, .. } => {
                assert_eq!(status, 1);
                assert_eq!(stderr, "syntax error");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_exit_status_is_transport_error() {
        let err = command_outcome("show interfaces", None, b"<rpc-re".to_vec(), b"").unwrap_err();
        assert!(err.is_transport());
    }
}
