//! Error types for device connections.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`ConnectError`].
pub type Result<T> = std::result::Result<T, ConnectError>;

/// Errors raised while dialing, authenticating or talking to a device.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// TCP connect or SSH handshake failed.
    #[error("Failed to connect to {host}: {message}")]
    Dial { host: String, message: String },

    /// Dial or handshake did not finish in time.
    #[error("Connection to {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    /// The device rejected the credentials.
    #[error("Authentication failed for {user}@{host}")]
    Auth { host: String, user: String },

    /// Private key could not be loaded or decrypted.
    #[error("Failed to load private key {path}: {message}")]
    Key { path: String, message: String },

    /// A recent dial failed and the reconnect interval has not elapsed.
    #[error("Reconnect to {host} suppressed for another {remaining:?}")]
    Backoff { host: String, remaining: Duration },

    /// The connection is not (or no longer) usable.
    #[error("Not connected to {0}")]
    NotConnected(String),

    /// The session broke while running a command or probe.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote command ran but reported a failure.
    #[error("Command `{command}` failed with exit status {status}: {stderr}")]
    Command {
        command: String,
        status: u32,
        stderr: String,
    },
}

impl ConnectError {
    /// Create a dial error.
    pub fn dial(host: impl Into<String>, message: impl ToString) -> Self {
        Self::Dial {
            host: host.into(),
            message: message.to_string(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl ToString) -> Self {
        Self::Transport(message.to_string())
    }

    /// Whether the error means the underlying session is unusable.
    ///
    /// A remote command failure leaves the session intact; everything else
    /// that can happen after the connection was established does not.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotConnected(_))
    }
}

impl From<russh::Error> for ConnectError {
    fn from(err: russh::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transport() {
        assert!(ConnectError::transport("channel closed").is_transport());
        assert!(ConnectError::NotConnected("r1".into()).is_transport());
        assert!(
            !ConnectError::Command {
                command: "show version".into(),
                status: 1,
                stderr: "error: syntax error".into(),
            }
            .is_transport()
        );
        assert!(!ConnectError::dial("r1", "connection refused").is_transport());
    }

    #[test]
    fn test_display() {
        let err = ConnectError::Auth {
            host: "r1".into(),
            user: "netops".into(),
        };
        assert_eq!(err.to_string(), "Authentication failed for netops@r1");
    }
}
