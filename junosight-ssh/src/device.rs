//! Device inventory model.

use std::fmt;
use std::path::PathBuf;

use secrecy::SecretString;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// A device to scrape. Built once from configuration and shared as `Arc<Device>`.
#[derive(Debug, Clone)]
pub struct Device {
    /// Hostname or IP address; also the identity used by the connection pool.
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// How to authenticate.
    pub auth: AuthMethod,
}

/// SSH authentication method.
#[derive(Clone)]
pub enum AuthMethod {
    /// Password authentication.
    Password(SecretString),
    /// Public key authentication with an optionally encrypted key file.
    PublicKey {
        key_file: PathBuf,
        passphrase: Option<SecretString>,
    },
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password(_) => f.write_str("Password(..)"),
            AuthMethod::PublicKey {
                key_file,
                passphrase,
            } => f
                .debug_struct("PublicKey")
                .field("key_file", key_file)
                .field("encrypted", &passphrase.is_some())
                .finish(),
        }
    }
}

impl Device {
    /// Create a device using password authentication on the default port.
    pub fn with_password(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            auth: AuthMethod::Password(SecretString::from(password.into())),
        }
    }

    /// Create a device using key authentication on the default port.
    pub fn with_key(
        host: impl Into<String>,
        username: impl Into<String>,
        key_file: impl Into<PathBuf>,
        passphrase: Option<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            auth: AuthMethod::PublicKey {
                key_file: key_file.into(),
                passphrase: passphrase.map(SecretString::from),
            },
        }
    }

    /// Override the SSH port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port` for dialing.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
