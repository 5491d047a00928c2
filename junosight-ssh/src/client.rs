//! Command client used by feature collectors.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ConnectError, Result};
use crate::pool::PooledConnection;
use crate::transport::Transport;

/// Suffix asking the device for structured (XML) output.
pub const STRUCTURED_OUTPUT_SUFFIX: &str = " | display xml";

/// Something that can run a device command. Object safe so collectors do not
/// depend on the concrete transport.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Host the commands are sent to.
    fn host(&self) -> &str;

    /// Run one command and return its raw output.
    async fn run_command(&self, command: &str) -> Result<Vec<u8>>;
}

#[async_trait]
impl<T: Transport> CommandChannel for PooledConnection<T> {
    fn host(&self) -> &str {
        &self.device().host
    }

    async fn run_command(&self, command: &str) -> Result<Vec<u8>> {
        PooledConnection::run_command(self, command).await
    }
}

/// Issues one command at a time and hands the reply to a caller-provided parser.
///
/// No retries happen here; retry policy belongs to the caller.
#[derive(Clone)]
pub struct CommandClient {
    channel: Arc<dyn CommandChannel>,
}

impl CommandClient {
    /// Wrap a command channel.
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self { channel }
    }

    /// Host this client talks to.
    pub fn host(&self) -> &str {
        self.channel.host()
    }

    /// Run `command` with structured output requested and parse the reply.
    ///
    /// Transport and remote failures surface as `E::from(ConnectError)`;
    /// parse failures are whatever `parse` returns.
    pub async fn execute<T, E, F>(&self, command: &str, parse: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&[u8]) -> std::result::Result<T, E>,
        E: From<ConnectError>,
    {
        let output = self
            .channel
            .run_command(&structured(command))
            .await
            .map_err(E::from)?;
        parse(&output)
    }

    /// Run `command` verbatim and return the raw output.
    pub async fn execute_raw(&self, command: &str) -> Result<Vec<u8>> {
        self.channel.run_command(command).await
    }
}

fn structured(command: &str) -> String {
    format!("{}{}", command.trim_end(), STRUCTURED_OUTPUT_SUFFIX)
}
