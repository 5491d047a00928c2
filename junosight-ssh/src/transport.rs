//! Transport seams between the pool and the wire.

use async_trait::async_trait;

use crate::device::Device;
use crate::error::Result;

/// An authenticated command channel to one device.
///
/// The pool guarantees that at most one of `run`, `probe` and `close` is in
/// progress at any time for a given transport.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Execute one command and return its standard output.
    async fn run(&mut self, command: &str) -> Result<Vec<u8>>;

    /// Cheap liveness check.
    async fn probe(&mut self) -> Result<()>;

    /// Tear the session down. Errors are swallowed.
    async fn close(&mut self);
}

/// Produces authenticated transports.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Transport: Transport;

    /// Dial and authenticate against `device`.
    async fn dial(&self, device: &Device) -> Result<Self::Transport>;
}
