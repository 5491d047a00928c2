//! junosight SSH layer
//!
//! Connection management for scraping network devices over SSH.
//!
//! # Overview
//!
//! This crate provides:
//! - [`Device`] and [`AuthMethod`] describing what to connect to
//! - [`Transport`] and [`Dialer`] seams, with the russh-backed [`SshDialer`]
//! - [`ConnectionPool`] owning one self-healing [`PooledConnection`] per host
//! - [`CommandClient`] for running a command and parsing the structured reply
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use junosight_ssh::{CommandClient, ConnectError, ConnectionPool, Device, PoolConfig, SshDialer};
//!
//! let pool = ConnectionPool::new(SshDialer::default(), PoolConfig::default());
//! let device = Arc::new(Device::with_password("10.0.0.1", "netops", "secret"));
//!
//! let conn = pool.acquire(&device).await?;
//! let client = CommandClient::new(conn);
//! let bytes = client.execute("show version", |b| Ok::<_, ConnectError>(b.to_vec())).await?;
//!
//! pool.shutdown_all().await;
//! ```

mod client;
mod device;
mod error;
mod pool;
mod ssh;
mod transport;

pub use client::{CommandChannel, CommandClient, STRUCTURED_OUTPUT_SUFFIX};
pub use device::{AuthMethod, DEFAULT_PORT, Device};
pub use error::{ConnectError, Result};
pub use pool::{ConnectionPool, ConnectionState, PoolConfig, PooledConnection};
pub use ssh::{DEFAULT_CONNECT_TIMEOUT, SshDialer, SshTransport};
pub use transport::{Dialer, Transport};
