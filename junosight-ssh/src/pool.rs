//! Per-device connection pool.
//!
//! The pool owns at most one live [`PooledConnection`] per host. Connections
//! are created lazily by [`ConnectionPool::acquire`], kept alive by a
//! background task, and torn down when a keepalive probe fails, when they sit
//! idle longer than the configured window, or on [`ConnectionPool::shutdown_all`].
//!
//! Locking:
//! - the host map sits behind a read/write lock that is never held across I/O;
//! - each connection serializes its transport behind its own async mutex, which
//!   both foreground commands and the keepalive probe must take.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout};
use tracing::{debug, info, trace, warn};

use crate::device::Device;
use crate::error::{ConnectError, Result};
use crate::ssh::SshDialer;
use crate::transport::{Dialer, Transport};

/// Pool timing configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum delay between two dial attempts to a host after a failure.
    pub reconnect_interval: Duration,
    /// How often an idle connection is probed.
    pub keepalive_interval: Duration,
    /// How long a probe may take before the connection is declared dead.
    pub keepalive_timeout: Duration,
    /// Connections unused for this long are closed regardless of health.
    pub idle_expiry: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(10),
            keepalive_timeout: Duration::from_secs(5),
            idle_expiry: Duration::from_secs(300),
        }
    }
}

/// Lifecycle of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Authenticated but not yet handed out.
    Connecting,
    /// Installed in the pool and usable.
    Connected,
    /// Closed. Never becomes usable again.
    Terminated,
}

/// A reusable, authenticated session to one device.
pub struct PooledConnection<T: Transport> {
    device: Arc<Device>,
    transport: AsyncMutex<Option<T>>,
    state: Mutex<ConnectionState>,
    last_used: Mutex<Instant>,
    in_flight: AtomicUsize,
    stop: watch::Sender<bool>,
}

impl<T: Transport> fmt::Debug for PooledConnection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("host", &self.device.host)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish()
    }
}

/// Marks a command as in flight until dropped, including on cancellation.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T: Transport> PooledConnection<T> {
    fn new(device: Arc<Device>, transport: T) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            device,
            transport: AsyncMutex::new(Some(transport)),
            state: Mutex::new(ConnectionState::Connecting),
            last_used: Mutex::new(Instant::now()),
            in_flight: AtomicUsize::new(0),
            stop,
        }
    }

    /// The device this connection talks to.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Time since the connection was last used by a command.
    pub fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }

    fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    /// Whether a command is queued on or running over this connection.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// A busy connection is never idle, however long its command runs.
    fn is_expired(&self, idle_expiry: Duration) -> bool {
        !self.is_busy() && self.idle_for() >= idle_expiry
    }

    fn is_usable(&self, idle_expiry: Duration) -> bool {
        self.state() == ConnectionState::Connected && !self.is_expired(idle_expiry)
    }

    fn mark_connected(&self) {
        let mut state = self.state.lock();
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Connected;
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(ConnectError::NotConnected(self.device.host.clone()))
        }
    }

    /// Run one command on the shared transport.
    ///
    /// Commands on the same connection are serialized; concurrent callers
    /// queue on the connection lock. A transport-level failure terminates the
    /// connection so the next acquire redials.
    pub async fn run_command(&self, command: &str) -> Result<Vec<u8>> {
        self.ensure_connected()?;
        let _in_flight = InFlight::enter(&self.in_flight);

        let mut guard = self.transport.lock().await;
        self.ensure_connected()?;
        let transport = guard
            .as_mut()
            .ok_or_else(|| ConnectError::NotConnected(self.device.host.clone()))?;

        self.touch();
        let result = transport.run(command).await;
        self.touch();

        if let Err(e) = &result
            && e.is_transport()
        {
            warn!(device = %self.device.host, error = %e, "Transport failed, dropping connection");
            *self.state.lock() = ConnectionState::Terminated;
            self.stop.send_replace(true);
            if let Some(mut transport) = guard.take() {
                transport.close().await;
            }
        }

        result
    }

    /// Liveness probe. A connection busy with a command counts as alive.
    async fn probe(&self, probe_timeout: Duration) -> Result<()> {
        let Ok(mut guard) = self.transport.try_lock() else {
            trace!(device = %self.device.host, "Connection busy, skipping keepalive probe");
            return Ok(());
        };
        let transport = guard
            .as_mut()
            .ok_or_else(|| ConnectError::NotConnected(self.device.host.clone()))?;

        timeout(probe_timeout, transport.probe())
            .await
            .map_err(|_| ConnectError::Timeout {
                host: self.device.host.clone(),
                timeout: probe_timeout,
            })?
    }

    /// Close the connection and stop its keepalive task. Idempotent.
    pub async fn terminate(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), ConnectionState::Terminated);
        self.stop.send_replace(true);

        let mut guard = self.transport.lock().await;
        if let Some(mut transport) = guard.take() {
            transport.close().await;
        }

        if previous != ConnectionState::Terminated {
            debug!(device = %self.device.host, "Connection terminated");
        }
    }

    fn start_keepalive(self: &Arc<Self>, config: PoolConfig) {
        let stop = self.stop.subscribe();
        tokio::spawn(keepalive_loop(self.clone(), config, stop));
    }
}

/// Background task: probes the connection on its own schedule and enforces
/// idle expiry. Exits once the connection is terminated.
async fn keepalive_loop<T: Transport>(
    conn: Arc<PooledConnection<T>>,
    config: PoolConfig,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(
        Instant::now() + config.keepalive_interval,
        config.keepalive_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut not_before = Instant::now();

    loop {
        if *stop.borrow() {
            break;
        }

        let expires_at = (conn.last_used() + config.idle_expiry).max(not_before);

        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = sleep_until(expires_at) => {
                if conn.is_busy() {
                    trace!(device = %conn.device.host, "Connection busy, deferring idle expiry");
                    not_before = Instant::now() + config.keepalive_interval.min(config.idle_expiry);
                } else if conn.is_expired(config.idle_expiry) {
                    info!(
                        device = %conn.device.host,
                        idle_secs = conn.idle_for().as_secs(),
                        "Connection idle for too long, closing"
                    );
                    conn.terminate().await;
                    break;
                }
            }
            _ = ticker.tick() => {
                match conn.probe(config.keepalive_timeout).await {
                    Ok(()) => trace!(device = %conn.device.host, "Keepalive ok"),
                    Err(e) => {
                        warn!(device = %conn.device.host, error = %e, "Keepalive failed, closing connection");
                        conn.terminate().await;
                        break;
                    }
                }
            }
        }
    }
}

/// Owns one connection per device host.
///
/// Lives for the whole process and is shared by reference (`Arc`) with the
/// scrape orchestrator. Call [`shutdown_all`](Self::shutdown_all) before exit.
pub struct ConnectionPool<D: Dialer = SshDialer> {
    dialer: D,
    config: PoolConfig,
    connections: RwLock<HashMap<String, Arc<PooledConnection<D::Transport>>>>,
    failed_dials: Mutex<HashMap<String, Instant>>,
}

impl<D: Dialer> ConnectionPool<D> {
    /// Create an empty pool.
    pub fn new(dialer: D, config: PoolConfig) -> Self {
        Self {
            dialer,
            config,
            connections: RwLock::new(HashMap::new()),
            failed_dials: Mutex::new(HashMap::new()),
        }
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Return a ready connection for `device`, dialing if needed.
    pub async fn acquire(
        &self,
        device: &Arc<Device>,
    ) -> Result<Arc<PooledConnection<D::Transport>>> {
        if let Some(conn) = self.lookup(&device.host) {
            conn.touch();
            return Ok(conn);
        }

        self.check_backoff(&device.host)?;

        let transport = match self.dialer.dial(device).await {
            Ok(transport) => {
                self.failed_dials.lock().remove(&device.host);
                transport
            }
            Err(e) => {
                self.failed_dials
                    .lock()
                    .insert(device.host.clone(), Instant::now());
                return Err(e);
            }
        };

        let conn = Arc::new(PooledConnection::new(device.clone(), transport));
        conn.mark_connected();
        conn.start_keepalive(self.config.clone());

        let installed = {
            let mut connections = self.connections.write();
            match connections.get(&device.host) {
                Some(existing) if existing.is_usable(self.config.idle_expiry) => {
                    Err(existing.clone())
                }
                _ => Ok(connections.insert(device.host.clone(), conn.clone())),
            }
        };

        match installed {
            Ok(replaced) => {
                if let Some(old) = replaced {
                    old.terminate().await;
                }
                info!(device = %device.host, "Connected");
                Ok(conn)
            }
            Err(winner) => {
                debug!(device = %device.host, "Lost connection race, closing duplicate");
                conn.terminate().await;
                winner.touch();
                Ok(winner)
            }
        }
    }

    fn lookup(&self, host: &str) -> Option<Arc<PooledConnection<D::Transport>>> {
        let connections = self.connections.read();
        connections
            .get(host)
            .filter(|conn| conn.is_usable(self.config.idle_expiry))
            .cloned()
    }

    fn check_backoff(&self, host: &str) -> Result<()> {
        let failed_dials = self.failed_dials.lock();
        if let Some(failed_at) = failed_dials.get(host) {
            let elapsed = failed_at.elapsed();
            if elapsed < self.config.reconnect_interval {
                return Err(ConnectError::Backoff {
                    host: host.to_string(),
                    remaining: self.config.reconnect_interval - elapsed,
                });
            }
        }
        Ok(())
    }

    /// Number of pooled entries (live or awaiting replacement).
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether the pool holds no entries.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// State of the pooled connection for `host`, if any.
    pub fn state_of(&self, host: &str) -> Option<ConnectionState> {
        self.connections.read().get(host).map(|conn| conn.state())
    }

    /// Terminate every connection and stop every keepalive task.
    pub async fn shutdown_all(&self) {
        let drained: Vec<_> = self
            .connections
            .write()
            .drain()
            .map(|(_, conn)| conn)
            .collect();

        let count = drained.len();
        for conn in drained {
            conn.terminate().await;
        }

        info!(closed = count, "Connection pool shut down");
    }
}
