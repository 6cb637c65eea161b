//! Client configuration

use std::time::Duration;

/// Number of idle tunnel connections the pool keeps pre-established.
pub const PRE_CONNECTION_COUNT: usize = 10;

/// Window of byte-count inactivity after which a tunnel connection is
/// recycled.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(58);

/// Cadence of client-side heartbeats on the control channel.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(55);

/// Pause before the control channel redials after losing the server. Fixed;
/// the control channel never backs off.
pub const CONTROL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Connection settings for the relay server.
///
/// `server_addr` and `token` identify this client to the relay; the remaining
/// fields are timing and sizing knobs that default to the production
/// constants above.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay server address (host:port).
    pub server_addr: String,

    /// Opaque token forwarded verbatim on every handshake.
    pub token: String,

    /// Target number of idle tunnel connections to keep ready.
    pub pool_size: usize,

    /// Interval between heartbeats on the control channel.
    pub heartbeat_interval: Duration,

    /// Pause before the control channel redials after a disconnect.
    pub control_reconnect_delay: Duration,

    /// Watchdog window for tunnel connections.
    pub idle_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration with production defaults.
    pub fn new(server_addr: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            token: token.into(),
            pool_size: PRE_CONNECTION_COUNT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            control_reconnect_delay: CONTROL_RECONNECT_DELAY,
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    /// Override the pool target size.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Override the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Override the control-channel redial pause.
    pub fn with_control_reconnect_delay(mut self, delay: Duration) -> Self {
        self.control_reconnect_delay = delay;
        self
    }

    /// Override the tunnel idle-timeout window.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Whether both the server address and the token have been supplied.
    pub fn is_complete(&self) -> bool {
        !self.server_addr.is_empty() && !self.token.is_empty()
    }
}
