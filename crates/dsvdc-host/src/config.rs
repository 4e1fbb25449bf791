use std::net::SocketAddr;
use std::time::Duration;

use dsvdc_dsuid::{Dsuid, DEFAULT_HOST_DSUID};

/// Name used when none is configured.
pub const DEFAULT_HOST_NAME: &str = "default-vDC-Host";

/// Application limit on encoded message bodies, below the 16-bit frame limit.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024;

/// Configuration of a vDC host and its server.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Host dSUID. Falls back to [`DEFAULT_HOST_DSUID`].
    pub dsuid: Option<Dsuid>,
    /// Human-readable host name.
    pub name: String,
    /// Listen address. Port 0 lets the OS pick a free port.
    pub listen: SocketAddr,
    /// Largest message body accepted or sent.
    pub max_message_size: usize,
    /// Poll interval while waiting for the controller to connect.
    pub connect_poll_interval: Duration,
    /// Pending requests older than this are evicted. `None` keeps them forever.
    pub request_max_age: Option<Duration>,
    /// Connections without inbound traffic for this long are closed.
    pub idle_timeout: Duration,
    /// Set `TCP_NODELAY` on accepted connections.
    pub tcp_nodelay: bool,
}

impl HostConfig {
    /// The dSUID the host will use.
    pub fn host_dsuid(&self) -> Dsuid {
        self.dsuid.unwrap_or(DEFAULT_HOST_DSUID)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            dsuid: None,
            name: DEFAULT_HOST_NAME.to_string(),
            listen: SocketAddr::from(([0, 0, 0, 0], 0)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            connect_poll_interval: Duration::from_secs(1),
            request_max_age: Some(Duration::from_secs(30)),
            idle_timeout: Duration::from_secs(3600),
            tcp_nodelay: true,
        }
    }
}
