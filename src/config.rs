//! Server configuration.

use crate::error::ConfigError;
use crate::http::DEFAULT_MAX_BODY_BYTES;
use crate::session::TransportConfig;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_SSE_KEEP_ALIVE_SECS: u64 = 15;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Bounds for how often the idle reaper runs.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `None` keeps sessions until they are deleted.
    pub session_idle_timeout: Option<Duration>,
    pub sse_keep_alive: Option<Duration>,
    /// Answer POSTs with JSON even when the client accepts SSE.
    pub json_response: bool,
    pub upstream_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            session_idle_timeout: nonzero_secs(DEFAULT_SESSION_IDLE_TIMEOUT_SECS),
            sse_keep_alive: nonzero_secs(DEFAULT_SSE_KEEP_ALIVE_SECS),
            json_response: false,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Resolve `host:port` to a listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = self.host.trim().trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        let invalid = |reason: String| ConfigError::InvalidBindAddress {
            addr: format!("{}:{}", self.host, self.port),
            reason,
        };
        if host.is_empty() {
            return Err(invalid("host is empty".to_string()));
        }
        (host, self.port)
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("host resolved to no addresses".to_string()))
    }

    /// How often the idle reaper sweeps, if enabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.session_idle_timeout
            .map(|idle| (idle / 4).clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL))
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            keep_alive: self.sse_keep_alive,
        }
    }
}

/// Seconds as a duration, with 0 meaning "disabled".
pub fn nonzero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
