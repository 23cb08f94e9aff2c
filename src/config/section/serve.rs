//! `[serve]` section configuration.
//!
//! Contains development server settings.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 5277                 # HTTP port number
//! workers = 8                 # Request handler threads
//! wait_timeout = 60           # Seconds a page request waits for its compile
//! max_pending = 64            # Page requests waiting at once
//! ```
//!
//! Use `interface = "0.0.0.0"` to make the server accessible from LAN.
//!
//! A page request that waits for its compile leaves the worker pool and
//! waits on a thread of its own, so `workers` only bounds requests that are
//! answered right away. `max_pending` bounds the waiting ones; beyond it,
//! page requests get `503`.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::Deserialize;

use crate::config::{ConfigDiagnostics, FieldPath};

/// Development server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    pub port: u16,

    pub workers: usize,

    /// Seconds, `0` is rejected.
    pub wait_timeout: u64,

    pub max_pending: usize,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 5277,
            workers: 8,
            wait_timeout: 60,
            max_pending: 64,
        }
    }
}

impl ServeConfig {
    pub const FIELD_WORKERS: FieldPath = FieldPath::new("serve.workers");
    pub const FIELD_WAIT_TIMEOUT: FieldPath = FieldPath::new("serve.wait_timeout");
    pub const FIELD_MAX_PENDING: FieldPath = FieldPath::new("serve.max_pending");

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.workers == 0 {
            diag.error(Self::FIELD_WORKERS, "must be at least 1");
        }
        if self.wait_timeout == 0 {
            diag.error(Self::FIELD_WAIT_TIMEOUT, "must be at least 1 second");
        }
        if self.max_pending == 0 {
            diag.error(Self::FIELD_MAX_PENDING, "must be at least 1");
        }
    }
}
