//! Session and backend configuration.
//!
//! This module defines everything a session is parameterized with before it connects. It provides:
//! 1. **Defaults:** Timeouts, discovery bounds, and polling intervals.
//! 2. **Session config:** `SessionConfig`, deserializable from JSON with every field optional.
//! 3. **Backend selection:** `BackendKind` and the untyped `BackendOption` name/value pairs.
//!
//! Use `SessionConfig::default()` for the stock timings, or `SessionConfig::from_json` to
//! override a subset of them.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default configuration constants for a session.
mod defaults {
    /// Bound on a single register request/response round trip (1 s).
    pub const REQUEST_TIMEOUT_MS: u64 = 1000;

    /// Bound on a discovery probe of one address (100 ms).
    ///
    /// Kept short because the scan ends on the first silent address.
    pub const PROBE_TIMEOUT_MS: u64 = 100;

    /// Upper bound of the debug-network address space walked by discovery.
    pub const MAX_MODULES: u16 = 1024;

    /// Addresses probed past the end of the scan to detect a gapped address map.
    pub const GAP_PROBE_WINDOW: u16 = 2;

    /// Sleep between backend polls when nothing is pending (200 µs).
    pub const POLL_INTERVAL_US: u64 = 200;

    /// Age after which an incomplete multi-frame message is discarded (1 s).
    pub const REASSEMBLY_TIMEOUT_MS: u64 = 1000;
}

/// Timing and discovery parameters of a session.
///
/// # Examples
///
/// ```
/// use dbgnoc_host::config::SessionConfig;
///
/// let config = SessionConfig::from_json(r#"{ "request_timeout_ms": 250 }"#).unwrap();
/// assert_eq!(config.request_timeout_ms, 250);
/// assert_eq!(config.probe_timeout_ms, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Register request timeout in milliseconds.
    #[serde(default = "SessionConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Discovery probe timeout in milliseconds.
    #[serde(default = "SessionConfig::default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Number of debug-network addresses discovery may walk.
    #[serde(default = "SessionConfig::default_max_modules")]
    pub max_modules: u16,

    /// Addresses probed after the last responding module; `0` disables the gap check.
    #[serde(default = "SessionConfig::default_gap_probe_window")]
    pub gap_probe_window: u16,

    /// Backend poll interval in microseconds.
    #[serde(default = "SessionConfig::default_poll_interval_us")]
    pub poll_interval_us: u64,

    /// Reassembly timeout for fragmented messages in milliseconds.
    #[serde(default = "SessionConfig::default_reassembly_timeout_ms")]
    pub reassembly_timeout_ms: u64,

    /// Initial log priority threshold; `None` selects errors only.
    #[serde(default)]
    pub log_priority: Option<i32>,
}

impl SessionConfig {
    /// Parses a configuration from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if the text is not valid JSON or names an unknown field.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidArgument(format!("session config: {e}")))
    }

    /// Request timeout as a `Duration`.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Probe timeout as a `Duration`.
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Poll interval as a `Duration`.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    /// Reassembly timeout as a `Duration`.
    pub const fn reassembly_timeout(&self) -> Duration {
        Duration::from_millis(self.reassembly_timeout_ms)
    }

    fn default_request_timeout_ms() -> u64 {
        defaults::REQUEST_TIMEOUT_MS
    }

    fn default_probe_timeout_ms() -> u64 {
        defaults::PROBE_TIMEOUT_MS
    }

    fn default_max_modules() -> u16 {
        defaults::MAX_MODULES
    }

    fn default_gap_probe_window() -> u16 {
        defaults::GAP_PROBE_WINDOW
    }

    fn default_poll_interval_us() -> u64 {
        defaults::POLL_INTERVAL_US
    }

    fn default_reassembly_timeout_ms() -> u64 {
        defaults::REASSEMBLY_TIMEOUT_MS
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: defaults::REQUEST_TIMEOUT_MS,
            probe_timeout_ms: defaults::PROBE_TIMEOUT_MS,
            max_modules: defaults::MAX_MODULES,
            gap_probe_window: defaults::GAP_PROBE_WINDOW,
            poll_interval_us: defaults::POLL_INTERVAL_US,
            reassembly_timeout_ms: defaults::REASSEMBLY_TIMEOUT_MS,
            log_priority: None,
        }
    }
}

/// Transport used to reach the debug network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Physical (or emulated) debug-network interface exposed as a character device.
    DbgNoc,
    /// Software simulator reachable over TCP.
    SimTcp,
}

impl BackendKind {
    /// Short lowercase name, as accepted by `FromStr`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DbgNoc => "dbgnoc",
            Self::SimTcp => "simtcp",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dbgnoc" => Ok(Self::DbgNoc),
            "simtcp" => Ok(Self::SimTcp),
            other => Err(Error::InvalidArgument(format!(
                "unknown backend '{other}' (expected 'dbgnoc' or 'simtcp')"
            ))),
        }
    }
}

/// One backend configuration entry; interpretation is backend-specific.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendOption {
    /// Option name, e.g. `host`.
    pub name: String,
    /// Option value, e.g. `localhost`.
    pub value: String,
}

impl BackendOption {
    /// Creates an option from a name and a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}
