//!
//! Session configuration
//! ----------------------
//! Explicit configuration value threaded into `Session::open`. The driver
//! reads no globals and no environment variables; everything tunable lives
//! here and is fixed for the lifetime of the session.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// TCP connect timeout applied to every request.
    pub connect_timeout: Duration,
    /// Whole-request timeout (send + server processing + body read).
    pub read_timeout: Duration,
    /// Negotiate gzip-compressed tabular/scalar payloads at login.
    /// Session-wide; never toggled per request.
    pub gzip: bool,
    /// Optional HTTP(S) proxy URL.
    pub proxy: Option<String>,
    /// Log every request path and outcome at info level instead of debug.
    pub trace_requests: bool,
    /// Default row cap for query-shaped statements; 0 means uncapped.
    pub max_rows: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
            gzip: false,
            proxy: None,
            trace_requests: false,
            max_rows: 0,
        }
    }
}

impl SessionConfig {
    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_trace_requests(mut self, on: bool) -> Self {
        self.trace_requests = on;
        self
    }
}
