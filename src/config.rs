//! `Config` (§10.3): the exchange driver's tunables, built the way the
//! reference engine's own `server::Config` is (`server/config.rs`,
//! `server/mod.rs`): private fields, a `new()` with sane defaults,
//! chainable setters returning `&mut Self`, and a `done()` that hands back
//! an `Arc<Config>` for cheap sharing across exchanges on the same
//! listener.

use std::sync::Arc;
use std::time::Duration;

use crate::version::Version;

#[derive(Debug, Clone)]
pub struct Config {
    max_request_head_size: u64,
    max_request_trailers_size: u64,
    max_request_body_buffer_size: u64,
    max_request_body_conversion_size: u64,
    timeout_idle_connection: Duration,
    timeout_response: Duration,
    min_http_version: Version,
    inflight_request_limit: usize,
    inflight_request_prealloc: usize,
}

impl Config {
    /// Create a config with defaults matching the reference engine's own
    /// conservative defaults for the knobs it shares (`inflight_*`); the
    /// byte caps and timeouts are this crate's own sane starting points.
    pub fn new() -> Config {
        Config {
            max_request_head_size: 16 * 1024,
            max_request_trailers_size: 16 * 1024,
            max_request_body_buffer_size: 10 * 1024 * 1024,
            max_request_body_conversion_size: 10 * 1024 * 1024,
            timeout_idle_connection: Duration::from_secs(30),
            timeout_response: Duration::from_secs(60),
            min_http_version: Version::Http10,
            inflight_request_limit: 2,
            inflight_request_prealloc: 0,
        }
    }

    pub fn max_request_head_size(&mut self, value: u64) -> &mut Self {
        self.max_request_head_size = value;
        self
    }

    pub fn max_request_trailers_size(&mut self, value: u64) -> &mut Self {
        self.max_request_trailers_size = value;
        self
    }

    pub fn max_request_body_buffer_size(&mut self, value: u64) -> &mut Self {
        self.max_request_body_buffer_size = value;
        self
    }

    pub fn max_request_body_conversion_size(&mut self, value: u64) -> &mut Self {
        self.max_request_body_conversion_size = value;
        self
    }

    pub fn timeout_idle_connection(&mut self, value: Duration) -> &mut Self {
        self.timeout_idle_connection = value;
        self
    }

    pub fn timeout_response(&mut self, value: Duration) -> &mut Self {
        self.timeout_response = value;
        self
    }

    pub fn min_http_version(&mut self, value: Version) -> &mut Self {
        self.min_http_version = value;
        self
    }

    /// A number of inflight requests until the driver stops reading more
    /// requests off the same connection.
    pub fn inflight_request_limit(&mut self, value: usize) -> &mut Self {
        self.inflight_request_limit = value;
        self
    }

    /// Size of the queue preallocated for holding requests; should be
    /// smaller than `inflight_request_limit`.
    pub fn inflight_request_prealloc(&mut self, value: usize) -> &mut Self {
        self.inflight_request_prealloc = value;
        self
    }

    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }

    pub(crate) fn head_cap(&self) -> u64 {
        self.max_request_head_size
    }

    pub(crate) fn trailers_cap(&self) -> u64 {
        self.max_request_trailers_size
    }

    pub(crate) fn body_buffer_cap(&self) -> u64 {
        self.max_request_body_buffer_size
    }

    pub(crate) fn body_conversion_cap(&self) -> u64 {
        self.max_request_body_conversion_size
    }

    pub(crate) fn idle_timeout(&self) -> Duration {
        self.timeout_idle_connection
    }

    pub(crate) fn response_timeout(&self) -> Duration {
        self.timeout_response
    }

    pub(crate) fn floor_version(&self) -> Version {
        self.min_http_version
    }

    pub(crate) fn inflight_limit(&self) -> usize {
        self.inflight_request_limit
    }

    pub(crate) fn inflight_prealloc(&self) -> usize {
        self.inflight_request_prealloc
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}
