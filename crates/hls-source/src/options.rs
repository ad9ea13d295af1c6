use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables of a streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HlsOptions {
    /// Index of the variant played first in a master playlist.
    pub initial_variant: usize,
    /// Switch variants based on the measured download bitrate.
    pub adaptive_bitrate: bool,
    /// Lower bound of the live reload interval, in milliseconds.
    pub min_reload_interval_ms: u64,
    /// Buffer size used by callers pulling blocks from a session.
    pub block_size: usize,
    /// Keep container headers in the result cache when one is provided.
    pub cache_headers: bool,
}

impl Default for HlsOptions {
    fn default() -> Self {
        Self {
            initial_variant: 0,
            adaptive_bitrate: true,
            min_reload_interval_ms: 1000,
            block_size: 64 * 1024,
            cache_headers: true,
        }
    }
}

impl HlsOptions {
    pub fn with_initial_variant(mut self, index: usize) -> Self {
        self.initial_variant = index;
        self
    }

    pub fn with_adaptive_bitrate(mut self, enabled: bool) -> Self {
        self.adaptive_bitrate = enabled;
        self
    }

    pub fn with_min_reload_interval(mut self, interval: Duration) -> Self {
        self.min_reload_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size.max(1);
        self
    }

    pub fn with_cache_headers(mut self, enabled: bool) -> Self {
        self.cache_headers = enabled;
        self
    }

    pub fn min_reload_interval(&self) -> Duration {
        Duration::from_millis(self.min_reload_interval_ms)
    }

    /// Time to wait between two reloads of a live playlist.
    pub fn reload_interval(&self, target_duration: f64) -> Duration {
        let half_target = Duration::from_secs_f64((target_duration / 2.).max(0.));
        half_target.max(self.min_reload_interval())
    }
}
