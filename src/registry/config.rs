//! Registry configuration

use std::time::Duration;

use crate::media::cache::DEFAULT_MAX_GOP_BYTES;

/// Stream registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Liveness sweep cadence
    pub sweep_interval: Duration,

    /// Maximum bytes held by each stream's GOP bootstrap buffer
    pub max_gop_bytes: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
            max_gop_bytes: DEFAULT_MAX_GOP_BYTES,
        }
    }
}

impl RegistryConfig {
    /// Set the sweep cadence
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the GOP bootstrap buffer cap
    pub fn max_gop_bytes(mut self, bytes: usize) -> Self {
        self.max_gop_bytes = bytes;
        self
    }
}
