use std::time::Duration;

use serde::Deserialize;

/// Runtime knobs for the three loops, the worker pool and the destruction
/// grace margin. Loadable from TOML; unspecified fields keep their
/// defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// fixed simulation step in nanoseconds (default 60 Hz)
    pub fixed_delta_ns: u64,
    /// cap applied to the measured fixed delta after a stall
    pub fixed_delta_cap_ns: u64,
    /// floor for the presentation frame time
    pub min_vary_delta_ns: u64,
    /// reclamation polling interval in nanoseconds
    pub reclaim_interval_ns: u64,
    /// completed ticks every loop must advance past a destruction mark
    /// before the object may be torn down
    pub grace_ticks: u64,
    /// worker pool size, 0 picks physical cores - 1
    pub worker_threads: usize,
    /// chunk size for parallel store iteration
    pub parallel_chunk_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fixed_delta_ns: 16_666_667,
            fixed_delta_cap_ns: 250_000_000,
            min_vary_delta_ns: 1_000_000,
            reclaim_interval_ns: 50_000_000,
            grace_ticks: 2,
            worker_threads: 0,
            parallel_chunk_size: 64,
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn fixed_delta(&self) -> Duration {
        Duration::from_nanos(self.fixed_delta_ns)
    }

    pub fn fixed_delta_cap(&self) -> Duration {
        Duration::from_nanos(self.fixed_delta_cap_ns)
    }

    pub fn min_vary_delta(&self) -> Duration {
        Duration::from_nanos(self.min_vary_delta_ns)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_nanos(self.reclaim_interval_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RuntimeConfig::default();
        assert_eq!(config.grace_ticks, 2);
        assert!(config.fixed_delta() < config.fixed_delta_cap());
    }

    #[test]
    fn partial_toml_overrides_keep_the_rest() {
        let config = RuntimeConfig::from_toml_str(
            "grace_ticks = 4\nreclaim_interval_ns = 1000000\n",
        )
        .unwrap();
        assert_eq!(config.grace_ticks, 4);
        assert_eq!(config.reclaim_interval_ns, 1_000_000);
        assert_eq!(config.fixed_delta_ns, RuntimeConfig::default().fixed_delta_ns);
    }

    #[test]
    fn garbage_toml_is_an_error() {
        assert!(RuntimeConfig::from_toml_str("grace_ticks = \"many\"").is_err());
    }
}
