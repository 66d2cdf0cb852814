//! Ambient configuration: a host knob layer over the scheduler's synthetic
//! cost model and the cache's bounds, loaded via the `config` crate layered
//! over an optional TOML file, falling back to `Default` when absent.

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerCostModel {
    pub base_cpu_us: u64,
    pub cpu_jitter_us: u64,
    pub base_gpu_us: u64,
    pub gpu_jitter_us: u64,
    pub base_memory_bytes: u64,
    pub memory_jitter_bytes: u64,
}

impl Default for SchedulerCostModel {
    fn default() -> Self {
        SchedulerCostModel {
            base_cpu_us: 100,
            cpu_jitter_us: 50,
            base_gpu_us: 500,
            gpu_jitter_us: 200,
            base_memory_bytes: 10240,
            memory_jitter_bytes: 5120,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RenderGraphConfig {
    pub cache_max_entries: usize,
    pub cache_max_bytes: u64,
    pub parallel_enabled: bool,
    /// Batches narrower than this always execute serially, even when
    /// `parallel_enabled` is set and a thread pool is present.
    pub parallel_min_batch_width: usize,
    pub cost_model: SchedulerCostModel,
}

impl Default for RenderGraphConfig {
    fn default() -> Self {
        RenderGraphConfig {
            cache_max_entries: 64,
            cache_max_bytes: 256 * 1024 * 1024,
            parallel_enabled: true,
            parallel_min_batch_width: 2,
            cost_model: SchedulerCostModel::default(),
        }
    }
}

impl RenderGraphConfig {
    /// Loads from `path` (TOML) layered over built-in defaults. Any error
    /// reading or parsing the file falls back to `Default::default()` —
    /// ambient configuration is never load-bearing for correctness.
    pub fn load_or_default(path: &str) -> RenderGraphConfig {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false));
        let builder = match builder.set_default("cache_max_entries", 64i64) {
            Ok(b) => b,
            Err(_) => return RenderGraphConfig::default(),
        };
        match builder.build() {
            Ok(cfg) => cfg.try_deserialize().unwrap_or_default(),
            Err(_) => RenderGraphConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bounds() {
        let cfg = RenderGraphConfig::default();
        assert!(cfg.cache_max_entries > 0);
        assert!(cfg.cache_max_bytes > 0);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let cfg = RenderGraphConfig::load_or_default("/nonexistent/path/does-not-exist");
        assert_eq!(cfg.cache_max_entries, RenderGraphConfig::default().cache_max_entries);
    }
}
