//! This crate's own ambient runtime settings: worker pool sizing, engine
//! parallelism defaults, the memory service's connection pool size, and the
//! embedding dimension memory stores validate vectors against.
//!
//! Loading a *user's* application or agent config is out of scope — this is
//! only the handful of settings the engine/memory/summarization layers need
//! to boot, loaded through `agentgraph_kernel::config`'s multi-format,
//! env-substituting loader.

use serde::{Deserialize, Serialize};

/// Runtime settings for this crate's own services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Number of summarization dispatch workers (see `summarization::dispatch`).
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Default fan-out parallelism the Pregel engine uses when a superstep's
    /// active frontier doesn't otherwise bound concurrency.
    #[serde(default = "default_engine_parallelism")]
    pub engine_parallelism: usize,
    /// Connection pool size for the pgvector-backed memory store.
    #[serde(default = "default_memory_pool_size")]
    pub memory_pool_size: u32,
    /// Expected embedding vector dimension; memory stores reject vectors of
    /// any other length.
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_engine_parallelism() -> usize {
    8
}

fn default_memory_pool_size() -> u32 {
    10
}

fn default_embedding_dim() -> usize {
    1536
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            engine_parallelism: default_engine_parallelism(),
            memory_pool_size: default_memory_pool_size(),
            embedding_dim: default_embedding_dim(),
        }
    }
}

#[cfg(feature = "config")]
impl RuntimeSettings {
    /// Load settings from a single file (YAML/TOML/JSON/INI/RON/JSON5,
    /// detected from the extension), with `${VAR}`/`$VAR` substitution.
    pub fn load(path: &str) -> Result<Self, agentgraph_kernel::config::ConfigError> {
        agentgraph_kernel::config::load_config(path)
    }

    /// Load from several files, later ones overriding earlier ones — e.g.
    /// `["defaults.toml", "local.toml"]`.
    pub fn load_merged(paths: &[&str]) -> Result<Self, agentgraph_kernel::config::ConfigError> {
        agentgraph_kernel::config::load_merged(paths)
    }
}

#[cfg(all(test, feature = "config"))]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_populated_without_a_config_file() {
        let settings = RuntimeSettings::default();
        assert_eq!(settings.worker_pool_size, 4);
        assert_eq!(settings.embedding_dim, 1536);
    }

    #[test]
    fn load_reads_a_toml_file_with_partial_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.toml");
        std::fs::write(&path, "worker_pool_size = 16\nembedding_dim = 768").unwrap();

        let settings = RuntimeSettings::load(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.worker_pool_size, 16);
        assert_eq!(settings.embedding_dim, 768);
        assert_eq!(settings.engine_parallelism, default_engine_parallelism());
    }
}
