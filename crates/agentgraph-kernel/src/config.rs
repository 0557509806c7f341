//! Multi-format configuration loading: YAML, TOML, JSON, INI, RON, JSON5.
//!
//! Auto-detects format from file extension, substitutes `${VAR}`/`$VAR`
//! environment variables before parsing, and can merge several sources with
//! later sources overriding earlier ones.

use config::{Config as Cfg, Environment, File, FileFormat};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parsing error: {0}")]
    Parse(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("deserialization error: {0}")]
    Serialization(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Detect configuration format from a file's extension.
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("no file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Replace `${VAR}` and `$VAR` references with the process environment's values.
/// References to variables that aren't set are left untouched.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mut result = braced
        .replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string();

    let simple = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").unwrap();
    result = simple
        .replace_all(&result, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string();

    result
}

/// Load and deserialize a single configuration file, substituting environment
/// variables first.
pub fn load_config<T: DeserializeOwned>(path: &str) -> ConfigResult<T> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    from_str(&content, format)
}

/// Parse a configuration string with an explicit format.
pub fn from_str<T: DeserializeOwned>(content: &str, format: FileFormat) -> ConfigResult<T> {
    let substituted = substitute_env_vars(content);
    let built = Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;
    built
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Merge configuration files, later paths overriding earlier ones.
pub fn load_merged<T: DeserializeOwned>(paths: &[&str]) -> ConfigResult<T> {
    let mut builder = Cfg::builder();
    for path in paths {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&content);
        builder = builder.add_source(File::from_str(&substituted, format));
    }
    let built = builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;
    built
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load a file, then layer environment-variable overrides on top (prefixed,
/// `__`-nested — e.g. field `worker_pool_size` under prefix `AGENTGRAPH`
/// overrides via `AGENTGRAPH_WORKER_POOL_SIZE`).
pub fn load_with_env<T: DeserializeOwned>(path: &str, env_prefix: &str) -> ConfigResult<T> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    let built = Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .add_source(Environment::with_prefix(env_prefix).separator("__"))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;
    built
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_from_extension() {
        assert_eq!(detect_format("x.yaml").unwrap(), FileFormat::Yaml);
        assert_eq!(detect_format("x.yml").unwrap(), FileFormat::Yaml);
        assert_eq!(detect_format("x.toml").unwrap(), FileFormat::Toml);
        assert_eq!(detect_format("x.json").unwrap(), FileFormat::Json);
        assert!(detect_format("x.txt").is_err());
    }

    #[test]
    fn substitutes_braced_and_bare_env_vars() {
        std::env::set_var("AGENTGRAPH_TEST_VAR", "value-1");
        let out = substitute_env_vars("a: ${AGENTGRAPH_TEST_VAR}, b: $AGENTGRAPH_TEST_VAR");
        assert_eq!(out, "a: value-1, b: value-1");
        std::env::remove_var("AGENTGRAPH_TEST_VAR");
    }

    #[test]
    fn leaves_unset_vars_untouched() {
        let out = substitute_env_vars("x: ${AGENTGRAPH_DEFINITELY_UNSET_VAR}");
        assert_eq!(out, "x: ${AGENTGRAPH_DEFINITELY_UNSET_VAR}");
    }

    #[test]
    fn from_str_parses_toml_and_yaml() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Cfg2 {
            worker_pool_size: usize,
        }

        let toml_cfg: Cfg2 = from_str("worker_pool_size = 4", FileFormat::Toml).unwrap();
        assert_eq!(toml_cfg.worker_pool_size, 4);

        let yaml_cfg: Cfg2 = from_str("worker_pool_size: 8", FileFormat::Yaml).unwrap();
        assert_eq!(yaml_cfg.worker_pool_size, 8);
    }

    #[test]
    fn load_merged_overrides_earlier_with_later() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.toml");
        let over = dir.path().join("override.toml");
        std::fs::write(&base, "worker_pool_size = 4\nembedding_dim = 768").unwrap();
        std::fs::write(&over, "worker_pool_size = 16").unwrap();

        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Cfg2 {
            worker_pool_size: usize,
            embedding_dim: usize,
        }

        let merged: Cfg2 = load_merged(&[base.to_str().unwrap(), over.to_str().unwrap()]).unwrap();
        assert_eq!(merged.worker_pool_size, 16);
        assert_eq!(merged.embedding_dim, 768);
    }
}
