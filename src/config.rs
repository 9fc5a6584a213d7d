//! TOML configuration.
//!
//! Loaded once per command by [`load_config`]; every section except `[db]`
//! is optional and falls back to its defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Allowed range for `index.batch_size`.
pub const INDEX_BATCH_RANGE: std::ops::RangeInclusive<usize> = 1..=512;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_meta_suffix")]
    pub meta_suffix: String,
    /// Profile archive suffixes in order of preference.
    #[serde(default = "default_profile_suffixes")]
    pub profile_suffixes: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            meta_suffix: default_meta_suffix(),
            profile_suffixes: default_profile_suffixes(),
        }
    }
}

fn default_meta_suffix() -> String {
    "_meta.nc".to_string()
}
fn default_profile_suffixes() -> Vec<String> {
    vec!["_Sprof.nc".to_string(), "_prof.nc".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_size: default_index_batch_size(),
        }
    }
}

fn default_index_batch_size() -> usize {
    128
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ollama base URL.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeocodingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_geocoding_url")]
    pub url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Minimum delay between two reverse-geocoding requests.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_geocoding_url(),
            user_agent: default_user_agent(),
            min_interval_ms: default_min_interval_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_geocoding_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}
fn default_user_agent() -> String {
    "argo-harness".to_string()
}
fn default_min_interval_ms() -> u64 {
    1000
}

impl Config {
    /// Config with only a database path; everything else defaulted.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            ingest: IngestConfig::default(),
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            geocoding: GeocodingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.ingest.profile_suffixes.is_empty() {
        anyhow::bail!("ingest.profile_suffixes must list at least one suffix");
    }

    validate_index_batch_size(config.index.batch_size)?;

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    Ok(())
}

/// Also used for the `--batch-size` CLI override.
pub fn validate_index_batch_size(size: usize) -> Result<()> {
    if !INDEX_BATCH_RANGE.contains(&size) {
        anyhow::bail!(
            "index.batch_size must be in {}..={} (got {})",
            INDEX_BATCH_RANGE.start(),
            INDEX_BATCH_RANGE.end(),
            size
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse("[db]\npath = \"./data/argo.sqlite\"\n").unwrap();
        assert_eq!(cfg.index.batch_size, 128);
        assert_eq!(cfg.ingest.meta_suffix, "_meta.nc");
        assert_eq!(cfg.ingest.profile_suffixes, vec!["_Sprof.nc", "_prof.nc"]);
        assert!(!cfg.embedding.is_enabled());
        assert!(!cfg.geocoding.enabled);
    }

    #[test]
    fn batch_size_out_of_range_is_rejected() {
        let err = parse("[db]\npath = \"a\"\n[index]\nbatch_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("index.batch_size"));
        assert!(parse("[db]\npath = \"a\"\n[index]\nbatch_size = 513\n").is_err());
        assert!(parse("[db]\npath = \"a\"\n[index]\nbatch_size = 512\n").is_ok());
    }

    #[test]
    fn enabled_embedding_needs_model_and_dims() {
        let err = parse("[db]\npath = \"a\"\n[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
        let ok = parse(
            "[db]\npath = \"a\"\n[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = parse("[db]\npath = \"a\"\n[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
        let err = parse(
            "[db]\npath = \"a\"\n[embedding]\nprovider = \"magic\"\nmodel = \"m\"\ndims = 8\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("'magic'"));
    }

    #[test]
    fn empty_profile_suffixes_rejected() {
        assert!(parse("[db]\npath = \"a\"\n[ingest]\nprofile_suffixes = []\n").is_err());
    }
}
