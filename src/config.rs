use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub complexity: ComplexityConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "llama3.2:1b".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Embedding backend: `hash` (deterministic, offline) or `ollama`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_embedding_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            timeout_secs: default_embedding_timeout_secs(),
            max_retries: default_embedding_max_retries(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_embedding_model() -> String {
    "all-minilm".to_string()
}
fn default_embedding_dims() -> usize {
    384
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_embedding_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// Intent strategy: `lexical` (keyword scoring) or `llm` (delegated).
    #[serde(default = "default_classifier_strategy")]
    pub strategy: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: default_classifier_strategy(),
        }
    }
}

fn default_classifier_strategy() -> String {
    "lexical".to_string()
}

/// Keyword-hit thresholds for the complexity tiers.
///
/// These are tuning knobs, not correctness requirements — the defaults
/// mirror observed behavior but are safe to adjust.
#[derive(Debug, Deserialize, Clone)]
pub struct ComplexityConfig {
    /// High-signal hits at or above this count → HIGH.
    #[serde(default = "default_high_threshold")]
    pub high_threshold: usize,
    /// Medium-signal hits at or above this count → MEDIUM.
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: usize,
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
        }
    }
}

fn default_high_threshold() -> usize {
    2
}
fn default_medium_threshold() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds. Default: 24 hours.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of documents returned by similarity search.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7410".to_string()
}

impl Config {
    /// A default config rooted at the given database path. Used by tests
    /// and tools that don't read a config file.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            classifier: ClassifierConfig::default(),
            complexity: ComplexityConfig::default(),
            cache: CacheConfig::default(),
            retrieval: RetrievalConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be > 0");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.complexity.high_threshold == 0 || config.complexity.medium_threshold == 0 {
        anyhow::bail!("complexity thresholds must be >= 1");
    }

    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0 — collaborator calls require a bounded timeout");
    }

    match config.classifier.strategy.as_str() {
        "lexical" | "llm" => {}
        other => anyhow::bail!(
            "Unknown classifier strategy: '{}'. Must be lexical or llm.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "hash" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash or ollama.",
            other
        ),
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config: Config = toml::from_str("[db]\npath = \"data/qa.sqlite\"\n").unwrap();
        assert_eq!(config.cache.ttl_secs, 24 * 60 * 60);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.classifier.strategy, "lexical");
        assert_eq!(config.complexity.high_threshold, 2);
        assert_eq!(config.embedding.provider, "hash");
    }

    #[test]
    fn test_invalid_strategy_rejected() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[db]\npath = \"x.sqlite\"\n[classifier]\nstrategy = \"oracle\"\n",
        )
        .unwrap();
        let err = load_config(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("classifier strategy"));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[db]\npath = \"x.sqlite\"\n[cache]\nttl_secs = 0\n").unwrap();
        assert!(load_config(tmp.path()).is_err());
    }
}
