use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    /// Trimmed input shorter than this is rejected as empty.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
            min_chars: default_min_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}
fn default_min_chars() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidates scoring below this similarity are dropped.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// When reranking, retrieve `ceil(top_k * multiplier)` candidates to
    /// give the reranker a meaningful pool.
    #[serde(default = "default_rerank_multiplier")]
    pub rerank_initial_multiplier: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            rerank_initial_multiplier: default_rerank_multiplier(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_similarity_threshold() -> f64 {
    0.3
}
fn default_rerank_multiplier() -> f64 {
    2.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Maximum extracted-text size in bytes.
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: default_max_content_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_max_content_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_allowed_extensions() -> Vec<String> {
    vec![
        ".pdf".to_string(),
        ".docx".to_string(),
        ".txt".to_string(),
        ".md".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
    /// Fixed vector dimensionality; a mismatch between stored and query
    /// vectors is a fatal error.
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: String::new(),
            dims: default_dims(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_dims() -> usize {
    1024
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_chat_timeout(),
        }
    }
}

fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    30000
}
fn default_chat_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    #[serde(default = "default_rerank_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_rerank_top_k")]
    pub top_k: usize,
    #[serde(default = "default_rerank_timeout")]
    pub timeout_secs: u64,
    /// Attempts per request shape before moving to the next one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed backoff between attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Fused score = `weight_rerank * rerank + weight_original * similarity`.
    /// The weights should sum to 1.0 to keep fused scores similarity-like.
    #[serde(default = "default_weight_rerank")]
    pub weight_rerank: f64,
    #[serde(default = "default_weight_original")]
    pub weight_original: f64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: default_rerank_enabled(),
            api_base: String::new(),
            model: String::new(),
            top_k: default_rerank_top_k(),
            timeout_secs: default_rerank_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            weight_rerank: default_weight_rerank(),
            weight_original: default_weight_original(),
        }
    }
}

fn default_rerank_enabled() -> bool {
    true
}
fn default_rerank_top_k() -> usize {
    10
}
fn default_rerank_timeout() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_weight_rerank() -> f64 {
    0.7
}
fn default_weight_original() -> f64 {
    0.3
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Check cross-field invariants that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
    }
    if config.retrieval.rerank_initial_multiplier < 1.0 {
        anyhow::bail!("retrieval.rerank_initial_multiplier must be >= 1.0");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.rerank.weight_rerank < 0.0 || config.rerank.weight_original < 0.0 {
        anyhow::bail!("rerank fusion weights must be >= 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chunking.max_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.similarity_threshold - 0.3).abs() < 1e-9);
        assert!((config.rerank.weight_rerank + config.rerank.weight_original - 1.0).abs() < 1e-9);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[chunking]
max_chars = 500
overlap_chars = 50

[rerank]
enabled = false
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chunking.max_chars, 500);
        assert_eq!(config.chunking.overlap_chars, 50);
        assert!(!config.rerank.enabled);
        // Untouched sections keep their defaults.
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.rerank.max_retries, 2);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_max() {
        let mut config = Config::default();
        config.chunking.overlap_chars = config.chunking.max_chars;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_threshold_range_enforced() {
        let mut config = Config::default();
        config.retrieval.similarity_threshold = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_multiplier_below_one_rejected() {
        let mut config = Config::default();
        config.retrieval.rerank_initial_multiplier = 0.5;
        assert!(validate(&config).is_err());
    }
}
