use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub keyword: KeywordConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dims: usize,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Documents shorter than this are indexed whole, never split.
    #[serde(default = "default_whole_doc_threshold")]
    pub whole_doc_threshold: usize,
    /// Minimum usable chunk length in characters.
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    /// Ceiling for greedy paragraph/line buffering.
    #[serde(default = "default_max_chunk")]
    pub max_chunk: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            whole_doc_threshold: default_whole_doc_threshold(),
            min_length: default_min_length(),
            max_chunk: default_max_chunk(),
        }
    }
}

fn default_whole_doc_threshold() -> usize {
    150
}
fn default_min_length() -> usize {
    50
}
fn default_max_chunk() -> usize {
    400
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Cosine-distance similarity floor. Child matches farther than this
    /// are discarded as irrelevant.
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,
    /// Score assigned to parents discovered only by keyword search.
    #[serde(default = "default_keyword_score")]
    pub keyword_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_distance: default_max_distance(),
            keyword_score: default_keyword_score(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_distance() -> f32 {
    0.95
}
fn default_keyword_score() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeywordConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_calls")]
    pub max_calls: usize,
    #[serde(default = "default_window_secs")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            window_seconds: default_window_secs(),
        }
    }
}

fn default_max_calls() -> usize {
    5
}
fn default_window_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_seconds: u64,
    /// Delay before the first cycle, to let the host connection establish.
    #[serde(default = "default_startup_delay")]
    pub startup_delay_seconds: u64,
    /// Documents with less content than this are discarded as noise.
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
    /// Number of child chunks embedded per capability call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_secs(),
            startup_delay_seconds: default_startup_delay(),
            min_content_length: default_min_content_length(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_interval_secs() -> u64 {
    3600
}
fn default_startup_delay() -> u64 {
    5
}
fn default_min_content_length() -> usize {
    10
}
fn default_batch_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    pub filesystem: Option<FilesystemConnectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConnectorConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.embedding.model.is_empty() {
        anyhow::bail!("embedding.model must not be empty");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.chunking.min_length == 0 || config.chunking.max_chunk == 0 {
        anyhow::bail!("chunking.min_length and chunking.max_chunk must be > 0");
    }
    if config.chunking.min_length >= config.chunking.max_chunk {
        anyhow::bail!("chunking.min_length must be smaller than chunking.max_chunk");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_distance <= 0.0 {
        anyhow::bail!("retrieval.max_distance must be > 0.0");
    }

    if config.rate_limit.max_calls == 0 {
        anyhow::bail!("rate_limit.max_calls must be >= 1");
    }

    if config.ingestion.batch_size == 0 {
        anyhow::bail!("ingestion.batch_size must be >= 1");
    }

    Ok(config)
}
