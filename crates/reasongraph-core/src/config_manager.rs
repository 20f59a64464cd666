use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for crate::ReasonGraphError {
    fn from(err: ConfigError) -> Self {
        crate::ReasonGraphError::Configuration(err.to_string())
    }
}

/// Similarity score at or above which a pair is sent to the semantic judge.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;
/// Number of nearest neighbours retrieved per node.
pub const DEFAULT_MAX_CANDIDATES: usize = 20;
/// Node weight when node similarity beats children similarity.
pub const DEFAULT_DOMINANT_NODE_WEIGHT: f32 = 0.7;
/// Node weight otherwise.
pub const DEFAULT_NODE_WEIGHT: f32 = 0.6;

/// Main configuration for ReasonGraph
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReasonGraphConfig {
    /// Equivalence detection tunables
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// LLM configuration for the semantic judge
    #[serde(default)]
    pub llm: LLMConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Thresholds and weights used by the node analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    #[serde(default = "default_dominant_node_weight")]
    pub dominant_node_weight: f32,

    #[serde(default = "default_node_weight")]
    pub default_node_weight: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_candidates: default_max_candidates(),
            dominant_node_weight: default_dominant_node_weight(),
            default_node_weight: default_node_weight(),
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "openai" or "hashing"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Model identifier (e.g., "text-embedding-3-small")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// OpenAI API key (if using OpenAI)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_api_base")]
    pub api_base: String,

    /// Vector dimension (1536 for text-embedding-3-small)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Texts per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key: None,
            api_base: default_openai_api_base(),
            dimension: default_embedding_dimension(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

/// LLM configuration for equivalence adjudication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// LLM provider: "openai"
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_api_base")]
    pub api_base: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// The judge answers a single word
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: None,
            api_base: default_openai_api_base(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_similarity_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}
fn default_max_candidates() -> usize {
    DEFAULT_MAX_CANDIDATES
}
fn default_dominant_node_weight() -> f32 {
    DEFAULT_DOMINANT_NODE_WEIGHT
}
fn default_node_weight() -> f32 {
    DEFAULT_NODE_WEIGHT
}
fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_dimension() -> usize {
    1536
}
fn default_batch_size() -> usize {
    100
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-4".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> usize {
    10
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with file discovery and environment overrides
pub struct ConfigManager {
    config: ReasonGraphConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.reasongraph.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load an explicit config file, still honouring environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_dotenv();

        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    fn finish(
        config: ReasonGraphConfig,
        config_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        info!("Configuration loaded");
        match config_path {
            Some(ref path) => info!("   Config file: {}", path.display()),
            None => info!("   Config file: NONE (using defaults)"),
        }
        info!(
            "   Similarity threshold: {}, max candidates: {}",
            config.analysis.similarity_threshold, config.analysis.max_candidates
        );
        info!(
            "   Embedding provider: {} ({})",
            config.embedding.provider, config.embedding.model
        );
        info!("   LLM provider: {} ({})", config.llm.provider, config.llm.model);

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".reasongraph.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .reasongraph.env: {}", e);
                } else {
                    info!("Loaded .reasongraph.env from home directory");
                }
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.reasongraph.toml (current directory)
    /// 2. ~/.reasongraph/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(ReasonGraphConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".reasongraph.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".reasongraph").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((ReasonGraphConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<ReasonGraphConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: ReasonGraphConfig) -> ReasonGraphConfig {
        if let Some(threshold) = env_parse::<f32>("REASONGRAPH_SIMILARITY_THRESHOLD") {
            config.analysis.similarity_threshold = threshold;
        }
        if let Some(max) = env_parse::<usize>("REASONGRAPH_MAX_CANDIDATES") {
            config.analysis.max_candidates = max;
        }

        if let Ok(provider) = std::env::var("REASONGRAPH_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }
        if let Ok(model) = std::env::var("REASONGRAPH_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(batch) = env_parse::<usize>("REASONGRAPH_EMBEDDING_BATCH_SIZE") {
            config.embedding.batch_size = batch;
        }

        if let Ok(provider) = std::env::var("REASONGRAPH_LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("REASONGRAPH_LLM_MODEL") {
            config.llm.model = model;
        }

        // The same key serves both services unless one was configured explicitly.
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if config.embedding.api_key.is_none() {
                config.embedding.api_key = Some(key.clone());
            }
            if config.llm.api_key.is_none() {
                config.llm.api_key = Some(key);
            }
        }

        if let Ok(level) = std::env::var("REASONGRAPH_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("REASONGRAPH_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    /// Validate configuration
    pub fn validate_config(config: &ReasonGraphConfig) -> Result<(), ConfigError> {
        let analysis = &config.analysis;
        if !(0.0..=1.0).contains(&analysis.similarity_threshold) {
            return Err(ConfigError::ValidationError(format!(
                "similarity_threshold must be within [0, 1], got {}",
                analysis.similarity_threshold
            )));
        }
        if analysis.max_candidates == 0 {
            return Err(ConfigError::ValidationError(
                "max_candidates must be at least 1".to_string(),
            ));
        }
        for (name, weight) in [
            ("dominant_node_weight", analysis.dominant_node_weight),
            ("default_node_weight", analysis.default_node_weight),
        ] {
            if !(weight > 0.0 && weight < 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be within (0, 1), got {}",
                    name, weight
                )));
            }
        }
        if config.embedding.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }
        if !matches!(
            config.logging.format.as_str(),
            "pretty" | "json" | "compact"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "Unknown log format: {}",
                config.logging.format
            )));
        }
        Ok(())
    }

    pub fn config(&self) -> &ReasonGraphConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ReasonGraphConfig {
        &mut self.config
    }

    pub fn into_config(self) -> ReasonGraphConfig {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={}: not a valid value", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = ReasonGraphConfig::default();
        assert_eq!(config.analysis.similarity_threshold, 0.85);
        assert_eq!(config.analysis.max_candidates, 20);
        assert_eq!(config.analysis.dominant_node_weight, 0.7);
        assert_eq!(config.analysis.default_node_weight, 0.6);
        assert_eq!(config.embedding.batch_size, 100);
        assert!(ConfigManager::validate_config(&config).is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: ReasonGraphConfig = toml::from_str(
            r#"
            [analysis]
            similarity_threshold = 0.9
            "#,
        )
        .unwrap();
        assert_eq!(config.analysis.similarity_threshold, 0.9);
        assert_eq!(config.analysis.max_candidates, 20);
        assert_eq!(config.llm.model, "gpt-4");
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut config = ReasonGraphConfig::default();
        config.analysis.similarity_threshold = 1.5;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = ReasonGraphConfig::default();
        config.analysis.max_candidates = 0;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = ReasonGraphConfig::default();
        config.analysis.default_node_weight = 1.0;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = ReasonGraphConfig::default();
        config.logging.format = "xml".to_string();
        assert!(ConfigManager::validate_config(&config).is_err());
    }
}
