//! DocChat Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Vector index configuration
    pub index: IndexConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Retrieval pipeline configuration
    pub rag: RagConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Index
        if let Ok(path) = std::env::var("DOCCHAT_INDEX_PATH") {
            config.index.path = PathBuf::from(path);
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.llm.openai_base_url = Some(url);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.llm.ollama_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }

        // Retrieval
        if let Ok(k) = std::env::var("DOCCHAT_TOP_K") {
            config.rag.top_k = k.parse().map_err(|_| ConfigError::InvalidValue {
                key: "DOCCHAT_TOP_K".to_string(),
                value: k,
            })?;
        }

        // Conversation store
        if let Ok(path) = std::env::var("DOCCHAT_HISTORY_DB") {
            config.rag.history_db = PathBuf::from(path);
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints. Runs before any I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rag.validate()?;
        self.index.validate()?;
        Ok(())
    }
}

/// Vector index configuration
///
/// The ANN accuracy/speed knobs: graph degree and the construction and
/// search beam widths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Max neighbors per node per layer (M in the HNSW paper)
    pub m: usize,

    /// Beam width during graph construction
    pub ef_construction: usize,

    /// Beam width during search
    pub ef_search: usize,

    /// On-disk location of the persisted index bundle
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            m: 50,
            ef_construction: 32,
            ef_search: 32,
            path: PathBuf::from("models/vector_store"),
        }
    }
}

impl IndexConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.m == 0 {
            return Err(ConfigError::InvalidValue {
                key: "index.m".to_string(),
                value: "0".to_string(),
            });
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(ConfigError::InvalidValue {
                key: "index.ef".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// API key for OpenAI-compatible endpoints
    pub openai_api_key: Option<String>,

    /// Base URL override (Groq, Azure, and other compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Chat model name
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            max_tokens: 1024,
            temperature: 1.0,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Retrieval pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Chunk size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,

    /// Number of chunks retrieved per query
    pub top_k: usize,

    /// Maximum total context length in the grounded prompt (characters)
    pub max_context_chars: usize,

    /// SQLite database file for conversation history
    pub history_db: PathBuf,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 32,
            top_k: 25,
            max_context_chars: 16_000,
            history_db: PathBuf::from("models/chat_store/conversation_history.db"),
        }
    }
}

impl RagConfig {
    /// Validate chunking and retrieval parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rag.chunk_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidValue {
                key: "rag.chunk_overlap".to_string(),
                value: format!(
                    "{} (must be less than chunk_size {})",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }
        if self.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rag.top_k".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

impl From<ConfigError> for crate::DocChatError {
    fn from(e: ConfigError) -> Self {
        crate::DocChatError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rag.top_k, 25);
        assert_eq!(config.index.m, 50);
    }

    #[test]
    fn test_overlap_must_be_less_than_chunk_size() {
        let mut config = AppConfig::default();
        config.rag.chunk_overlap = config.rag.chunk_size;
        assert!(config.validate().is_err());

        config.rag.chunk_overlap = config.rag.chunk_size + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_top_k_must_be_positive() {
        let mut config = AppConfig::default();
        config.rag.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "ollama".parse::<LlmProvider>().unwrap(),
            LlmProvider::Ollama
        );
        assert!("groq-native".parse::<LlmProvider>().is_err());
    }
}
