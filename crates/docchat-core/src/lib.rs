//! DocChat Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout DocChat:
//! - Document and chunk models with per-chunk metadata
//! - Chat message types with a closed role enumeration
//! - Common error types
//! - Traits for the opaque collaborators (LLM, conversation store)
//! - Configuration management

pub mod config;

pub use config::{AppConfig, ConfigError, IndexConfig, LlmConfig, LlmProvider, RagConfig};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for DocChat operations
#[derive(Error, Debug)]
pub enum DocChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    #[error("{collaborator} error: {message}")]
    Collaborator {
        /// Which external collaborator failed (embedding, llm, store)
        collaborator: String,
        message: String,
    },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index error: {0}")]
    Index(String),

    #[error("Conversation store error: {0}")]
    Store(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DocChatError {
    /// Shorthand for a collaborator failure
    pub fn collaborator(which: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator: which.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DocChatError>;

// ============================================================================
// Document Models
// ============================================================================

/// A source document: raw text plus string metadata.
///
/// Immutable once created. Metadata minimally carries a `source` key
/// identifying where the text came from (e.g. the originating file name).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Raw text content
    pub text: String,

    /// Arbitrary string metadata
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document with a `source` metadata entry
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), source.into());
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `source` metadata entry, if present
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(|s| s.as_str())
    }
}

/// A bounded-length piece of a [`Document`], inheriting its metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Text content of the chunk
    pub text: String,

    /// Metadata inherited from the parent document plus chunk-specific keys
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Create a chunk with the given metadata
    pub fn new(text: impl Into<String>, metadata: HashMap<String, String>) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// The `source` metadata entry, if present
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(|s| s.as_str())
    }
}

/// A retrieved [`Chunk`] paired with its relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The retrieved chunk
    pub chunk: Chunk,

    /// Cosine similarity against the query embedding; higher is better
    pub score: f32,
}

// ============================================================================
// Chat Types
// ============================================================================

/// Role of a chat message. A closed enumeration, never a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = DocChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(DocChatError::Store(format!("unknown chat role: {other}"))),
        }
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters passed through to the generation collaborator
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum tokens in the completion
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 1.0,
        }
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Trait for chat-completion LLM clients.
///
/// Treated as possibly slow and possibly failing; implementations surface
/// every failure as [`DocChatError::Collaborator`] and never retry.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Generate a completion for an ordered message sequence
    async fn complete(&self, messages: &[ChatMessage], params: &GenerationParams)
        -> Result<String>;
}

/// Trait for the per-session conversation log.
///
/// Append-only; messages are never mutated or deleted. `read` returns
/// messages oldest-first, matching the order of `append` calls for the
/// session.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a message to a session's history
    async fn append(&self, session_id: &str, role: ChatRole, text: &str) -> Result<()>;

    /// Read a session's history, oldest-first
    async fn read(&self, session_id: &str) -> Result<Vec<ChatMessage>>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_metadata() {
        let doc = Document::new("The sky is blue.", "sky.md").with_metadata("lang", "en");

        assert_eq!(doc.source(), Some("sky.md"));
        assert_eq!(doc.metadata.get("lang").map(|s| s.as_str()), Some("en"));
    }

    #[test]
    fn test_chunk_inherits_metadata() {
        let doc = Document::new("some text", "notes.md");
        let chunk = Chunk::new("some text", doc.metadata.clone());

        assert_eq!(chunk.source(), Some("notes.md"));
    }

    #[test]
    fn test_chat_role_round_trip() {
        for role in [ChatRole::System, ChatRole::User, ChatRole::Assistant] {
            let parsed: ChatRole = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("moderator".parse::<ChatRole>().is_err());
    }

    #[test]
    fn test_generation_params_defaults() {
        let params = GenerationParams::default();
        assert_eq!(params.max_tokens, 1024);
        assert_eq!(params.temperature, 1.0);
    }

    #[test]
    fn test_collaborator_error_message() {
        let err = DocChatError::collaborator("embedding", "connection refused");
        assert_eq!(err.to_string(), "embedding error: connection refused");
    }
}
