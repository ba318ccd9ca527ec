//! DocChat RAG - conversation-aware retrieval orchestrator
//!
//! [`ChatEngine`] runs one user turn end to end: rewrite the question
//! against the session history, retrieve grounding chunks from the vector
//! index, generate a grounded answer, then persist the exchange. The
//! collaborators (embedder, LLM, history store) are opaque trait objects
//! wired in by the caller.

use std::sync::Arc;
use uuid::Uuid;

pub mod history;
pub mod llm;
pub mod prompts;

pub use history::{MemoryConversationStore, SqliteConversationStore};
pub use llm::{create_chat_client, OllamaChat, OpenAiChat};

use docchat_core::{
    ChatClient, ChatRole, ConversationStore, GenerationParams, RagConfig, Result,
};
use docchat_vector::{EmbeddingClient, VectorIndex};

/// Result of one chat turn
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Generated answer
    pub response: String,
    /// Session the exchange was recorded under; freshly minted when the
    /// caller did not provide one
    pub session_id: String,
}

/// The per-turn orchestrator
pub struct ChatEngine {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn ChatClient>,
    store: Arc<dyn ConversationStore>,
    config: RagConfig,
    params: GenerationParams,
}

impl ChatEngine {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn ChatClient>,
        store: Arc<dyn ConversationStore>,
        config: RagConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            store,
            config,
            params: GenerationParams::default(),
        }
    }

    /// Override the sampling parameters passed to the LLM
    pub fn with_generation_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Answer one user turn.
    ///
    /// With no `session_id` a new session is started. The rewrite round-trip
    /// is skipped entirely when the session has no history yet; otherwise the
    /// LLM decides whether the question needs reformulating. The exchange is
    /// persisted (rewritten question, then answer) only after generation
    /// succeeds, so a failed turn leaves the history untouched.
    pub async fn answer(&self, query: &str, session_id: Option<&str>) -> Result<ChatOutcome> {
        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        tracing::info!(session = %session_id, "chat turn started");

        let history = self.store.read(&session_id).await?;

        // 1. Rewrite against history
        let standalone = self.rewrite(query, &history).await?;
        tracing::debug!(query = %standalone, "standalone query ready");

        // 2. Retrieve
        let embedding = self.embedder.embed(&standalone).await?;
        let retrieved = self
            .index
            .search(&embedding, self.config.top_k, None)
            .await?;
        tracing::debug!(retrieved = retrieved.len(), "chunks retrieved");

        // 3. Generate
        let messages =
            prompts::grounded_messages(&standalone, &retrieved, self.config.max_context_chars);
        let response = self.llm.complete(&messages, &self.params).await?;
        tracing::info!(chars = response.len(), "answer generated");

        // 4. Persist the exchange
        self.store
            .append(&session_id, ChatRole::User, &standalone)
            .await?;
        self.store
            .append(&session_id, ChatRole::Assistant, &response)
            .await?;

        Ok(ChatOutcome {
            response,
            session_id,
        })
    }

    /// Turn the raw query into a standalone question. A session with no
    /// history passes through without an LLM round-trip; a blank rewrite
    /// falls back to the original query.
    async fn rewrite(
        &self,
        query: &str,
        history: &[docchat_core::ChatMessage],
    ) -> Result<String> {
        if history.is_empty() {
            return Ok(query.to_string());
        }

        let messages = prompts::rewrite_messages(query, history);
        let rewritten = self.llm.complete(&messages, &self.params).await?;
        let rewritten = rewritten.trim();

        if rewritten.is_empty() {
            Ok(query.to_string())
        } else {
            Ok(rewritten.to_string())
        }
    }
}
