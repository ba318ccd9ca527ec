//! Prompt construction
//!
//! Two prompts drive the pipeline: the rewrite prompt turns a
//! history-dependent question into a standalone one, and the grounded prompt
//! constrains the answer to the retrieved documentation. Both are emitted as
//! role-tagged message sequences, never flattened into a single string.

use docchat_core::{ChatMessage, ScoredChunk};

const REWRITE_SYSTEM_PROMPT: &str = "\
You are an AI assistant that reformulates user question into standalone question when necessary, to improve the effectiveness of information retrieval from a vector database.
If chat history is provided, then consider the context of the chat history for reformulating the question.

- If the user provides a greeting (e.g. \"hi\", \"hello\", \"how are you?\" etc.) then ignore the chat history and do not reformulate the user input.
- If the user's question is independent of chat history, return it as is.
- If the user's question depends on chat history, rephrase it into a standalone question.

Do not add more details than necessary to the standalone question. Only return the standalone question and no other explanation or text.";

const GROUNDED_SYSTEM_PROMPT: &str = "\
You are a helpful assistant trained to answer questions based on a provided set of documentation. When responding to any user query, you should:

1. **Use only the provided documentation**: All answers must be based on the context from the documentation that has been provided. If the documentation does not contain sufficient information to answer the question, kindly say \"Sorry, I don't have enough information to answer that.\"

2. **Be concise and clear**: Provide the answer in a concise manner. If necessary, summarize the relevant information from the documentation.

3. **Provide reference sources to the documentation**: If applicable, refer to specific sections or paragraphs of the documentation when answering. For example: \"As mentioned in Section 3.2 of the documentation...\".

4. **Stay on-topic**: Do not deviate from the context of the provided documentation. If the question is out of scope for the documentation, explain that the information is unavailable.

5. **Context-aware answers**: Maintain awareness of the conversation history. Use the previous questions and answers to understand the context better and give relevant, coherent responses. If the question is related to previous topics, try to connect your answers to those topics.

### User Instructions:
- You must respond using the information in the provided documentation.
- If a question is not clear or the documentation doesn't contain enough details, respond politely with a clarification request or let the user know that the information is unavailable.";

/// Build the query-rewrite message sequence.
///
/// The assistant turn is pre-seeded with the answer scaffold so the model
/// completes only the standalone question.
pub fn rewrite_messages(query: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut history_str = String::new();
    for message in history {
        history_str.push_str(&format!("{}:\n{}\n", message.role, message.content));
    }

    vec![
        ChatMessage::system(REWRITE_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "##Chat History:\n{history_str}\n\n##User Question:\n{query}"
        )),
        ChatMessage::assistant("##Standalone Question:\n"),
    ]
}

/// Build the grounded-answer message sequence from the retrieved chunks.
pub fn grounded_messages(
    query: &str,
    retrieved: &[ScoredChunk],
    max_context_chars: usize,
) -> Vec<ChatMessage> {
    let documentation = format_retrieved_docs(retrieved, max_context_chars);

    vec![
        ChatMessage::system(GROUNDED_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Documentation Context:\n{documentation}\n\nQuery:\n{query}"
        )),
    ]
}

/// Format retrieved chunks as source/content blocks, best first, stopping
/// before the context budget is exceeded.
pub fn format_retrieved_docs(retrieved: &[ScoredChunk], max_context_chars: usize) -> String {
    let mut out = String::new();
    let mut used_chars = 0;
    for scored in retrieved {
        let source = scored.chunk.source().unwrap_or("unknown");
        let block = format!("source: {source}\ncontent: {}\n\n", scored.chunk.text);
        let block_chars = block.chars().count();
        if !out.is_empty() && used_chars + block_chars > max_context_chars {
            break;
        }
        out.push_str(&block);
        used_chars += block_chars;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::{Chunk, ChatRole};
    use std::collections::HashMap;

    fn scored(text: &str, source: &str) -> ScoredChunk {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), source.to_string());
        ScoredChunk {
            chunk: Chunk::new(text, metadata),
            score: 0.9,
        }
    }

    #[test]
    fn test_rewrite_messages_shape() {
        let history = vec![
            ChatMessage::user("What is HNSW?"),
            ChatMessage::assistant("A graph-based ANN index."),
        ];
        let messages = rewrite_messages("how fast is it?", &history);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1].role, ChatRole::User);
        assert!(messages[1].content.contains("##Chat History:\nuser:\nWhat is HNSW?"));
        assert!(messages[1].content.contains("##User Question:\nhow fast is it?"));
        assert_eq!(messages[2].role, ChatRole::Assistant);
        assert_eq!(messages[2].content, "##Standalone Question:\n");
    }

    #[test]
    fn test_grounded_messages_include_context_blocks() {
        let docs = vec![scored("The index is persisted as JSON.", "persist.md")];
        let messages = grounded_messages("how is it stored?", &docs, 16_000);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[1]
            .content
            .contains("source: persist.md\ncontent: The index is persisted as JSON."));
        assert!(messages[1].content.contains("Query:\nhow is it stored?"));
    }

    #[test]
    fn test_context_budget_truncates_tail_not_head() {
        let docs = vec![
            scored("first block of content", "a.md"),
            scored("second block of content", "b.md"),
        ];
        let formatted = format_retrieved_docs(&docs, 50);
        assert!(formatted.contains("a.md"));
        assert!(!formatted.contains("b.md"));
    }

    #[test]
    fn test_context_budget_counts_chars_not_bytes() {
        let text: String = "日".repeat(20);
        let docs = vec![scored(&text, "a.md"), scored(&text, "b.md")];

        // Each block is 44 chars but 84 bytes; a 100-char budget fits both.
        let formatted = format_retrieved_docs(&docs, 100);
        assert!(formatted.contains("a.md"));
        assert!(formatted.contains("b.md"));
    }

    #[test]
    fn test_first_block_always_included() {
        let docs = vec![scored("a block larger than the tiny budget", "a.md")];
        let formatted = format_retrieved_docs(&docs, 5);
        assert!(formatted.contains("a.md"));
    }
}
