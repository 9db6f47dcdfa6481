//! RAG assistant: retrieves code context for a question, builds the chat
//! prompt, and streams the model's answer while keeping a bounded
//! conversation history.

use anyhow::Result;
use futures_util::StreamExt;
use std::sync::Arc;

use crate::llm::generate::{Generator, TokenStream};
use crate::models::{ChatMessage, FinalResult};
use crate::search::retriever::Retriever;

const SYSTEM_PROMPT: &str = "\
You are an expert senior software engineer acting as a coding assistant.
You have access to relevant source code from the user's project.

Your responsibilities:
1. Answer questions about the codebase accurately and concisely.
2. Explain how code works, including control flow and design patterns.
3. Suggest improvements, refactors, or bug fixes when asked.
4. Reference specific files when relevant.

Guidelines:
- Ground your answers in the provided code context. If the context doesn't
  contain enough information, say so honestly.
- Use code blocks with language tags when showing code.
- Be concise but thorough.
- When referencing files, use the source path shown in the context.";

/// Turns kept when building the prompt (user + assistant messages).
const MAX_HISTORY_TURNS: usize = 10;

pub struct Assistant {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    history: Vec<ChatMessage>,
}

impl Assistant {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            generator,
            history: Vec::new(),
        }
    }

    /// Ask a question about the codebase. Returns the full answer and the
    /// retrieved sources it was grounded in.
    pub async fn ask(&mut self, question: &str) -> Result<(String, Vec<FinalResult>)> {
        let (mut stream, sources) = self.stream_ask(question).await?;

        let mut answer = String::new();
        while let Some(token) = stream.next().await {
            answer.push_str(&token?);
        }

        self.record_turn(question, &answer);
        Ok((answer, sources))
    }

    /// Streaming variant: returns the token stream plus the retrieved
    /// sources up front. The caller is responsible for draining the stream
    /// and calling [`Assistant::record_turn`] with the collected answer.
    pub async fn stream_ask(
        &self,
        question: &str,
    ) -> Result<(TokenStream, Vec<FinalResult>)> {
        let results = self.retriever.retrieve(question).await?;
        let context = format_context(&results);
        let messages = self.build_messages(&context, question);

        let stream = self.generator.stream_chat(messages).await?;
        Ok((stream, results))
    }

    /// Append a completed turn to the conversation history.
    pub fn record_turn(&mut self, question: &str, answer: &str) {
        self.history.push(ChatMessage::user(question));
        self.history.push(ChatMessage::assistant(answer));
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn build_messages(&self, context: &str, question: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];

        let keep = self.history.len().min(MAX_HISTORY_TURNS);
        messages.extend(self.history[self.history.len() - keep..].iter().cloned());

        messages.push(ChatMessage::user(format!(
            "Here is the relevant code from the project:\n\n{context}\n\nQuestion: {question}"
        )));

        messages
    }
}

/// Format retrieved results into a readable context block.
pub fn format_context(results: &[FinalResult]) -> String {
    let mut parts = Vec::with_capacity(results.len());
    for result in results {
        let chunk = &result.chunk;
        parts.push(format!(
            "--- File: {} (chunk {}/{}) [{}] ---\n{}\n",
            chunk.source_path,
            chunk.chunk_index + 1,
            chunk.total_chunks,
            chunk.language,
            chunk.text,
        ));
    }
    parts.join("\n")
}

/// Unique source file paths, in result order.
pub fn unique_sources(results: &[FinalResult]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::new();
    for result in results {
        let path = result.chunk.source_path.clone();
        if seen.insert(path.clone()) {
            sources.push(path);
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn result(path: &str, chunk_index: usize, total: usize, rank: usize) -> FinalResult {
        FinalResult {
            chunk: Arc::new(Chunk {
                id: Chunk::derive_id(path, chunk_index),
                text: format!("code in {path}"),
                embed_text: String::new(),
                source_path: path.to_string(),
                language: "rust".to_string(),
                chunk_index,
                total_chunks: total,
            }),
            final_score: 1.0 / rank as f32,
            final_rank: rank,
        }
    }

    #[test]
    fn test_format_context_includes_position_and_language() {
        let results = vec![result("src/db.rs", 1, 3, 1)];
        let context = format_context(&results);
        assert!(context.contains("--- File: src/db.rs (chunk 2/3) [rust] ---"));
        assert!(context.contains("code in src/db.rs"));
    }

    #[test]
    fn test_format_context_empty() {
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn test_unique_sources_dedupes_preserving_order() {
        let results = vec![
            result("src/db.rs", 0, 2, 1),
            result("src/http.rs", 0, 1, 2),
            result("src/db.rs", 1, 2, 3),
        ];
        assert_eq!(unique_sources(&results), vec!["src/db.rs", "src/http.rs"]);
    }
}
