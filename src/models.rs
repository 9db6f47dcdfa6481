use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An indexed unit of text. Created once per ingestion run and immutable
/// afterwards; every query-scoped type holds an `Arc` to one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier, derived from source path + chunk position.
    pub id: Uuid,
    /// Raw chunk content, shown to users and the LLM.
    pub text: String,
    /// Content sent to the embedding model: the raw text prefixed with a
    /// compact file-context header so small chunks embed near their file.
    pub embed_text: String,
    /// Relative file path within its repository.
    pub source_path: String,
    /// Detected language tag.
    pub language: String,
    /// 0-based position within the source file.
    pub chunk_index: usize,
    /// Total chunks produced from the source file.
    pub total_chunks: usize,
}

impl Chunk {
    /// Derive the stable chunk id from source path + position, so the same
    /// file splits to the same ids across rebuilds.
    pub fn derive_id(source_path: &str, chunk_index: usize) -> Uuid {
        let key = format!("{source_path}#{chunk_index}");
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }
}

/// Which retrieval method produced a ranked list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    Lexical,
    Vector,
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMethod::Lexical => write!(f, "lexical"),
            SearchMethod::Vector => write!(f, "vector"),
        }
    }
}

/// Output of rank fusion: one chunk with its summed reciprocal-rank score
/// and the 1-based rank it held in each contributing method's list.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub chunk: Arc<Chunk>,
    pub fused_score: f32,
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,
}

impl FusedCandidate {
    pub fn contributing_methods(&self) -> Vec<SearchMethod> {
        let mut methods = Vec::with_capacity(2);
        if self.lexical_rank.is_some() {
            methods.push(SearchMethod::Lexical);
        }
        if self.vector_rank.is_some() {
            methods.push(SearchMethod::Vector);
        }
        methods
    }

    pub(crate) fn method_count(&self) -> usize {
        self.lexical_rank.is_some() as usize + self.vector_rank.is_some() as usize
    }

    /// Best (lowest) rank this chunk held in any method's list.
    pub(crate) fn best_rank(&self) -> usize {
        match (self.lexical_rank, self.vector_rank) {
            (Some(l), Some(v)) => l.min(v),
            (Some(l), None) => l,
            (None, Some(v)) => v,
            (None, None) => usize::MAX,
        }
    }
}

/// Final output of one `retrieve` call. Constructed fresh per query,
/// never persisted.
#[derive(Debug, Clone)]
pub struct FinalResult {
    pub chunk: Arc<Chunk>,
    pub final_score: f32,
    /// 1-based position in the returned list.
    pub final_rank: usize,
}

/// A single chat turn (user or assistant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}
