//! LLM provider capabilities: embeddings, streamed generation, and
//! cross-encoder re-ranking. Each concern is a trait with concrete
//! implementations selected once at startup by a factory; retrieval logic
//! never branches on provider names.

pub mod embeddings;
pub mod generate;
pub mod reranker;

pub use embeddings::{embedder_from_config, Embedder};
pub use generate::{generator_from_config, Generator, TokenStream};
pub use reranker::{reranker_from_config, Reranker};
