//! The hybrid retrieval pipeline: BM25 lexical search, vector similarity
//! search with optional MMR diversity, Reciprocal Rank Fusion, and the
//! orchestrator that runs both methods concurrently and applies the
//! cross-encoder re-ranking stage.

pub mod fusion;
pub mod lexical;
pub mod retriever;
pub mod vector;

pub use fusion::reciprocal_rank_fusion;
pub use lexical::LexicalIndex;
pub use retriever::Retriever;
pub use vector::{DiversityMode, VectorIndex};
