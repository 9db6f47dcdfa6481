//! # coderag
//!
//! Hybrid code retrieval and a RAG assistant for codebases: clone or load a
//! repository, index it, and ask questions grounded in the retrieved source.
//!
//! ## Architecture
//!
//! The retrieval pipeline is a directed acyclic graph (DAG):
//!
//! ```text
//!                   ┌─────────────┐
//!                   │  User Query  │
//!                   └──────┬───────┘
//!                          │
//!             ┌────────────┴────────────┐
//!             ▼                         ▼
//!    ┌────────────────┐       ┌─────────────────┐
//!    │  BM25 Lexical  │       │  Vector Search   │
//!    │   (tantivy)    │       │  (cosine + MMR)  │
//!    └───────┬────────┘       └────────┬────────┘
//!            │ ranked list             │ ranked list
//!            └────────────┬────────────┘
//!                         ▼
//!            ┌───────────────────────┐
//!            │ Reciprocal Rank Fusion│
//!            │  1/(k + rank), k=60   │
//!            │  keep fused pool      │
//!            └───────────┬───────────┘
//!                        ▼
//!            ┌───────────────────────┐
//!            │ Cross-Encoder Rerank  │
//!            │  (optional, degrades  │
//!            │   to passthrough)     │
//!            └───────────┬───────────┘
//!                        ▼
//!            ┌───────────────────────┐
//!            │     Top-K Results     │
//!            └───────────────────────┘
//! ```
//!
//! The two searches run concurrently and are joined before fusion; either
//! one may fail and the pipeline degrades to the survivor's list. Only both
//! failing surfaces an error.
//!
//! ## Module Overview
//!
//! - [`config`] - Explicit configuration structs, built once and passed in
//! - [`models`] - Shared data types: `Chunk`, `FusedCandidate`, `FinalResult`
//! - [`error`] - The retrieval error taxonomy
//! - [`git`] - Git clone/update and repository file walking
//! - [`chunking`] - Fixed-size window chunk splitting with context headers
//! - [`ingest`] - Load → chunk → embed → build an index generation
//! - [`search`] - Lexical index, vector index, RRF fusion, and the
//!   retrieval orchestrator
//! - [`llm`] - `Embedder` / `Generator` / `Reranker` capability traits with
//!   Ollama and OpenAI-compatible implementations
//! - [`assistant`] - RAG chat loop over the retriever and generator
//! - [`workspace`] - SQLite-persisted named sessions

pub mod assistant;
pub mod chunking;
pub mod config;
pub mod error;
pub mod git;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod search;
pub mod workspace;
