//! In-memory vector store with cosine similarity search, optional MMR
//! diversity selection, and JSON disk persistence.
//!
//! The store delegates query embedding to the injected [`Embedder`]; its
//! entries are immutable after build/load, so concurrent queries need no
//! locks.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::RetrievalConfig;
use crate::error::RetrieveError;
use crate::llm::embeddings::{embed_one, Embedder};
use crate::models::{Chunk, SearchMethod};

/// Diversity policy applied to vector search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiversityMode {
    /// Plain top-k by cosine similarity.
    None,
    /// Oversample, then greedily trade relevance against similarity to the
    /// already-selected set. Guards against near-duplicate chunks from the
    /// same file region.
    MaximalMarginalRelevance,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorEntry {
    chunk: Arc<Chunk>,
    embedding: Vec<f32>,
}

pub struct VectorIndex {
    entries: Vec<VectorEntry>,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Build from parallel chunk/embedding arrays.
    pub fn build(
        chunks: Vec<Arc<Chunk>>,
        embeddings: Vec<Vec<f32>>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorEntry { chunk, embedding })
            .collect();
        Self { entries, embedder }
    }

    /// Load a persisted store. Fails with [`RetrieveError::IndexUnavailable`]
    /// when nothing has been persisted at `path`.
    pub fn load(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, RetrieveError> {
        if !path.exists() {
            return Err(RetrieveError::IndexUnavailable);
        }
        let data = std::fs::read_to_string(path)
            .map_err(|e| RetrieveError::backend(SearchMethod::Vector, e))?;
        let entries: Vec<VectorEntry> = serde_json::from_str(&data)
            .map_err(|e| RetrieveError::backend(SearchMethod::Vector, e))?;
        Ok(Self { entries, embedder })
    }

    /// Persist entries as JSON (atomic write via temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string(&self.entries).context("Failed to serialize vectors")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &data).context("Failed to write vector store")?;
        std::fs::rename(&tmp_path, path).context("Failed to move vector store into place")?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The stored chunks, in insertion order. Used to rebuild the lexical
    /// index for the same generation.
    pub fn chunks(&self) -> Vec<Arc<Chunk>> {
        self.entries.iter().map(|e| e.chunk.clone()).collect()
    }

    /// Nearest-neighbor search for `query`, descending by score.
    ///
    /// Fails with [`RetrieveError::IndexUnavailable`] when the store holds
    /// no vectors.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        diversity: DiversityMode,
        config: &RetrievalConfig,
    ) -> Result<Vec<(Arc<Chunk>, f32)>, RetrieveError> {
        if self.entries.is_empty() {
            return Err(RetrieveError::IndexUnavailable);
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = embed_one(self.embedder.as_ref(), query)
            .await
            .map_err(|e| RetrieveError::backend(SearchMethod::Vector, e))?;

        Ok(self.search_embedding(&query_embedding, limit, diversity, config))
    }

    /// Search with an already-computed query embedding.
    pub fn search_embedding(
        &self,
        query_embedding: &[f32],
        limit: usize,
        diversity: DiversityMode,
        config: &RetrievalConfig,
    ) -> Vec<(Arc<Chunk>, f32)> {
        // Score every entry; ties by insertion order keep results stable.
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query_embedding, &e.embedding)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        let selected = match diversity {
            DiversityMode::None => {
                scored.truncate(limit);
                scored
            }
            DiversityMode::MaximalMarginalRelevance => {
                let pool_size = limit.saturating_mul(config.mmr_fetch_multiple.max(1));
                scored.truncate(pool_size.max(limit));
                self.mmr_select(&scored, limit, config.mmr_lambda)
            }
        };

        selected
            .into_iter()
            .map(|(i, score)| (self.entries[i].chunk.clone(), score))
            .collect()
    }

    /// Greedy MMR selection over an oversampled, relevance-sorted pool.
    ///
    /// At each step the candidate maximizing
    /// `λ·relevance − (1−λ)·max_similarity(candidate, selected)` is taken.
    /// The reported score stays the candidate's original relevance.
    fn mmr_select(
        &self,
        pool: &[(usize, f32)],
        limit: usize,
        lambda: f32,
    ) -> Vec<(usize, f32)> {
        let lambda = lambda.clamp(0.0, 1.0);
        let mut remaining: Vec<(usize, f32)> = pool.to_vec();
        let mut selected: Vec<(usize, f32)> = Vec::with_capacity(limit);

        while selected.len() < limit && !remaining.is_empty() {
            let mut best_pos = 0usize;
            let mut best_value = f32::NEG_INFINITY;

            for (pos, &(entry_idx, relevance)) in remaining.iter().enumerate() {
                let max_sim = selected
                    .iter()
                    .map(|&(sel_idx, _)| {
                        cosine_similarity(
                            &self.entries[entry_idx].embedding,
                            &self.entries[sel_idx].embedding,
                        )
                    })
                    .fold(f32::NEG_INFINITY, f32::max);
                let penalty = if max_sim.is_finite() { max_sim } else { 0.0 };

                let value = lambda * relevance - (1.0 - lambda) * penalty;
                // Strict > keeps the earlier (higher-relevance) candidate on ties.
                if value > best_value {
                    best_value = value;
                    best_pos = pos;
                }
            }

            selected.push(remaining.remove(best_pos));
        }

        selected
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Embedder that never gets called; unit tests drive search_embedding
    /// directly with hand-picked vectors.
    struct UnusedEmbedder;

    #[async_trait]
    impl Embedder for UnusedEmbedder {
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("not expected in this test")
        }
    }

    fn chunk(path: &str, text: &str) -> Arc<Chunk> {
        Arc::new(Chunk {
            id: Chunk::derive_id(path, 0),
            text: text.to_string(),
            embed_text: text.to_string(),
            source_path: path.to_string(),
            language: "rust".to_string(),
            chunk_index: 0,
            total_chunks: 1,
        })
    }

    fn index_of(chunks: Vec<Arc<Chunk>>, embeddings: Vec<Vec<f32>>) -> VectorIndex {
        VectorIndex::build(chunks, embeddings, Arc::new(UnusedEmbedder))
    }

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_top_k_by_similarity() {
        let index = index_of(
            vec![chunk("a.rs", "a"), chunk("b.rs", "b"), chunk("c.rs", "c")],
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.9, 0.1, 0.0],
            ],
        );

        let hits = index.search_embedding(
            &[1.0, 0.0, 0.0],
            2,
            DiversityMode::None,
            &RetrievalConfig::default(),
        );
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.source_path, "a.rs");
        assert_eq!(hits[1].0.source_path, "c.rs");
        assert!(hits[0].1 >= hits[1].1);
    }

    /// Duplicate pair + equally relevant distinct item. The duplicates sit
    /// at similarity 1.0 to each other; the distinct item is orthogonal to
    /// them while matching the query just as well, so the MMR penalty alone
    /// decides the second pick.
    fn duplicate_pool() -> VectorIndex {
        index_of(
            vec![
                chunk("dup_a.rs", "dup a"),
                chunk("dup_b.rs", "dup b"),
                chunk("distinct.rs", "distinct"),
            ],
            vec![
                vec![1.0, 1.0],
                vec![1.0, 1.0],
                vec![1.0, -1.0],
            ],
        )
    }

    #[test]
    fn test_mmr_prefers_distinct_over_near_duplicate() {
        // With limit=2 MMR must pick the top-relevance item first, then the
        // distinct item over the duplicate, for any lambda < 1.
        let index = duplicate_pool();
        for lambda in [0.0f32, 0.25, 0.5, 0.7, 0.9, 0.99] {
            let config = RetrievalConfig {
                mmr_lambda: lambda,
                ..RetrievalConfig::default()
            };
            let hits = index.search_embedding(
                &[1.0, 0.0],
                2,
                DiversityMode::MaximalMarginalRelevance,
                &config,
            );
            assert_eq!(hits.len(), 2, "lambda {lambda}");
            assert_eq!(hits[0].0.source_path, "dup_a.rs", "lambda {lambda}");
            assert_eq!(hits[1].0.source_path, "distinct.rs", "lambda {lambda}");
        }
    }

    #[test]
    fn test_mmr_pure_relevance_at_lambda_one() {
        // lambda = 1 disables the diversity penalty; insertion order breaks
        // the relevance tie and the duplicate stays.
        let index = duplicate_pool();
        let config = RetrievalConfig {
            mmr_lambda: 1.0,
            ..RetrievalConfig::default()
        };
        let hits = index.search_embedding(
            &[1.0, 0.0],
            2,
            DiversityMode::MaximalMarginalRelevance,
            &config,
        );
        assert_eq!(hits[0].0.source_path, "dup_a.rs");
        assert_eq!(hits[1].0.source_path, "dup_b.rs");
    }

    #[test]
    fn test_plain_mode_keeps_the_duplicate() {
        // Without MMR the duplicate outranks the distinct item (insertion
        // order on the relevance tie).
        let index = duplicate_pool();
        let hits = index.search_embedding(
            &[1.0, 0.0],
            2,
            DiversityMode::None,
            &RetrievalConfig::default(),
        );
        assert_eq!(hits[0].0.source_path, "dup_a.rs");
        assert_eq!(hits[1].0.source_path, "dup_b.rs");
    }

    #[tokio::test]
    async fn test_empty_store_is_unavailable() {
        let index = index_of(Vec::new(), Vec::new());
        let err = index
            .search("anything", 5, DiversityMode::None, &RetrievalConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RetrieveError::IndexUnavailable));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");

        let index = index_of(
            vec![chunk("a.rs", "alpha"), chunk("b.rs", "beta")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        );
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path, Arc::new(UnusedEmbedder)).unwrap();
        assert_eq!(loaded.len(), 2);
        let hits = loaded.search_embedding(
            &[1.0, 0.0],
            1,
            DiversityMode::None,
            &RetrievalConfig::default(),
        );
        assert_eq!(hits[0].0.source_path, "a.rs");
    }

    #[test]
    fn test_load_missing_store_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err =
            VectorIndex::load(&dir.path().join("missing.json"), Arc::new(UnusedEmbedder))
                .unwrap_err();
        assert!(matches!(err, RetrieveError::IndexUnavailable));
    }
}
