//! Retrieval orchestrator: the single entry point the assistant consumes.
//!
//! Each `retrieve` call runs the lexical and vector searches concurrently,
//! joins them, fuses the two ranked lists with RRF, applies the optional
//! cross-encoder re-ranking stage, and returns the top K results. Calls are
//! stateless with respect to each other: the indexes are immutable shared
//! state, so concurrent queries need no locks. Index rebuilds must
//! happen-before any `retrieve` against the new generation (build a fresh
//! `Retriever` and swap it in).

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::RetrieveError;
use crate::llm::reranker::Reranker;
use crate::models::{Chunk, FinalResult, FusedCandidate};
use crate::search::fusion::reciprocal_rank_fusion;
use crate::search::lexical::LexicalIndex;
use crate::search::vector::{DiversityMode, VectorIndex};

pub struct Retriever {
    /// None when the corpus produced no lexical index (vector-only mode).
    lexical: Option<Arc<LexicalIndex>>,
    vector: Arc<VectorIndex>,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        lexical: Option<Arc<LexicalIndex>>,
        vector: Arc<VectorIndex>,
        reranker: Option<Arc<dyn Reranker>>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            lexical,
            vector,
            reranker,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Run the full hybrid pipeline for one query. Returns at most
    /// `final_k` results.
    ///
    /// One search method failing degrades to fusing the survivor's list;
    /// only both methods failing surfaces [`RetrieveError::Retrieval`].
    pub async fn retrieve(&self, query: &str) -> Result<Vec<FinalResult>, RetrieveError> {
        let query = query.trim().to_string();
        let pool_size = self.config.fused_pool_size;
        let diversity = if self.config.mmr_enabled {
            DiversityMode::MaximalMarginalRelevance
        } else {
            DiversityMode::None
        };

        // The tantivy search is synchronous; run it on the blocking pool
        // alongside the vector search and join both before fusing.
        let lexical_task = self.lexical.clone().map(|index| {
            let q = query.clone();
            tokio::task::spawn_blocking(move || index.search(&q, pool_size))
        });
        let vector_fut = self
            .vector
            .search(&query, pool_size, diversity, &self.config);

        let (lexical_joined, vector_result) = match lexical_task {
            Some(task) => {
                let (lex, vec) = tokio::join!(task, vector_fut);
                (Some(lex), vec)
            }
            None => (None, vector_fut.await),
        };

        let mut lexical_err: Option<String> = None;
        let lexical_hits = match lexical_joined {
            None => Vec::new(),
            Some(Ok(Ok(hits))) => hits,
            Some(Ok(Err(e))) => {
                tracing::warn!("Lexical search failed, continuing vector-only: {e}");
                lexical_err = Some(e.to_string());
                Vec::new()
            }
            Some(Err(join_err)) => {
                tracing::warn!("Lexical search task aborted: {join_err}");
                lexical_err = Some(join_err.to_string());
                Vec::new()
            }
        };

        let mut vector_err: Option<String> = None;
        let vector_hits = match vector_result {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("Vector search failed, continuing lexical-only: {e}");
                vector_err = Some(e.to_string());
                Vec::new()
            }
        };

        // Degraded mode needs at least one surviving method.
        let lexical_survived = self.lexical.is_some() && lexical_err.is_none();
        if vector_err.is_some() && !lexical_survived {
            return Err(RetrieveError::Retrieval {
                lexical: lexical_err,
                vector: vector_err,
            });
        }
        if lexical_err.is_some() && vector_err.is_some() {
            return Err(RetrieveError::Retrieval {
                lexical: lexical_err,
                vector: vector_err,
            });
        }

        let fused = reciprocal_rank_fusion(
            &lexical_hits,
            &vector_hits,
            self.config.rrf_k,
            pool_size,
        );

        let ranked = self.apply_rerank(&query, &fused).await;

        Ok(ranked
            .into_iter()
            .take(self.config.final_k)
            .enumerate()
            .map(|(i, (chunk, final_score))| FinalResult {
                chunk,
                final_score,
                final_rank: i + 1,
            })
            .collect())
    }

    /// Re-ranking stage. Never fails the overall call: a missing or failing
    /// reranker degrades to a passthrough of the fused order.
    async fn apply_rerank(
        &self,
        query: &str,
        fused: &[FusedCandidate],
    ) -> Vec<(Arc<Chunk>, f32)> {
        if !self.config.rerank_enabled {
            return passthrough(fused, fused.len());
        }

        let top_n = self.config.rerank_top_n;
        let Some(reranker) = &self.reranker else {
            return passthrough(fused, top_n);
        };
        if fused.is_empty() {
            return Vec::new();
        }

        let texts: Vec<String> = fused.iter().map(|f| f.chunk.text.clone()).collect();
        match reranker.score(query, &texts).await {
            Ok(scores) if scores.len() == fused.len() => {
                let mut scored: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
                // Descending by cross-encoder score; ties keep fused order.
                scored.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.0.cmp(&b.0))
                });
                scored.truncate(top_n);
                scored
                    .into_iter()
                    .map(|(idx, score)| (fused[idx].chunk.clone(), score))
                    .collect()
            }
            Ok(scores) => {
                tracing::warn!(
                    "Reranker returned {} scores for {} candidates, falling back to fused order",
                    scores.len(),
                    fused.len()
                );
                passthrough(fused, top_n)
            }
            Err(e) => {
                tracing::warn!("Re-ranking failed, falling back to fused order: {e}");
                passthrough(fused, top_n)
            }
        }
    }
}

fn passthrough(fused: &[FusedCandidate], limit: usize) -> Vec<(Arc<Chunk>, f32)> {
    fused
        .iter()
        .take(limit)
        .map(|f| (f.chunk.clone(), f.fused_score))
        .collect()
}
