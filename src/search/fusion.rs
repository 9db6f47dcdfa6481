//! Reciprocal Rank Fusion: merge the lexical and vector ranked lists into
//! one ordered candidate list using only rank positions.
//!
//! BM25 scores and cosine similarities live on incomparable scales; RRF
//! sidesteps normalization entirely by scoring each chunk
//! `Σ 1/(k + rank)` over the lists it appears in, with constant `k`
//! damping the influence of top ranks.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::models::{Chunk, FusedCandidate};

/// Merge two ranked lists (either may be empty) into fused candidates,
/// descending by fused score, truncated to `pool_size`.
///
/// Equal-score ties are broken deterministically:
/// 1. presence in both lists beats presence in one,
/// 2. then the better (lower) individual rank,
/// 3. then lexical-list order, with vector-only chunks after lexical ones
///    in vector-list order.
pub fn reciprocal_rank_fusion(
    lexical: &[(Arc<Chunk>, f32)],
    vector: &[(Arc<Chunk>, f32)],
    k: f32,
    pool_size: usize,
) -> Vec<FusedCandidate> {
    let mut candidates: HashMap<Uuid, FusedCandidate> = HashMap::new();

    for (i, (chunk, _score)) in lexical.iter().enumerate() {
        let rank = i + 1;
        let entry = candidates
            .entry(chunk.id)
            .or_insert_with(|| FusedCandidate {
                chunk: chunk.clone(),
                fused_score: 0.0,
                lexical_rank: None,
                vector_rank: None,
            });
        entry.lexical_rank = Some(rank);
        entry.fused_score += 1.0 / (k + rank as f32);
    }

    for (i, (chunk, _score)) in vector.iter().enumerate() {
        let rank = i + 1;
        let entry = candidates
            .entry(chunk.id)
            .or_insert_with(|| FusedCandidate {
                chunk: chunk.clone(),
                fused_score: 0.0,
                lexical_rank: None,
                vector_rank: None,
            });
        entry.vector_rank = Some(rank);
        entry.fused_score += 1.0 / (k + rank as f32);
    }

    let mut fused: Vec<FusedCandidate> = candidates.into_values().collect();
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.method_count().cmp(&a.method_count()))
            .then_with(|| a.best_rank().cmp(&b.best_rank()))
            .then_with(|| tiebreak_key(a).cmp(&tiebreak_key(b)))
    });
    fused.truncate(pool_size);
    fused
}

/// Final deterministic ordering: lexical rank first, vector-only chunks
/// after all lexical ones.
fn tiebreak_key(c: &FusedCandidate) -> (usize, usize) {
    match (c.lexical_rank, c.vector_rank) {
        (Some(l), _) => (0, l),
        (None, Some(v)) => (1, v),
        (None, None) => (2, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(path: &str) -> Arc<Chunk> {
        Arc::new(Chunk {
            id: Chunk::derive_id(path, 0),
            text: format!("content of {path}"),
            embed_text: format!("content of {path}"),
            source_path: path.to_string(),
            language: "rust".to_string(),
            chunk_index: 0,
            total_chunks: 1,
        })
    }

    fn ranked(paths: &[&str]) -> Vec<(Arc<Chunk>, f32)> {
        paths
            .iter()
            .enumerate()
            .map(|(i, p)| (chunk(p), 10.0 - i as f32))
            .collect()
    }

    #[test]
    fn test_empty_inputs() {
        let fused = reciprocal_rank_fusion(&[], &[], 60.0, 30);
        assert!(fused.is_empty());
    }

    #[test]
    fn test_worked_example() {
        // lexical [A, B, C], vector [B, D, A], k = 60:
        //   A = 1/61 + 1/63 ≈ 0.03175
        //   B = 1/62 + 1/61 ≈ 0.03251
        //   C = 1/63         ≈ 0.01587
        //   D = 1/62         ≈ 0.01613
        // Expected order: B, A, D, C.
        let lexical = ranked(&["a.rs", "b.rs", "c.rs"]);
        let vector = ranked(&["b.rs", "d.rs", "a.rs"]);

        let fused = reciprocal_rank_fusion(&lexical, &vector, 60.0, 30);

        let order: Vec<&str> = fused.iter().map(|f| f.chunk.source_path.as_str()).collect();
        assert_eq!(order, vec!["b.rs", "a.rs", "d.rs", "c.rs"]);

        let score = |path: &str| {
            fused
                .iter()
                .find(|f| f.chunk.source_path == path)
                .unwrap()
                .fused_score
        };
        assert!((score("a.rs") - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-6);
        assert!((score("b.rs") - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-6);
        assert!((score("c.rs") - 1.0 / 63.0).abs() < 1e-6);
        assert!((score("d.rs") - 1.0 / 62.0).abs() < 1e-6);
    }

    #[test]
    fn test_coverage_every_input_chunk_appears_once() {
        let lexical = ranked(&["a.rs", "b.rs", "c.rs"]);
        let vector = ranked(&["c.rs", "d.rs"]);

        let fused = reciprocal_rank_fusion(&lexical, &vector, 60.0, 100);

        let mut paths: Vec<&str> = fused.iter().map(|f| f.chunk.source_path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["a.rs", "b.rs", "c.rs", "d.rs"]);
    }

    #[test]
    fn test_scores_monotonically_non_increasing() {
        let lexical = ranked(&["a.rs", "b.rs", "c.rs", "d.rs"]);
        let vector = ranked(&["c.rs", "e.rs", "a.rs", "f.rs"]);

        let fused = reciprocal_rank_fusion(&lexical, &vector, 60.0, 100);
        for pair in fused.windows(2) {
            assert!(pair[0].fused_score >= pair[1].fused_score);
        }
    }

    #[test]
    fn test_absent_method_contributes_zero() {
        let lexical = ranked(&["a.rs"]);
        let fused = reciprocal_rank_fusion(&lexical, &[], 60.0, 30);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].fused_score - 1.0 / 61.0).abs() < 1e-6);
        assert_eq!(fused[0].lexical_rank, Some(1));
        assert_eq!(fused[0].vector_rank, None);
    }

    #[test]
    fn test_vector_only_fusion() {
        // Degraded mode: lexical list empty, ordering follows vector ranks.
        let vector = ranked(&["x.rs", "y.rs", "z.rs"]);
        let fused = reciprocal_rank_fusion(&[], &vector, 60.0, 30);
        let order: Vec<&str> = fused.iter().map(|f| f.chunk.source_path.as_str()).collect();
        assert_eq!(order, vec!["x.rs", "y.rs", "z.rs"]);
    }

    #[test]
    fn test_tie_break_both_methods_beats_one() {
        // b appears at lexical rank 2 and vector rank 2: 1/62 + 1/62.
        // a appears only at lexical rank 1 and x only at vector rank 1: 1/61.
        // b's summed score wins outright; between a and x (identical 1/61),
        // both-list presence can't separate them (each is single-method) so
        // the lexical chunk sorts first.
        let lexical = ranked(&["a.rs", "b.rs"]);
        let vector = ranked(&["x.rs", "b.rs"]);

        let fused = reciprocal_rank_fusion(&lexical, &vector, 60.0, 30);
        let order: Vec<&str> = fused.iter().map(|f| f.chunk.source_path.as_str()).collect();
        assert_eq!(order, vec!["b.rs", "a.rs", "x.rs"]);
    }

    #[test]
    fn test_tie_break_better_rank_wins_among_equals() {
        // Construct an exact score tie between a two-method chunk and
        // nothing else equal; then verify equal single-method chunks order
        // by their rank: lexical rank 2 vs vector rank 2 tie resolves to
        // the lexical chunk.
        let lexical = ranked(&["a.rs", "b.rs"]);
        let vector = ranked(&["x.rs", "y.rs"]);

        let fused = reciprocal_rank_fusion(&lexical, &vector, 60.0, 30);
        let order: Vec<&str> = fused.iter().map(|f| f.chunk.source_path.as_str()).collect();
        // Rank-1 pair (a, x) precedes rank-2 pair (b, y); within each pair
        // the lexical chunk comes first.
        assert_eq!(order, vec!["a.rs", "x.rs", "b.rs", "y.rs"]);
    }

    #[test]
    fn test_pool_truncation() {
        let lexical = ranked(&["a.rs", "b.rs", "c.rs", "d.rs", "e.rs"]);
        let fused = reciprocal_rank_fusion(&lexical, &[], 60.0, 2);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].chunk.source_path, "a.rs");
    }

    #[test]
    fn test_duplicate_chunk_across_methods_not_duplicated() {
        let lexical = ranked(&["same.rs"]);
        let vector = ranked(&["same.rs"]);
        let fused = reciprocal_rank_fusion(&lexical, &vector, 60.0, 30);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].method_count(), 2);
        assert!((fused[0].fused_score - 2.0 / 61.0).abs() < 1e-6);
    }
}
