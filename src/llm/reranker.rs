//! Cross-encoder re-ranking via an OpenAI-compatible `/v1/rerank` endpoint.
//!
//! Sends a single batch request with all query-document pairs instead of
//! making N individual LLM chat calls. Typical latency: 50-100ms vs 1-3s.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::RerankerConfig;

/// Scores (query, document) pairs jointly. Scoring is a pure function of
/// the pair: the order in which documents are submitted must not change
/// any document's score.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns one relevance score per document, in input order.
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

/// Build the configured reranker, or None when no endpoint is configured
/// (re-ranking then degrades to a passthrough over fused order).
pub fn reranker_from_config(
    client: &reqwest::Client,
    config: &RerankerConfig,
) -> Option<Arc<dyn Reranker>> {
    let base_url = config.base_url.clone()?;
    Some(Arc::new(HttpReranker {
        client: client.clone(),
        base_url,
        model: config.model.clone().unwrap_or_else(|| "default".to_string()),
        timeout: std::time::Duration::from_secs(config.timeout_secs.min(30)),
    }))
}

/// Cross-encoder sidecar client (e.g. llama-server with a reranker model).
pub struct HttpReranker {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: std::time::Duration,
}

#[derive(Serialize)]
struct RerankRequest {
    model: String,
    query: String,
    documents: Vec<String>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultRaw>,
}

#[derive(Deserialize)]
struct RerankResultRaw {
    index: usize,
    relevance_score: f32,
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/rerank", self.base_url.trim_end_matches('/'));

        let req_body = RerankRequest {
            model: self.model.clone(),
            query: query.to_string(),
            documents: documents.to_vec(),
            top_n: documents.len(),
        };

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&req_body)
            .send()
            .await
            .context("Failed to reach reranker endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Reranker returned {status}: {body}");
        }

        let body: RerankResponse = resp
            .json()
            .await
            .context("Failed to parse reranker response")?;

        // The endpoint returns (index, logit) pairs in its own order; map
        // back to input order and normalize logits to 0-1.
        let mut scores = vec![0.0f32; documents.len()];
        for r in body.results {
            if r.index < scores.len() {
                scores[r.index] = sigmoid(r.relevance_score);
            }
        }

        Ok(scores)
    }
}

/// Sigmoid normalization: maps raw logits to 0-1 range.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
