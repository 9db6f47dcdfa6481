use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LlmConfig;

/// Maximum characters to send per text to the embedding API.
/// nomic-embed-text has an 8 192-token context. Most code tokenises at
/// ~1 token per 2-3 chars, but dense content (JSON blobs, minified JS) can
/// hit ~2.3 tokens/char. 3 000 chars × 2.3 ≈ 6 900 tokens — safely under
/// the limit even for pathological inputs.
const MAX_EMBED_CHARS: usize = 3_000;

/// Maps text to fixed-length numeric vectors. Provider-agnostic; one vector
/// per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Select the embedder implementation once, from config.
pub fn embedder_from_config(
    client: &reqwest::Client,
    config: &LlmConfig,
) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder {
            client: client.clone(),
            base_url: config.base_url.clone(),
            model: config.embedding_model.clone(),
        })),
        "openai" => Ok(Arc::new(OpenAiEmbedder {
            client: client.clone(),
            base_url: config.base_url.clone(),
            model: config.embedding_model.clone(),
            api_key: config.api_key.clone(),
        })),
        other => anyhow::bail!("Unknown LLM provider: {other}"),
    }
}

/// Embed a single text (query path).
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .context("No embedding returned")
}

/// Truncate `text` to at most `MAX_EMBED_CHARS`, splitting on a UTF-8 char
/// boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ─── Ollama ──────────────────────────────────────────────

pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
    /// Ask Ollama to silently truncate inputs that exceed the model's
    /// context length instead of returning a 400 error.
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let batch_size = 32;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size) {
            let req = OllamaEmbedRequest {
                model: self.model.clone(),
                input: chunk
                    .iter()
                    .map(|t| truncate_for_embedding(t).to_string())
                    .collect(),
                truncate: true,
            };

            let resp = self
                .client
                .post(&url)
                .json(&req)
                .send()
                .await
                .context("Failed to call Ollama embed API")?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Ollama embed API returned {status}: {body}");
            }

            let body: OllamaEmbedResponse = resp
                .json()
                .await
                .context("Failed to parse Ollama embed response")?;

            all_embeddings.extend(body.embeddings);
        }

        Ok(all_embeddings)
    }
}

// ─── OpenAI-compatible ───────────────────────────────────

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let api_key = self.api_key.as_deref().unwrap_or_default();
        let batch_size = 64;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size) {
            let req = OpenAiEmbedRequest {
                model: self.model.clone(),
                input: chunk
                    .iter()
                    .map(|t| truncate_for_embedding(t).to_string())
                    .collect(),
            };

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&req)
                .send()
                .await
                .context("Failed to call OpenAI embed API")?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("OpenAI embed API returned {status}: {body}");
            }

            let body: OpenAiEmbedResponse = resp
                .json()
                .await
                .context("Failed to parse OpenAI embed response")?;

            all_embeddings.extend(body.data.into_iter().map(|d| d.embedding));
        }

        Ok(all_embeddings)
    }
}
