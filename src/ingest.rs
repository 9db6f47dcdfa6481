//! Ingestion pipeline: load source files, split them into chunks, embed the
//! chunk texts, and build one immutable index generation.
//!
//! A generation is built off to the side and only swapped in once complete;
//! queries never observe a half-built index.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::chunking::chunk_file;
use crate::config::Config;
use crate::error::RetrieveError;
use crate::git::{self, SourceFile};
use crate::llm::embeddings::Embedder;
use crate::models::Chunk;
use crate::search::lexical::LexicalIndex;
use crate::search::vector::VectorIndex;

/// One complete index generation: both indexes over the same chunk set.
#[derive(Debug)]
pub struct IndexSet {
    /// None when the corpus produced zero chunks for the lexical index
    /// (vector-only degraded mode).
    pub lexical: Option<Arc<LexicalIndex>>,
    pub vector: Arc<VectorIndex>,
}

/// Resolve `source` into loaded files: a git URL is cloned (or updated)
/// under the data dir, anything else is treated as a local directory.
pub fn load_source(source: &str, config: &Config) -> Result<Vec<SourceFile>> {
    if source.starts_with("http://") || source.starts_with("https://") || source.starts_with("git://")
    {
        let name = git::repo_name_from_url(source);
        let target = config.repos_dir().join(&name);
        git::clone_or_update(source, &target)?;
        git::load_directory(&target)
    } else {
        git::load_directory(Path::new(source))
    }
}

/// Split loaded files into chunks with position metadata.
pub fn chunk_files(files: &[SourceFile], config: &Config) -> Vec<Arc<Chunk>> {
    let mut chunks = Vec::new();
    for file in files {
        for chunk in chunk_file(file, &config.chunking) {
            chunks.push(Arc::new(chunk));
        }
    }
    tracing::info!("Split {} files into {} chunks", files.len(), chunks.len());
    chunks
}

/// Embed all chunks and build a fresh index generation.
pub async fn build_index_set(
    chunks: Vec<Arc<Chunk>>,
    embedder: Arc<dyn Embedder>,
) -> Result<IndexSet> {
    let embed_texts: Vec<String> = chunks.iter().map(|c| c.embed_text.clone()).collect();
    let embeddings = embedder
        .embed(&embed_texts)
        .await
        .context("Failed to embed chunks")?;
    if embeddings.len() != chunks.len() {
        anyhow::bail!(
            "Embedder returned {} vectors for {} chunks",
            embeddings.len(),
            chunks.len()
        );
    }

    let lexical = match LexicalIndex::build(chunks.clone()) {
        Ok(index) => Some(Arc::new(index)),
        Err(RetrieveError::EmptyCorpus) => {
            tracing::warn!("No chunks to index; lexical search disabled");
            None
        }
        Err(e) => return Err(e.into()),
    };

    let vector = Arc::new(VectorIndex::build(chunks, embeddings, embedder));

    Ok(IndexSet { lexical, vector })
}

/// Full ingestion: load, chunk, embed, build, persist the vector store.
pub async fn ingest(
    sources: &[String],
    config: &Config,
    embedder: Arc<dyn Embedder>,
) -> Result<IndexSet> {
    let mut files = Vec::new();
    for source in sources {
        let loaded = load_source(source, config)
            .with_context(|| format!("Failed to load {source}"))?;
        tracing::info!("Loaded {} files from {}", loaded.len(), source);
        files.extend(loaded);
    }

    let chunks = chunk_files(&files, config);
    let index_set = build_index_set(chunks, embedder).await?;

    index_set
        .vector
        .save(&config.vector_store_path())
        .context("Failed to persist vector store")?;
    tracing::info!(
        "Indexed {} chunks into {}",
        index_set.vector.len(),
        config.vector_store_path().display()
    );

    Ok(index_set)
}

/// Reload a persisted generation: the vector store comes off disk, the
/// lexical index is rebuilt from its chunks.
pub fn load_index_set(
    config: &Config,
    embedder: Arc<dyn Embedder>,
) -> Result<IndexSet, RetrieveError> {
    let vector = Arc::new(VectorIndex::load(&config.vector_store_path(), embedder)?);

    let lexical = match LexicalIndex::build(vector.chunks()) {
        Ok(index) => Some(Arc::new(index)),
        Err(RetrieveError::EmptyCorpus) => None,
        Err(e) => return Err(e),
    };

    Ok(IndexSet { lexical, vector })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Embeds every text as a constant unit vector.
    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn file(path: &str, content: &str) -> SourceFile {
        SourceFile {
            relative_path: path.to_string(),
            content: content.to_string(),
            language: "rust".to_string(),
        }
    }

    #[tokio::test]
    async fn test_build_index_set_covers_both_indexes() {
        let config = Config::default();
        let files = vec![
            file("src/a.rs", "fn alpha() {}"),
            file("src/b.rs", "fn beta() {}"),
        ];
        let chunks = chunk_files(&files, &config);
        assert_eq!(chunks.len(), 2);

        let set = build_index_set(chunks, Arc::new(ConstEmbedder)).await.unwrap();
        assert_eq!(set.vector.len(), 2);
        assert_eq!(set.lexical.as_ref().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_corpus_degrades_to_vector_only() {
        let set = build_index_set(Vec::new(), Arc::new(ConstEmbedder)).await.unwrap();
        assert!(set.lexical.is_none());
        assert_eq!(set.vector.len(), 0);
    }

    #[tokio::test]
    async fn test_persisted_generation_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };

        let files = vec![file("src/a.rs", "fn alpha() {}")];
        let chunks = chunk_files(&files, &config);
        let set = build_index_set(chunks, Arc::new(ConstEmbedder)).await.unwrap();
        set.vector.save(&config.vector_store_path()).unwrap();

        let reloaded = load_index_set(&config, Arc::new(ConstEmbedder)).unwrap();
        assert_eq!(reloaded.vector.len(), 1);
        let lexical = reloaded.lexical.unwrap();
        assert_eq!(lexical.len(), 1);
        assert_eq!(lexical.chunks()[0].source_path, "src/a.rs");
    }

    #[test]
    fn test_load_index_set_without_store_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let err = load_index_set(&config, Arc::new(ConstEmbedder)).unwrap_err();
        assert!(matches!(err, RetrieveError::IndexUnavailable));
    }
}
