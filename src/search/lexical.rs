//! BM25 keyword index built on tantivy.
//!
//! The index is built once per generation from the full chunk set and is
//! immutable afterwards; queries only read. User query text is tokenized
//! with the same analyzer as the indexed content and turned into a union of
//! term queries, so it is never interpreted as query syntax.

use std::sync::Arc;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, TantivyDocument, Term};

use crate::error::RetrieveError;
use crate::models::{Chunk, SearchMethod};

pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    f_ord: Field,
    f_content: Field,
    /// Chunks in insertion order; the stored ordinal maps a hit back here.
    chunks: Vec<Arc<Chunk>>,
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex")
            .field("f_ord", &self.f_ord)
            .field("f_content", &self.f_content)
            .field("chunks", &self.chunks)
            .finish_non_exhaustive()
    }
}

impl LexicalIndex {
    /// Build an in-memory BM25 index over the corpus.
    ///
    /// Fails with [`RetrieveError::EmptyCorpus`] on an empty chunk set; the
    /// caller may then fall back to vector-only retrieval.
    pub fn build(chunks: Vec<Arc<Chunk>>) -> Result<Self, RetrieveError> {
        if chunks.is_empty() {
            return Err(RetrieveError::EmptyCorpus);
        }

        let mut schema_builder = Schema::builder();
        let f_ord = schema_builder.add_u64_field("ord", STORED);
        let f_content = schema_builder.add_text_field("content", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index
            .writer(15_000_000)
            .map_err(|e| RetrieveError::backend(SearchMethod::Lexical, e))?;

        for (ord, chunk) in chunks.iter().enumerate() {
            writer
                .add_document(doc!(
                    f_ord => ord as u64,
                    f_content => chunk.text.clone(),
                ))
                .map_err(|e| RetrieveError::backend(SearchMethod::Lexical, e))?;
        }

        writer
            .commit()
            .map_err(|e| RetrieveError::backend(SearchMethod::Lexical, e))?;

        let reader = index
            .reader()
            .map_err(|e| RetrieveError::backend(SearchMethod::Lexical, e))?;

        Ok(Self {
            index,
            reader,
            f_ord,
            f_content,
            chunks,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The indexed chunks, in insertion order.
    pub fn chunks(&self) -> &[Arc<Chunk>] {
        &self.chunks
    }

    /// Search the index, returning up to `limit` chunks descending by BM25
    /// score. Ties are broken by chunk insertion order. A query that
    /// tokenizes to zero terms returns an empty list, not an error.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(Arc<Chunk>, f32)>, RetrieveError> {
        let terms = self.tokenize(query)?;
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let subqueries: Vec<(Occur, Box<dyn Query>)> = terms
            .into_iter()
            .map(|term| {
                (
                    Occur::Should,
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>,
                )
            })
            .collect();
        let query = BooleanQuery::new(subqueries);

        let searcher = self.reader.searcher();

        // Over-fetch so that equal-score hits at the cut line can be
        // reordered by insertion order before truncation.
        let fetch = (limit * 2).max(limit + 10);
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(fetch))
            .map_err(|e| RetrieveError::backend(SearchMethod::Lexical, e))?;

        let mut hits: Vec<(usize, f32)> = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| RetrieveError::backend(SearchMethod::Lexical, e))?;
            let Some(ord) = doc.get_first(self.f_ord).and_then(|v| v.as_u64()) else {
                continue;
            };
            hits.push((ord as usize, score));
        }

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(limit);

        Ok(hits
            .into_iter()
            .map(|(ord, score)| (self.chunks[ord].clone(), score))
            .collect())
    }

    /// Run the index's content analyzer over `query` and produce one term
    /// per token. Case normalization and punctuation splitting are identical
    /// to how the chunk text was indexed.
    fn tokenize(&self, query: &str) -> Result<Vec<Term>, RetrieveError> {
        let mut analyzer = self
            .index
            .tokenizer_for_field(self.f_content)
            .map_err(|e| RetrieveError::backend(SearchMethod::Lexical, e))?;

        let mut terms = Vec::new();
        let mut stream = analyzer.token_stream(query);
        while let Some(token) = stream.next() {
            terms.push(Term::from_field_text(self.f_content, &token.text));
        }
        Ok(terms)
    }
}
