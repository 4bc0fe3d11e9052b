//! In-memory document index with brute-force cosine similarity search.
//!
//! Holds the knowledge corpus behind `RwLock`s. Documents keep their
//! insertion order so equal-similarity results rank deterministically.
//! Embeddings are attached lazily: a document added without a vector gets
//! one on the first similarity computation that touches it.

use std::sync::RwLock;

use tracing::{debug, warn};

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::models::KnowledgeDocument;

pub struct DocumentIndex {
    docs: RwLock<Vec<KnowledgeDocument>>,
    provider: Box<dyn EmbeddingProvider>,
}

impl DocumentIndex {
    pub fn new(provider: Box<dyn EmbeddingProvider>) -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
            provider,
        }
    }

    /// Add a document, replacing any existing document with the same id.
    ///
    /// The embedding is generated here if absent; on embedding failure the
    /// document is stored without a vector and picked up lazily by the next
    /// search.
    pub async fn add_document(&self, mut doc: KnowledgeDocument) {
        if doc.embedding.is_none() {
            match self.provider.embed(&doc.content).await {
                Ok(vec) => doc.embedding = Some(vec),
                Err(e) => {
                    warn!(doc_id = %doc.id, error = %e, "failed to embed document; deferring");
                }
            }
        }

        let mut docs = self.docs.write().unwrap();
        if let Some(existing) = docs.iter_mut().find(|d| d.id == doc.id) {
            *existing = doc;
        } else {
            docs.push(doc);
        }
    }

    pub async fn add_documents(&self, documents: Vec<KnowledgeDocument>) {
        for doc in documents {
            self.add_document(doc).await;
        }
    }

    /// Bulk re-index: drop everything and ingest the given corpus.
    ///
    /// This is the only way documents leave the index.
    pub async fn reindex(&self, documents: Vec<KnowledgeDocument>) {
        {
            let mut docs = self.docs.write().unwrap();
            docs.clear();
        }
        self.add_documents(documents).await;
    }

    /// Top-K documents by cosine similarity to the question.
    ///
    /// A failed query embedding degrades to an empty result set rather than
    /// an error. Returned documents carry a `similarity_score` metadata
    /// entry.
    pub async fn search(&self, question: &str, top_k: usize) -> Vec<KnowledgeDocument> {
        if self.is_empty() {
            return Vec::new();
        }

        let query_vec = match self.provider.embed(question).await {
            Ok(vec) => vec,
            Err(e) => {
                warn!(error = %e, "failed to embed query; returning no documents");
                return Vec::new();
            }
        };

        self.backfill_missing_embeddings().await;

        let snapshot: Vec<KnowledgeDocument> = {
            let docs = self.docs.read().unwrap();
            docs.clone()
        };

        let mut scored: Vec<(f32, KnowledgeDocument)> = snapshot
            .into_iter()
            .map(|doc| {
                let sim = doc
                    .embedding
                    .as_deref()
                    .map(|v| cosine_similarity(&query_vec, v))
                    .unwrap_or(0.0);
                (sim, doc)
            })
            .collect();

        // Stable sort keeps insertion order for equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        debug!(results = scored.len(), top_k, "similarity search complete");

        scored
            .into_iter()
            .map(|(sim, mut doc)| {
                doc.metadata
                    .insert("similarity_score".to_string(), format!("{:.4}", sim));
                doc
            })
            .collect()
    }

    /// Attach embeddings to documents that were stored without one.
    async fn backfill_missing_embeddings(&self) {
        let pending: Vec<(String, String)> = {
            let docs = self.docs.read().unwrap();
            docs.iter()
                .filter(|d| d.embedding.is_none())
                .map(|d| (d.id.clone(), d.content.clone()))
                .collect()
        };

        for (id, content) in pending {
            match self.provider.embed(&content).await {
                Ok(vec) => {
                    let mut docs = self.docs.write().unwrap();
                    if let Some(doc) = docs.iter_mut().find(|d| d.id == id) {
                        doc.embedding = Some(vec);
                    }
                }
                Err(e) => {
                    warn!(doc_id = %id, error = %e, "failed to backfill embedding");
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().unwrap().is_empty()
    }

    /// Snapshot of the indexed documents, in insertion order.
    pub fn documents(&self) -> Vec<KnowledgeDocument> {
        self.docs.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddings;

    fn doc(id: &str, content: &str) -> KnowledgeDocument {
        KnowledgeDocument::new(id, id.to_uppercase(), content)
    }

    #[tokio::test]
    async fn test_add_and_search() {
        let index = DocumentIndex::new(Box::new(HashEmbeddings::new(64)));
        index
            .add_documents(vec![
                doc("a", "proceso de calidad y pruebas funcionales"),
                doc("b", "modelo de datos del catalogo"),
                doc("c", "criterios de promocion a produccion"),
            ])
            .await;

        assert_eq!(index.len(), 3);

        let results = index.search("pruebas funcionales", 2).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].metadata.contains_key("similarity_score"));
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let index = DocumentIndex::new(Box::new(HashEmbeddings::new(64)));
        assert!(index.search("anything", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_add_replaces_same_id() {
        let index = DocumentIndex::new(Box::new(HashEmbeddings::new(64)));
        index.add_document(doc("a", "first version")).await;
        index.add_document(doc("a", "second version")).await;
        assert_eq!(index.len(), 1);
        assert_eq!(index.documents()[0].content, "second version");
    }

    #[tokio::test]
    async fn test_lazy_embedding_backfill() {
        let index = DocumentIndex::new(Box::new(HashEmbeddings::new(64)));
        // Hash embeddings never fail, so force the lazy path by inserting a
        // pre-built document with no vector through the public API.
        let mut d = doc("a", "manual sin vector");
        d.embedding = None;
        {
            let mut docs = index.docs.write().unwrap();
            docs.push(d);
        }

        let results = index.search("manual", 1).await;
        assert_eq!(results.len(), 1);
        assert!(index.documents()[0].embedding.is_some());
    }

    #[tokio::test]
    async fn test_reindex_replaces_corpus() {
        let index = DocumentIndex::new(Box::new(HashEmbeddings::new(64)));
        index.add_document(doc("a", "old")).await;
        index.reindex(vec![doc("b", "new"), doc("c", "newer")]).await;
        assert_eq!(index.len(), 2);
        assert!(index.documents().iter().all(|d| d.id != "a"));
    }
}
